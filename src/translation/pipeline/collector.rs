//! 文本收集器模块
//!
//! 遍历 DOM 子树，找出所有可见、值得翻译的文本节点，
//! 并为每个节点建立一个 [`TextUnit`] 记录。

use std::collections::HashSet;

use markup5ever_rcdom::{Handle, NodeData};

use crate::parsers::html::document::DocumentAccessor;
use crate::parsers::html::dom::{get_node_name, index_in_parent, node_key, parent_of, text_nodes};
use crate::translation::pipeline::filters::TextFilter;

/// 合并组在回滚时需要的语义快照
#[derive(Debug, Clone)]
pub struct SemanticSnapshot {
    /// 语义父元素（最近的非内联祖先）
    pub parent: Handle,
    /// 包含该文本的顶层子节点在语义父元素中的位置
    pub index: usize,
    /// 该顶层子节点在分组时的深拷贝
    pub original: Handle,
}

/// 一个待翻译的文本节点及其翻译状态
#[derive(Debug, Clone)]
pub struct TextUnit {
    /// 原始文本节点
    pub node: Handle,
    /// 发现时的父元素
    pub parent: Handle,
    /// 发现时在父元素中的位置
    pub index_in_parent: usize,
    /// 发送的查询串（合并组的组长持有全部成员文本）
    pub q_str: Vec<String>,
    /// 与 `q_str` 一一对应的成员位置
    pub q_str_ind: Vec<usize>,
    /// 所属合并组的组长位置
    pub head: usize,
    /// 已并入其他单元，不单独发送
    pub ignore: bool,
    pub translated: bool,
    pub semantic: Option<SemanticSnapshot>,
}

impl TextUnit {
    /// 创建新的文本单元
    pub fn new(node: Handle, parent: Handle, index_in_parent: usize) -> Self {
        Self {
            node,
            parent,
            index_in_parent,
            q_str: Vec::new(),
            q_str_ind: Vec::new(),
            head: 0,
            ignore: false,
            translated: false,
            semantic: None,
        }
    }

    /// 当前文本内容
    pub fn text(&self) -> String {
        match self.node.data {
            NodeData::Text { ref contents } => contents.borrow().to_string(),
            _ => String::new(),
        }
    }

    /// 父元素标签名
    pub fn parent_tag(&self) -> &str {
        get_node_name(&self.parent).unwrap_or_default()
    }

    /// 是否是多成员合并组的组长
    pub fn is_group_head(&self) -> bool {
        !self.ignore && self.q_str.len() > 1
    }

    /// 把单元重置为独立单元（自身位置为 `position`）
    pub fn reset_query(&mut self, position: usize) {
        self.q_str = vec![self.text()];
        self.q_str_ind = vec![position];
        self.head = position;
        self.ignore = false;
        self.semantic = None;
    }
}

/// 一次扫描得到的单元集合以及它们的调度顺序
#[derive(Debug, Clone, Default)]
pub struct UnitSet {
    pub units: Vec<TextUnit>,
    /// 调度顺序：位置 → `units` 下标
    pub order: Vec<usize>,
}

impl UnitSet {
    /// 按发现顺序调度
    pub fn sequential(units: Vec<TextUnit>) -> Self {
        let order = (0..units.len()).collect();
        Self { units, order }
    }

    /// 按父元素的纵向位置稳定排序；没有布局盒的排在最后
    pub fn by_position<D: DocumentAccessor + ?Sized>(units: Vec<TextUnit>, doc: &D) -> Self {
        let tops: Vec<f64> = units
            .iter()
            .map(|unit| {
                doc.bounding_rect(&unit.parent)
                    .map(|rect| rect.top)
                    .unwrap_or(f64::MAX)
            })
            .collect();
        let mut order: Vec<usize> = (0..units.len()).collect();
        order.sort_by(|a, b| tops[*a].total_cmp(&tops[*b]));
        Self { units, order }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 调度位置对应的单元下标
    pub fn index_at(&self, position: usize) -> Option<usize> {
        self.order.get(position).copied()
    }

    pub fn at(&self, position: usize) -> Option<&TextUnit> {
        self.index_at(position).and_then(|i| self.units.get(i))
    }

    pub fn node_keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.units.iter().map(|unit| node_key(&unit.node))
    }
}

/// 收集统计信息
#[derive(Debug, Clone, Default)]
pub struct CollectionStats {
    pub nodes_visited: usize,
    pub text_nodes_found: usize,
    pub translatable_texts: usize,
    pub filtered_texts: usize,
    pub hidden_texts: usize,
}

impl CollectionStats {
    /// 重置统计
    pub fn reset(&mut self) {
        *self = Default::default();
    }
}

/// 文本节点扫描器
#[derive(Debug, Clone, Default)]
pub struct TextNodeScanner {
    filter: TextFilter,
    stats: CollectionStats,
}

impl TextNodeScanner {
    /// 创建新的扫描器
    pub fn new(filter: TextFilter) -> Self {
        Self {
            filter,
            stats: CollectionStats::default(),
        }
    }

    /// 按文档顺序收集 `root` 下所有可翻译的文本节点。
    /// `root` 本身是文本节点时只检查它自己。
    pub fn scan<D: DocumentAccessor + ?Sized>(&mut self, doc: &D, root: &Handle) -> Vec<TextUnit> {
        self.stats.reset();

        let candidates = match root.data {
            NodeData::Text { .. } => vec![root.clone()],
            _ => text_nodes(root),
        };

        let mut seen = HashSet::new();
        let mut units = Vec::new();
        for node in candidates {
            self.stats.nodes_visited += 1;
            self.stats.text_nodes_found += 1;
            if !seen.insert(node_key(&node)) {
                continue;
            }
            if let Some(unit) = self.accept(doc, node) {
                units.push(unit);
            }
        }

        self.stats.translatable_texts = units.len();
        tracing::debug!(
            "扫描完成: 文本节点 {} 个, 可翻译 {} 个, 过滤 {} 个, 隐藏 {} 个",
            self.stats.text_nodes_found,
            self.stats.translatable_texts,
            self.stats.filtered_texts,
            self.stats.hidden_texts
        );
        units
    }

    fn accept<D: DocumentAccessor + ?Sized>(&mut self, doc: &D, node: Handle) -> Option<TextUnit> {
        let text = match node.data {
            NodeData::Text { ref contents } => contents.borrow().to_string(),
            _ => return None,
        };
        if !self.filter.should_translate(&text) {
            self.stats.filtered_texts += 1;
            return None;
        }

        let parent = parent_of(&node)?;
        let tag = match get_node_name(&parent) {
            Some(tag) => tag,
            None => {
                self.stats.filtered_texts += 1;
                return None;
            }
        };
        if !self.filter.is_valid_parent_tag(tag) {
            self.stats.filtered_texts += 1;
            return None;
        }
        if !self.is_visible(doc, &parent, tag) {
            self.stats.hidden_texts += 1;
            return None;
        }

        let index = index_in_parent(&node)?;
        Some(TextUnit::new(node, parent, index))
    }

    fn is_visible<D: DocumentAccessor + ?Sized>(&self, doc: &D, parent: &Handle, tag: &str) -> bool {
        let width = doc.viewport().width;
        match doc.bounding_rect(parent) {
            Some(rect) => {
                (self.filter.is_always_visible(tag) || !rect.is_empty())
                    && rect.intersects_width(width)
            }
            None => self.filter.is_always_visible(tag),
        }
    }

    pub fn stats(&self) -> &CollectionStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::document::{HtmlDocument, Rect};
    use crate::parsers::html::dom::find_first;

    fn scan(html: &str) -> (HtmlDocument, Vec<TextUnit>) {
        let doc = HtmlDocument::parse(html.as_bytes(), "utf-8");
        let body = doc.body().unwrap();
        let units = TextNodeScanner::default().scan(&doc, &body);
        (doc, units)
    }

    fn texts(units: &[TextUnit]) -> Vec<String> {
        units.iter().map(|u| u.text()).collect()
    }

    #[test]
    fn test_collects_in_document_order() {
        let (_doc, units) = scan("<div>A<span>B</span>C</div><p>D</p>");
        assert_eq!(texts(&units), vec!["A", "B", "C", "D"]);
        assert_eq!(units[1].parent_tag(), "span");
        assert_eq!(units[2].index_in_parent, 2);
    }

    #[test]
    fn test_skips_numbers_scripts_and_hidden() {
        let (_doc, units) = scan(
            "<p>42</p><script>var x = 1;</script><textarea>typed</textarea>\
             <p hidden>secret</p><div style=\"display:none\"><b>gone</b></div><p>kept</p>",
        );
        assert_eq!(texts(&units), vec!["kept"]);
    }

    #[test]
    fn test_option_is_always_visible() {
        let (_doc, units) = scan("<select><option>First</option><option>Second</option></select>");
        assert_eq!(texts(&units), vec!["First", "Second"]);
    }

    #[test]
    fn test_offscreen_horizontally_is_hidden() {
        let mut doc = HtmlDocument::parse(b"<p>left</p><p id=\"r\">right</p>", "utf-8");
        let body = doc.body().unwrap();
        let paragraphs: Vec<Handle> = body.children.borrow().iter().cloned().collect();
        doc.set_rect(&paragraphs[1], Some(Rect::new(4000.0, 20.0, 200.0, 20.0)));

        let units = TextNodeScanner::default().scan(&doc, &body);
        assert_eq!(texts(&units), vec!["left"]);
    }

    #[test]
    fn test_text_root_scans_itself() {
        let doc = HtmlDocument::parse(b"<p>alone</p>", "utf-8");
        let p = find_first(&doc.body().unwrap(), "p").unwrap();
        let text = p.children.borrow()[0].clone();

        let units = TextNodeScanner::default().scan(&doc, &text);
        assert_eq!(texts(&units), vec!["alone"]);
    }

    #[test]
    fn test_unit_set_orders_by_parent_top() {
        let mut doc = HtmlDocument::parse(b"<p>first</p><p>second</p>", "utf-8");
        let body = doc.body().unwrap();
        let first = find_first(&body, "p").unwrap();
        doc.set_rect(&first, Some(Rect::new(0.0, 500.0, 100.0, 20.0)));

        let units = TextNodeScanner::default().scan(&doc, &body);
        let set = UnitSet::by_position(units, &doc);
        assert_eq!(set.at(0).unwrap().text(), "second");
        assert_eq!(set.at(1).unwrap().text(), "first");
        assert_eq!(set.order, vec![1, 0]);
    }
}

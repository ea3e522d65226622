//! 译文回写
//!
//! 把后端返回的译文写回 DOM。每段译文包在中性的 `<font>` 元素里，
//! 原始文本节点对象被替换下来但保持不变，回滚时原样放回。

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use markup5ever_rcdom::{Handle, Node};

use crate::parsers::html::dom::{
    append_child, create_element, create_text, is_attached, node_key, parent_of, replace_node,
    shallow_clone,
};
use crate::translation::config::constants;
use crate::translation::error::{helpers, TranslationError, TranslationResult};
use crate::translation::pipeline::collector::{TextUnit, UnitSet};
use crate::translation::pipeline::grouper::SemanticGrouper;
use crate::translation::pipeline::markup::{decode_entities, decode_segments, is_segmented};

/// 引擎创建的文本节点登记表，变化监听据此过滤掉自己的改动
#[derive(Debug, Default)]
pub struct NodeRegistry {
    created: HashMap<usize, Weak<Node>>,
}

impl NodeRegistry {
    pub fn register(&mut self, node: &Handle) {
        self.created.insert(node_key(node), Rc::downgrade(node));
    }

    pub fn contains(&self, node: &Handle) -> bool {
        self.created
            .get(&node_key(node))
            .and_then(Weak::upgrade)
            .map(|known| Rc::ptr_eq(&known, node))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.created.len()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }

    pub fn clear(&mut self) {
        self.created.clear();
    }
}

/// 一批译文的回写结果
#[derive(Debug, Default)]
pub struct ReintegrationOutcome {
    /// 成功写回的条目数
    pub applied: usize,
    /// 被标记为已翻译的单元数
    pub units_translated: usize,
    pub skipped_translated: usize,
    pub skipped_detached: usize,
    /// 响应比请求短，缺少译文的条目数
    pub missing: usize,
    /// 响应比请求长，多余的译文数
    pub extra: usize,
    pub failures: Vec<(usize, TranslationError)>,
    /// 无法对应到成员的译文分段（已丢弃）
    pub dropped_segments: Vec<(usize, TranslationError)>,
}

enum EntryResult {
    Applied(usize),
    AlreadyTranslated,
    Detached,
}

/// 译文回写器
pub struct Reintegrator<'a> {
    grouper: &'a SemanticGrouper,
    registry: &'a mut NodeRegistry,
    dropped: Vec<TranslationError>,
}

impl<'a> Reintegrator<'a> {
    pub fn new(grouper: &'a SemanticGrouper, registry: &'a mut NodeRegistry) -> Self {
        Self {
            grouper,
            registry,
            dropped: Vec::new(),
        }
    }

    /// 按顺序把 `translations[i]` 写回 `heads[i]`。
    /// 单个条目失败只记录在结果里，不影响其他条目。
    pub fn apply(
        &mut self,
        set: &mut UnitSet,
        heads: &[usize],
        translations: &[String],
    ) -> ReintegrationOutcome {
        let mut outcome = ReintegrationOutcome::default();

        if translations.len() != heads.len() {
            tracing::warn!(
                "译文数量与请求不一致: 请求 {} 条, 收到 {} 条",
                heads.len(),
                translations.len()
            );
        }
        outcome.missing = heads.len().saturating_sub(translations.len());
        outcome.extra = translations.len().saturating_sub(heads.len());

        for (&head, raw) in heads.iter().zip(translations) {
            let text = decode_entities(raw);
            match self.apply_entry(&mut set.units, head, &text) {
                Ok(EntryResult::Applied(count)) => {
                    outcome.applied += 1;
                    outcome.units_translated += count;
                }
                Ok(EntryResult::AlreadyTranslated) => outcome.skipped_translated += 1,
                Ok(EntryResult::Detached) => outcome.skipped_detached += 1,
                Err(error) => {
                    let error = error.with_context(format!("组长 {}", head));
                    helpers::log_error(&error);
                    outcome.failures.push((head, error));
                }
            }
            outcome
                .dropped_segments
                .extend(self.dropped.drain(..).map(|error| (head, error)));
        }
        outcome
    }

    fn apply_entry(
        &mut self,
        units: &mut [TextUnit],
        head: usize,
        text: &str,
    ) -> TranslationResult<EntryResult> {
        let unit = units
            .get(head)
            .ok_or_else(|| helpers::internal_error(format!("组长下标越界: {}", head)))?;
        if unit.translated {
            return Ok(EntryResult::AlreadyTranslated);
        }
        if !is_attached(&unit.node) {
            return Ok(EntryResult::Detached);
        }

        if unit.q_str.len() > 1 && is_segmented(text) {
            self.apply_segmented(units, head, text)
        } else {
            self.apply_single(&mut units[head], text)
        }
    }

    fn apply_single(&mut self, unit: &mut TextUnit, text: &str) -> TranslationResult<EntryResult> {
        let wrapper = self.wrapped_text(text, 2);
        replace_node(&unit.parent, &wrapper, &unit.node)?;
        unit.translated = true;
        Ok(EntryResult::Applied(1))
    }

    fn apply_segmented(
        &mut self,
        units: &mut [TextUnit],
        head: usize,
        text: &str,
    ) -> TranslationResult<EntryResult> {
        let members = units[head].q_str_ind.clone();
        let semantic = self.grouper.semantic_parent(&units[head].node)?;

        // 每个成员到语义父元素之间的内联祖先（由内向外）
        let mut templates: Vec<Vec<Handle>> = Vec::with_capacity(members.len());
        let mut anchor = None;
        for (offset, &member) in members.iter().enumerate() {
            let node = &units
                .get(member)
                .ok_or_else(|| helpers::internal_error(format!("成员下标越界: {}", member)))?
                .node;
            let mut chain = Vec::new();
            let mut cursor = parent_of(node).ok_or(TranslationError::DetachedNode)?;
            if !self.grouper.is_mergeable_node(&cursor) {
                anchor = Some(offset);
            }
            while self.grouper.is_mergeable_node(&cursor) {
                chain.push(shallow_clone(&cursor));
                cursor = parent_of(&cursor).ok_or(TranslationError::DetachedNode)?;
            }
            templates.push(chain);
        }

        let mut segments: Vec<(usize, String)> = Vec::new();
        for segment in decode_segments(text) {
            match segment.index {
                Some(index) if index < members.len() => {
                    let mut body = segment.text;
                    if templates[index].is_empty() {
                        body.push(' ');
                    }
                    segments.push((index, body));
                }
                _ => {
                    let error = helpers::markup_error(format!(
                        "忽略无法对应的译文分段: {:?}",
                        segment
                    ));
                    helpers::log_error(&error);
                    self.dropped.push(error);
                }
            }
        }

        let (front_end, back_start, anchor_offset) = match anchor {
            Some(offset) => (offset, offset + 1, offset),
            None => (0, 1, 0),
        };
        let mut translated = 0;
        let mut first = 0;
        let mut last = segments.len();

        for offset in 0..front_end {
            let unit = &mut units[members[offset]];
            if first < last && segments[first].0 == offset {
                translated += self.replace_member(unit, &segments[first].1, 2)?;
                first += 1;
            } else {
                translated += self.replace_member(unit, "", 1)?;
            }
        }

        for offset in (back_start..members.len()).rev() {
            let unit = &mut units[members[offset]];
            if last > first && segments[last - 1].0 == offset {
                translated += self.replace_member(unit, &segments[last - 1].1, 2)?;
                last -= 1;
            } else {
                translated += self.replace_member(unit, "", 1)?;
            }
        }

        // 剩余分段集中放到锚点位置，保持译文的语序
        if first < last {
            let container = create_element(constants::WRAPPER_TAG);
            for (index, body) in &segments[first..last] {
                let mut node = self.wrapped_text(body, 1);
                for template in &templates[*index] {
                    let wrapper = shallow_clone(template);
                    append_child(&wrapper, &node);
                    node = wrapper;
                }
                append_child(&container, &node);
            }

            let anchor_unit = &mut units[members[anchor_offset]];
            if anchor.is_some() {
                let parent = parent_of(&anchor_unit.node).ok_or(TranslationError::DetachedNode)?;
                replace_node(&parent, &container, &anchor_unit.node)?;
            } else {
                let index = anchor_unit
                    .semantic
                    .as_ref()
                    .map(|snapshot| snapshot.index)
                    .ok_or_else(|| helpers::internal_error("合并成员缺少语义快照"))?;
                let target = semantic
                    .children
                    .borrow()
                    .get(index)
                    .cloned()
                    .ok_or_else(|| helpers::dom_error("语义父元素的子节点越界"))?;
                replace_node(&semantic, &container, &target)?;
            }
            anchor_unit.translated = true;
            translated += 1;
        }

        Ok(EntryResult::Applied(translated))
    }

    /// 用译文替换成员的文本节点；节点已脱离时跳过
    fn replace_member(&mut self, unit: &mut TextUnit, text: &str, depth: usize) -> TranslationResult<usize> {
        let Some(parent) = parent_of(&unit.node) else {
            tracing::debug!("成员已脱离文档, 跳过");
            return Ok(0);
        };
        let wrapper = self.wrapped_text(text, depth);
        replace_node(&parent, &wrapper, &unit.node)?;
        unit.translated = true;
        Ok(1)
    }

    /// 创建 `depth` 层 `<font>` 包裹的文本节点
    fn wrapped_text(&mut self, text: &str, depth: usize) -> Handle {
        let text_node = create_text(text);
        self.registry.register(&text_node);
        let mut node = text_node;
        for _ in 0..depth {
            let wrapper = create_element(constants::WRAPPER_TAG);
            append_child(&wrapper, &node);
            node = wrapper;
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::document::{DocumentAccessor, HtmlDocument};
    use crate::parsers::html::dom::{find_first, text_content, text_nodes};
    use crate::translation::pipeline::collector::TextNodeScanner;

    struct Fixture {
        doc: HtmlDocument,
        set: UnitSet,
        grouper: SemanticGrouper,
        registry: NodeRegistry,
    }

    impl Fixture {
        fn new(html: &str) -> Self {
            let doc = HtmlDocument::parse(html.as_bytes(), "utf-8");
            let body = doc.body().unwrap();
            let mut units = TextNodeScanner::default().scan(&doc, &body);
            let grouper = SemanticGrouper::new();
            grouper.group(&mut units);
            let set = UnitSet::sequential(units);
            Self {
                doc,
                set,
                grouper,
                registry: NodeRegistry::default(),
            }
        }

        fn apply(&mut self, heads: &[usize], translations: &[&str]) -> ReintegrationOutcome {
            let translations: Vec<String> = translations.iter().map(|t| t.to_string()).collect();
            Reintegrator::new(&self.grouper, &mut self.registry).apply(
                &mut self.set,
                heads,
                &translations,
            )
        }

        fn body_text(&self) -> String {
            text_content(&self.doc.body().unwrap())
        }
    }

    #[test]
    fn test_single_unit_is_wrapped_twice() {
        let mut fx = Fixture::new("<p>Hello</p>");
        let original = fx.set.units[0].node.clone();
        let outcome = fx.apply(&[0], &["Bonjour &amp; salut"]);

        assert_eq!(outcome.applied, 1);
        assert_eq!(fx.body_text(), "Bonjour & salut");
        let p = find_first(&fx.doc.body().unwrap(), "p").unwrap();
        let outer = p.children.borrow()[0].clone();
        let inner = outer.children.borrow()[0].clone();
        assert_eq!(crate::parsers::html::dom::get_node_name(&outer), Some("font"));
        assert_eq!(crate::parsers::html::dom::get_node_name(&inner), Some("font"));
        assert!(fx.set.units[0].translated);
        assert!(!is_attached(&original));
        assert!(fx.registry.contains(&text_nodes(&p)[0]));
    }

    #[test]
    fn test_group_in_order_keeps_inline_structure() {
        let mut fx = Fixture::new("<p>Hello <b>world</b>!</p>");
        let outcome = fx.apply(&[0], &["<a i=0>Hola</a><a i=1>mundo</a><a i=2>!</a>"]);

        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.units_translated, 3);
        assert!(fx.set.units.iter().all(|u| u.translated));

        let p = find_first(&fx.doc.body().unwrap(), "p").unwrap();
        let b = find_first(&p, "b").unwrap();
        assert_eq!(text_content(&b), "mundo");
        assert_eq!(text_content(&p), "Hola mundo! ");
    }

    #[test]
    fn test_unknown_segment_index_is_dropped() {
        let mut fx = Fixture::new("<p>Hello <b>world</b>!</p>");
        let outcome = fx.apply(
            &[0],
            &["<a i=0>Hola</a><a i=1>mundo</a><a i=2>!</a><a i=7>sobra</a>"],
        );

        assert_eq!(outcome.applied, 1);
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.dropped_segments.len(), 1);
        let (head, error) = &outcome.dropped_segments[0];
        assert_eq!(*head, 0);
        assert!(matches!(error, TranslationError::MarkupError(_)));
        assert!(!fx.body_text().contains("sobra"));
    }

    #[test]
    fn test_reordered_group_collects_at_anchor() {
        let mut fx = Fixture::new("<p>Click <a>here</a> now</p>");
        fx.apply(&[0], &["<a i=2>지금 </a><a i=1>여기</a><a i=0>클릭</a>"]);

        let p = find_first(&fx.doc.body().unwrap(), "p").unwrap();
        assert_eq!(text_content(&p), "지금  여기클릭 ");
        // 链接结构随译文一起移动到锚点
        let container = p.children.borrow()[2].clone();
        let a = find_first(&container, "a").unwrap();
        assert_eq!(text_content(&a), "여기");
        assert_eq!(text_content(&find_first(&p, "a").unwrap()), "");
    }

    #[test]
    fn test_already_translated_and_detached_are_skipped() {
        let mut fx = Fixture::new("<p>one</p><p>two</p>");
        fx.apply(&[0], &["uno"]);
        let second = find_first(&fx.doc.body().unwrap(), "p")
            .and_then(|p| parent_of(&p))
            .map(|body| body.children.borrow()[1].clone())
            .unwrap();
        crate::parsers::html::dom::detach(&second);

        let outcome = fx.apply(&[0, 1], &["again", "dos"]);
        assert_eq!(outcome.skipped_translated, 1);
        assert_eq!(outcome.skipped_detached, 1);
        assert_eq!(fx.body_text(), "uno");
    }

    #[test]
    fn test_length_mismatch_is_reported() {
        let mut fx = Fixture::new("<p>one</p><p>two</p>");
        let outcome = fx.apply(&[0, 1], &["uno"]);
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.missing, 1);
        assert!(!fx.set.units[1].translated);

        let outcome = fx.apply(&[1], &["dos", "tres"]);
        assert_eq!(outcome.extra, 1);
        assert_eq!(fx.body_text(), "unodos");
    }

    #[test]
    fn test_group_without_markup_replaces_head_only() {
        let mut fx = Fixture::new("<p>Hello <b>world</b>!</p>");
        fx.apply(&[0], &["Hola mundo!"]);
        assert!(fx.set.units[0].translated);
        assert!(!fx.set.units[1].translated);
        assert_eq!(fx.body_text(), "Hola mundo!world!");
    }
}

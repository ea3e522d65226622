//! 文档访问层
//!
//! 翻译引擎不直接依赖浏览器的布局能力，而是通过 [`DocumentAccessor`] 查询：
//! 文档主体、元素的包围盒、视口尺寸与滚动位置。
//!
//! [`HtmlDocument`] 是基于 `RcDom` 的无头实现，使用简化的流式布局估算每个
//! 元素的纵向位置，足以驱动按滚动位置调度的翻译流程（CLI 与测试均使用它）。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

use super::dom::{
    get_child_node_by_name, get_node_attr, get_node_name, is_attached, node_key, parent_of,
};
use crate::translation::config::constants;

/// 元素包围盒（文档坐标系，单位像素）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// 水平方向是否与宽度为 `width` 的视口相交
    pub fn intersects_width(&self, width: f64) -> bool {
        !(self.right() < 0.0 || self.left > width)
    }
}

/// 视口尺寸
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: constants::DEFAULT_VIEWPORT_WIDTH,
            height: constants::DEFAULT_VIEWPORT_HEIGHT,
        }
    }
}

/// 文档访问能力接口
pub trait DocumentAccessor {
    /// 文档主体（`<body>`）
    fn body(&self) -> Option<Handle>;

    /// 元素的包围盒；没有布局盒（隐藏、已脱离文档）时返回 `None`
    fn bounding_rect(&self, element: &Handle) -> Option<Rect>;

    /// 当前视口尺寸
    fn viewport(&self) -> Viewport;

    /// 当前纵向滚动位置
    fn scroll_top(&self) -> f64;

    /// 视口底边在文档中的位置
    fn viewport_bottom(&self) -> f64 {
        self.scroll_top() + self.viewport().height
    }
}

/// 布局结果；访问过但没有布局盒的元素记为 `None`
struct LayoutEntry {
    node: Weak<Node>,
    rect: Option<Rect>,
}

/// 基于 `RcDom` 的无头文档
pub struct HtmlDocument {
    dom: RcDom,
    viewport: Viewport,
    scroll_top: f64,
    line_height: f64,
    overrides: HashMap<usize, (Weak<Node>, Option<Rect>)>,
    layout: RefCell<Option<HashMap<usize, LayoutEntry>>>,
    layout_passes: Cell<usize>,
}

impl HtmlDocument {
    /// 使用默认视口包装 DOM
    pub fn new(dom: RcDom) -> Self {
        Self::with_viewport(dom, Viewport::default())
    }

    pub fn with_viewport(dom: RcDom, viewport: Viewport) -> Self {
        Self {
            dom,
            viewport,
            scroll_top: 0.0,
            line_height: constants::DEFAULT_LINE_HEIGHT,
            overrides: HashMap::new(),
            layout: RefCell::new(None),
            layout_passes: Cell::new(0),
        }
    }

    /// 从 HTML 字节创建文档
    pub fn parse(data: &[u8], document_encoding: &str) -> Self {
        Self::new(super::dom::html_to_dom(data, document_encoding))
    }

    pub fn set_line_height(&mut self, line_height: f64) {
        self.line_height = line_height;
        self.invalidate();
    }

    pub fn dom(&self) -> &RcDom {
        &self.dom
    }

    pub fn into_dom(self) -> RcDom {
        self.dom
    }

    /// 覆盖某个元素的包围盒；`None` 表示该元素没有布局盒
    pub fn set_rect(&mut self, element: &Handle, rect: Option<Rect>) {
        self.overrides
            .insert(node_key(element), (Rc::downgrade(element), rect));
    }

    pub fn scroll_to(&mut self, top: f64) {
        self.scroll_top = top.max(0.0);
    }

    pub fn scroll_by(&mut self, delta: f64) {
        self.scroll_to(self.scroll_top + delta);
    }

    /// 文档高度（最后一行的底边）
    pub fn document_height(&self) -> f64 {
        self.ensure_layout();
        self.layout
            .borrow()
            .as_ref()
            .map(|entries| {
                entries
                    .values()
                    .filter_map(|entry| entry.rect)
                    .map(|rect| rect.top + rect.height)
                    .fold(0.0, f64::max)
            })
            .unwrap_or(0.0)
    }

    /// 已执行的布局次数
    pub fn layout_passes(&self) -> usize {
        self.layout_passes.get()
    }

    /// 丢弃布局缓存，下次查询时重新计算
    pub fn invalidate(&self) {
        self.layout.borrow_mut().take();
    }

    fn ensure_layout(&self) {
        if self.layout.borrow().is_some() {
            return;
        }
        let mut flow = FlowLayout {
            y: 0.0,
            line_open: false,
            line_height: self.line_height,
            width: self.viewport.width,
            entries: HashMap::new(),
        };
        if let Some(body) = self.body() {
            flow.visit(&body);
        }
        *self.layout.borrow_mut() = Some(flow.entries);
        self.layout_passes.set(self.layout_passes.get() + 1);
    }

    fn lookup(&self, element: &Handle) -> Option<Option<Rect>> {
        let layout = self.layout.borrow();
        let entry = layout.as_ref()?.get(&node_key(element))?;
        let alive = entry
            .node
            .upgrade()
            .map(|node| Rc::ptr_eq(&node, element))
            .unwrap_or(false);
        alive.then_some(entry.rect)
    }
}

impl DocumentAccessor for HtmlDocument {
    fn body(&self) -> Option<Handle> {
        let html = get_child_node_by_name(&self.dom.document, "html")?;
        get_child_node_by_name(&html, "body")
    }

    fn bounding_rect(&self, element: &Handle) -> Option<Rect> {
        if !is_attached(element) {
            return None;
        }
        if let Some((weak, rect)) = self.overrides.get(&node_key(element)) {
            if weak.upgrade().map(|n| Rc::ptr_eq(&n, element)).unwrap_or(false) {
                return *rect;
            }
        }

        self.ensure_layout();
        if let Some(rect) = self.lookup(element) {
            return rect;
        }
        // 隐藏子树内部不参与布局
        if in_hidden_subtree(element) {
            return None;
        }
        // 节点是布局之后才插入的，重新布局一次
        self.invalidate();
        self.ensure_layout();
        self.lookup(element).flatten()
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn scroll_top(&self) -> f64 {
        self.scroll_top
    }
}

/// 简化的流式布局：块级元素换行，内联内容共享当前行
struct FlowLayout {
    y: f64,
    line_open: bool,
    line_height: f64,
    width: f64,
    entries: HashMap<usize, LayoutEntry>,
}

impl FlowLayout {
    fn close_line(&mut self) {
        if self.line_open {
            self.y += self.line_height;
            self.line_open = false;
        }
    }

    fn record(&mut self, element: &Handle, rect: Option<Rect>) {
        self.entries.insert(
            node_key(element),
            LayoutEntry {
                node: Rc::downgrade(element),
                rect,
            },
        );
    }

    fn visit(&mut self, element: &Handle) {
        if is_hidden_element(element) {
            self.record(element, None);
            return;
        }
        let tag = get_node_name(element).unwrap_or_default();
        let block = constants::BLOCK_ELEMENTS.contains(&tag);

        if block {
            self.close_line();
        }
        let top = self.y;

        for child in element.children.borrow().iter() {
            match child.data {
                NodeData::Text { ref contents } => {
                    if !contents.borrow().trim().is_empty() {
                        self.line_open = true;
                    }
                }
                NodeData::Element { .. } => self.visit(child),
                _ => {}
            }
        }

        let bottom = if self.line_open {
            self.y + self.line_height
        } else {
            self.y
        };
        if block {
            self.close_line();
        }

        let height = bottom - top;
        let rect = (height > 0.0).then(|| Rect::new(0.0, top, self.width, height));
        self.record(element, rect);
    }
}

fn in_hidden_subtree(element: &Handle) -> bool {
    let mut cursor = parent_of(element);
    while let Some(node) = cursor {
        if let NodeData::Element { .. } = node.data {
            if is_hidden_element(&node) {
                return true;
            }
        }
        cursor = parent_of(&node);
    }
    false
}

fn is_hidden_element(element: &Handle) -> bool {
    let tag = get_node_name(element).unwrap_or_default();
    if constants::NON_RENDERED_ELEMENTS.contains(&tag) {
        return true;
    }
    if get_node_attr(element, "hidden").is_some() {
        return true;
    }
    get_node_attr(element, "style")
        .map(|style| {
            let compact: String = style
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_lowercase();
            compact.contains("display:none")
        })
        .unwrap_or(false)
}

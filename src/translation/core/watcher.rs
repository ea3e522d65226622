//! DOM 变化监听
//!
//! 首轮翻译完成后，引擎在 `<body>` 上开始监听（属性、子节点、字符数据、整棵子树）。
//! 宿主通过 [`MutationLog`] 报告发生的变化，引擎在 `pump` 时取走记录，
//! 对每条记录的目标重新扫描，过滤掉已知节点和引擎自己创建的节点，
//! 剩下的作为新的单元集合翻译。

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use markup5ever_rcdom::Handle;

use crate::parsers::html::document::DocumentAccessor;
use crate::parsers::html::dom::{node_key, parent_of, same_node};
use crate::translation::core::reintegrate::NodeRegistry;
use crate::translation::pipeline::collector::{TextNodeScanner, TextUnit};

/// 变化类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Attributes,
    ChildList,
    CharacterData,
}

/// 一条变化记录
#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: Handle,
}

impl MutationRecord {
    pub fn new(kind: MutationKind, target: &Handle) -> Self {
        Self {
            kind,
            target: target.clone(),
        }
    }
}

/// 监听选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserveOptions {
    pub attributes: bool,
    pub child_list: bool,
    pub character_data: bool,
    pub subtree: bool,
}

impl Default for ObserveOptions {
    fn default() -> Self {
        Self {
            attributes: true,
            child_list: true,
            character_data: true,
            subtree: true,
        }
    }
}

impl ObserveOptions {
    pub fn accepts(&self, kind: MutationKind) -> bool {
        match kind {
            MutationKind::Attributes => self.attributes,
            MutationKind::ChildList => self.child_list,
            MutationKind::CharacterData => self.character_data,
        }
    }
}

/// 变化监听接口
pub trait ChangeObserver {
    fn observe(&mut self, target: &Handle, options: ObserveOptions);
    fn disconnect(&mut self);
    fn is_observing(&self) -> bool;
    /// 取走已记录的变化
    fn take_records(&mut self) -> Vec<MutationRecord>;
}

#[derive(Default)]
struct LogState {
    observing: Option<(Handle, ObserveOptions)>,
    records: Vec<MutationRecord>,
    dropped: usize,
}

/// 宿主持有的变化日志句柄
#[derive(Clone, Default)]
pub struct MutationLog {
    state: Rc<RefCell<LogState>>,
}

impl MutationLog {
    /// 报告一次变化；未在监听、类型未启用或目标不在监听范围内时忽略。
    /// 返回是否被记录。
    pub fn record(&self, kind: MutationKind, target: &Handle) -> bool {
        let mut state = self.state.borrow_mut();
        let accepted = match state.observing {
            Some((ref root, options)) => {
                options.accepts(kind) && within(root, target, options.subtree)
            }
            None => false,
        };
        if accepted {
            state.records.push(MutationRecord::new(kind, target));
        } else {
            state.dropped += 1;
        }
        accepted
    }

    pub fn is_observing(&self) -> bool {
        self.state.borrow().observing.is_some()
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().records.len()
    }

    /// 被忽略的变化数
    pub fn dropped(&self) -> usize {
        self.state.borrow().dropped
    }
}

fn within(root: &Handle, target: &Handle, subtree: bool) -> bool {
    if same_node(root, target) {
        return true;
    }
    if !subtree {
        return false;
    }
    let mut cursor = parent_of(target);
    while let Some(node) = cursor {
        if same_node(&node, root) {
            return true;
        }
        cursor = parent_of(&node);
    }
    false
}

/// 基于 [`MutationLog`] 的变化监听实现
#[derive(Clone, Default)]
pub struct RecordingObserver {
    log: MutationLog,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取宿主用于报告变化的句柄
    pub fn log(&self) -> MutationLog {
        self.log.clone()
    }
}

impl ChangeObserver for RecordingObserver {
    fn observe(&mut self, target: &Handle, options: ObserveOptions) {
        let mut state = self.log.state.borrow_mut();
        state.observing = Some((target.clone(), options));
        state.records.clear();
    }

    fn disconnect(&mut self) {
        let mut state = self.log.state.borrow_mut();
        state.observing = None;
        state.records.clear();
    }

    fn is_observing(&self) -> bool {
        self.log.is_observing()
    }

    fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.log.state.borrow_mut().records)
    }
}

/// 对变化记录的目标重新扫描，返回需要翻译的新单元（发现顺序）
///
/// `known` 中的节点（已有单元持有）与引擎创建的节点都会被过滤掉，
/// 同一批记录里重复发现的节点只保留一次。
pub fn collect_changed_units<D: DocumentAccessor + ?Sized>(
    scanner: &mut TextNodeScanner,
    doc: &D,
    records: &[MutationRecord],
    registry: &NodeRegistry,
    known: &HashSet<usize>,
) -> Vec<TextUnit> {
    let mut seen = HashSet::new();
    let mut units = Vec::new();
    for record in records {
        for unit in scanner.scan(doc, &record.target) {
            let key = node_key(&unit.node);
            if registry.contains(&unit.node) || known.contains(&key) || !seen.insert(key) {
                continue;
            }
            units.push(unit);
        }
    }
    units
}

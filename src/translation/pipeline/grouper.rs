//! 语义分组
//!
//! 同一个块级元素里被内联标签切开的文本（如 `<p>Hello <b>world</b>!</p>`）
//! 需要作为一条查询翻译，否则每个片段会失去上下文。分组只修改单元的查询字段，
//! 不改动 DOM；改动在回写阶段完成。

use std::collections::HashSet;

use markup5ever_rcdom::Handle;

use crate::parsers::html::dom::{child_index, deep_clone, get_node_name, parent_of, same_node};
use crate::translation::config::constants;
use crate::translation::error::{helpers, TranslationError, TranslationResult};
use crate::translation::pipeline::collector::{SemanticSnapshot, TextUnit};

/// 分组结果
#[derive(Debug, Clone, Default)]
pub struct GroupOutcome {
    /// 每个合并组的成员位置（升序，第一个为组长）
    pub groups: Vec<Vec<usize>>,
    /// 放弃合并的候选数（语义父元素只有一个子节点，或成员全在内联标签里）
    pub skipped: usize,
    /// 分组失败的单元及原因，失败不影响其他单元
    pub failures: Vec<(usize, TranslationError)>,
}

impl GroupOutcome {
    pub fn merged_units(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }
}

/// 语义分组器
#[derive(Debug, Clone)]
pub struct SemanticGrouper {
    mergeable: HashSet<&'static str>,
    not_mergeable: HashSet<&'static str>,
}

impl Default for SemanticGrouper {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticGrouper {
    pub fn new() -> Self {
        Self {
            mergeable: constants::MERGEABLE_TAGS.iter().copied().collect(),
            not_mergeable: constants::NOT_MERGEABLE_TAGS.iter().copied().collect(),
        }
    }

    /// 标签是否为可合并的内联标签
    pub fn is_mergeable(&self, tag: &str) -> bool {
        self.mergeable.contains(tag.to_ascii_lowercase().as_str())
    }

    fn is_excluded_member(&self, tag: &str) -> bool {
        self.not_mergeable.contains(tag.to_ascii_lowercase().as_str())
    }

    /// 节点是否为可合并的内联元素
    pub fn is_mergeable_node(&self, node: &Handle) -> bool {
        get_node_name(node).map(|tag| self.is_mergeable(tag)).unwrap_or(false)
    }

    /// 最近的非内联祖先
    pub fn semantic_parent(&self, node: &Handle) -> TranslationResult<Handle> {
        let mut cursor = parent_of(node).ok_or(TranslationError::DetachedNode)?;
        while self.is_mergeable_node(&cursor) {
            cursor = parent_of(&cursor).ok_or(TranslationError::DetachedNode)?;
        }
        Ok(cursor)
    }

    /// 语义父元素以及包含 `node` 的顶层子节点在其中的位置
    pub fn index_in_semantic_parent(&self, node: &Handle) -> TranslationResult<(Handle, usize)> {
        let mut child = node.clone();
        let mut cursor = parent_of(node).ok_or(TranslationError::DetachedNode)?;
        while self.is_mergeable_node(&cursor) {
            child = cursor.clone();
            cursor = parent_of(&cursor).ok_or(TranslationError::DetachedNode)?;
        }
        let index = child_index(&cursor, &child)
            .ok_or_else(|| helpers::grouping_error("节点不在语义父元素的子节点中"))?;
        Ok((cursor, index))
    }

    /// 对一次扫描得到的单元（发现顺序）进行分组
    pub fn group(&self, units: &mut [TextUnit]) -> GroupOutcome {
        let mut outcome = GroupOutcome::default();

        let mut candidates = Vec::new();
        for (position, unit) in units.iter_mut().enumerate() {
            unit.reset_query(position);
            let tag = unit.parent_tag();
            if self.is_mergeable(tag) && !self.is_excluded_member(tag) {
                candidates.push(position);
            }
        }

        for position in candidates {
            if units[position].ignore || units[position].is_group_head() {
                continue;
            }
            match self.try_group(units, position) {
                Ok(Some(members)) => outcome.groups.push(members),
                Ok(None) => outcome.skipped += 1,
                Err(error) => {
                    let error = error.with_context(format!("文本单元 {}", position));
                    helpers::log_error(&error);
                    outcome.failures.push((position, error));
                }
            }
        }

        if !outcome.groups.is_empty() {
            tracing::debug!(
                "语义分组完成: {} 个合并组, 共 {} 个单元",
                outcome.groups.len(),
                outcome.merged_units()
            );
        }
        outcome
    }

    fn try_group(&self, units: &mut [TextUnit], position: usize) -> TranslationResult<Option<Vec<usize>>> {
        let semantic = self.semantic_parent(&units[position].node)?;
        if semantic.children.borrow().len() == 1 {
            return Ok(None);
        }

        let shares_parent = |unit: &TextUnit| {
            self.semantic_parent(&unit.node)
                .map(|p| same_node(&p, &semantic))
                .unwrap_or(false)
        };
        let joinable = |unit: &TextUnit| !unit.ignore && !unit.is_group_head();

        let mut members = vec![position];
        let mut mergeable_count = 1;

        let mut cursor = position;
        while cursor > 0 {
            cursor -= 1;
            let unit = &units[cursor];
            if !shares_parent(unit) {
                break;
            }
            let tag = unit.parent_tag();
            if !self.is_excluded_member(tag) && joinable(unit) {
                members.push(cursor);
            }
            if self.is_mergeable(tag) {
                mergeable_count += 1;
            }
        }

        let mut cursor = position + 1;
        while cursor < units.len() {
            let unit = &units[cursor];
            if !shares_parent(unit) {
                break;
            }
            let tag = unit.parent_tag();
            if !self.is_excluded_member(tag) && joinable(unit) {
                members.push(cursor);
            }
            if self.is_mergeable(tag) {
                mergeable_count += 1;
            }
            cursor += 1;
        }

        // 全部在内联标签里，没有直接文本可以锚定
        if mergeable_count == members.len() {
            return Ok(None);
        }

        members.sort_unstable();

        let mut snapshots = Vec::with_capacity(members.len());
        for &member in &members {
            let (parent, index) = self.index_in_semantic_parent(&units[member].node)?;
            let top = parent
                .children
                .borrow()
                .get(index)
                .cloned()
                .ok_or_else(|| helpers::grouping_error("语义父元素的子节点越界"))?;
            snapshots.push(SemanticSnapshot {
                parent,
                index,
                original: deep_clone(&top),
            });
        }

        let head = members[0];
        for (&member, snapshot) in members.iter().zip(snapshots) {
            units[member].semantic = Some(snapshot);
        }
        for &member in &members[1..] {
            let text = units[member].text();
            units[head].q_str.push(text);
            units[head].q_str_ind.push(member);
            units[member].head = head;
            units[member].ignore = true;
        }

        Ok(Some(members))
    }
}

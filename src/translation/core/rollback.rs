//! 回滚：把所有被改动的位置恢复为原始内容
//!
//! 合并组的成员用分组时保存的深拷贝替换回语义父元素的对应位置；
//! 独立单元把原始文本节点对象放回原来的位置。父元素已脱离文档的单元跳过。

use crate::parsers::html::dom::{insert_before, is_attached, remove_child, same_node};
use crate::translation::error::{helpers, TranslationError, TranslationResult};
use crate::translation::pipeline::collector::{TextUnit, UnitSet};

/// 回滚结果
#[derive(Debug, Default)]
pub struct RollbackReport {
    /// 恢复的语义位置数
    pub restored_semantic: usize,
    /// 放回的原始文本节点数
    pub restored_simple: usize,
    pub skipped_detached: usize,
    pub failures: Vec<TranslationError>,
}

impl RollbackReport {
    pub fn restored(&self) -> usize {
        self.restored_semantic + self.restored_simple
    }
}

/// 按集合顺序（主扫描集合在前）回滚全部单元
pub fn rollback_sets(sets: &mut [UnitSet]) -> RollbackReport {
    let mut report = RollbackReport::default();
    for set in sets.iter_mut() {
        for unit in set.units.iter_mut() {
            if let Err(error) = rollback_unit(unit, &mut report) {
                helpers::log_error(&error);
                report.failures.push(error);
            }
        }
    }
    tracing::info!(
        "回滚完成: 恢复语义位置 {} 个, 原始节点 {} 个, 跳过 {} 个, 失败 {} 个",
        report.restored_semantic,
        report.restored_simple,
        report.skipped_detached,
        report.failures.len()
    );
    report
}

fn rollback_unit(unit: &mut TextUnit, report: &mut RollbackReport) -> TranslationResult<()> {
    if let Some(snapshot) = unit.semantic.as_ref() {
        if !is_attached(&snapshot.parent) {
            report.skipped_detached += 1;
            return Ok(());
        }
        let current = snapshot
            .parent
            .children
            .borrow()
            .get(snapshot.index)
            .cloned()
            .ok_or_else(|| helpers::dom_error(format!("语义位置 {} 已不存在", snapshot.index)))?;
        if !same_node(&current, &snapshot.original) {
            insert_before(&snapshot.parent, &snapshot.original, &current)?;
            remove_child(&snapshot.parent, &current);
            report.restored_semantic += 1;
        }
        unit.translated = false;
        return Ok(());
    }

    if !unit.translated {
        return Ok(());
    }
    if !is_attached(&unit.parent) {
        report.skipped_detached += 1;
        return Ok(());
    }
    let current = unit
        .parent
        .children
        .borrow()
        .get(unit.index_in_parent)
        .cloned();
    match current {
        Some(current) if same_node(&current, &unit.node) => {}
        Some(current) => {
            insert_before(&unit.parent, &unit.node, &current)?;
            remove_child(&unit.parent, &current);
            report.restored_simple += 1;
        }
        None => {
            return Err(helpers::dom_error(format!(
                "原始位置 {} 已不存在",
                unit.index_in_parent
            )))
        }
    }
    unit.translated = false;
    Ok(())
}

//! 视口调度器
//!
//! 主扫描集合按父元素的纵向位置排序后，只翻译视口底边往下一个预读距离以内的部分。
//! 调度器维护两个游标：`done`（已覆盖的最后一个位置）和 `target`（应当覆盖到的位置）。
//! `target` 只增不减，`done` 永远不超过最后一个位置。

use crate::parsers::html::document::DocumentAccessor;
use crate::translation::pipeline::collector::UnitSet;

/// 视口调度器
#[derive(Debug, Clone)]
pub struct ViewportScheduler {
    done: Option<usize>,
    target: usize,
    last_bottom: f64,
    margin: f64,
}

impl ViewportScheduler {
    /// # 参数
    ///
    /// * `margin` - 预读距离（像素）
    /// * `bottom` - 开始时视口底边的位置
    pub fn new(margin: f64, bottom: f64) -> Self {
        Self {
            done: None,
            target: 0,
            last_bottom: bottom,
            margin,
        }
    }

    pub fn done(&self) -> Option<usize> {
        self.done
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    pub fn last_bottom(&self) -> f64 {
        self.last_bottom
    }

    /// 下一个尚未覆盖的位置
    pub fn next_position(&self) -> usize {
        self.done.map_or(0, |done| done + 1)
    }

    /// 当前待请求的窗口 `[done + 1, target]`
    pub fn pending_window(&self, len: usize) -> Option<(usize, usize)> {
        if len == 0 {
            return None;
        }
        let start = self.next_position();
        let end = self.target.min(len - 1);
        (start <= end).then_some((start, end))
    }

    /// 根据 `last_bottom + margin` 推进 `target`
    ///
    /// 从下一个未覆盖位置开始找第一个父元素顶边达到界限的单元，它也包含在窗口内；
    /// 找不到时覆盖到最后一个位置。被合并的成员与没有布局盒的单元不参与比较。
    pub fn update_target<D: DocumentAccessor + ?Sized>(&mut self, set: &UnitSet, doc: &D) {
        let len = set.len();
        if len == 0 || self.target >= len - 1 {
            return;
        }
        let limit = self.last_bottom + self.margin;
        let start = self.next_position();
        if start >= len {
            return;
        }

        let mut reached = start;
        for position in start..len {
            reached = position;
            let Some(unit) = set.at(position) else {
                continue;
            };
            if unit.ignore {
                continue;
            }
            let top = match doc.bounding_rect(&unit.parent) {
                Some(rect) => rect.top,
                None => continue,
            };
            if top >= limit {
                break;
            }
        }

        if reached > self.target {
            tracing::debug!("调度目标推进: {} -> {} (界限 {:.0}px)", self.target, reached, limit);
            self.target = reached;
        }
    }

    /// 处理滚动：视口底边越过上次记录位置一个预读距离后推进目标。
    /// 返回是否产生了新的调度。
    pub fn on_scroll<D: DocumentAccessor + ?Sized>(
        &mut self,
        bottom: f64,
        set: &UnitSet,
        doc: &D,
    ) -> bool {
        if bottom - self.last_bottom <= self.margin {
            return false;
        }
        self.last_bottom = bottom;
        let before = self.target;
        self.update_target(set, doc);
        self.target != before || self.pending_window(set.len()).is_some()
    }

    /// 标记从下一个位置起 `consumed` 个位置已覆盖
    pub fn advance(&mut self, consumed: usize, len: usize) {
        if consumed == 0 || len == 0 {
            return;
        }
        let last = (self.next_position() + consumed - 1).min(len - 1);
        self.done = Some(self.done.map_or(last, |done| done.max(last)));
    }
}

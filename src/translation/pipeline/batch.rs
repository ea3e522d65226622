//! 请求批处理模块
//!
//! 把调度窗口切成不超过配额的请求，记录每个在途批次，
//! 并在失败时决定重试还是放弃。
//!
//! ## 计数
//!
//! - `outstanding`：已发送但尚未完成的查询串数量
//! - `abandoned`：重试耗尽后放弃的查询串数量
//!
//! 两者之和加上已完成的数量等于发出的总量，放弃的批次不会悄悄丢失。

use std::collections::{HashMap, HashSet, VecDeque};

use crate::network::{NetworkClient, RequestId, TranslateRequest};
use crate::translation::error::TranslationError;
use crate::translation::pipeline::collector::UnitSet;
use crate::translation::pipeline::markup::encode_segments;

/// 窗口来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowOrigin {
    /// 滚动驱动的主扫描集合（串行）
    Scroll,
    /// DOM 变化后新发现的集合
    Mutation,
}

/// 调度窗口：某个单元集合中闭区间 `[start, end]` 的调度位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub set: usize,
    pub start: usize,
    pub end: usize,
    pub origin: WindowOrigin,
}

impl Window {
    pub fn new(set: usize, start: usize, end: usize, origin: WindowOrigin) -> Self {
        Self {
            set,
            start,
            end,
            origin,
        }
    }

    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 已处理 `consumed` 个位置后剩余的窗口
    pub fn remainder(&self, consumed: usize) -> Option<Window> {
        let start = self.start + consumed;
        (consumed > 0 && start <= self.end).then_some(Window { start, ..*self })
    }
}

/// 从窗口中切出的一个批次
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPlan {
    pub window: Window,
    /// 本批次覆盖的调度位置数（含跳过的位置）
    pub consumed: usize,
    /// 查询串数量
    pub load: usize,
    /// 每条查询对应的组长（`units` 下标），顺序与查询一致
    pub heads: Vec<usize>,
    pub queries: Vec<String>,
}

/// 已发送、等待完成的批次
#[derive(Debug, Clone)]
pub struct InFlightBatch {
    pub id: RequestId,
    pub plan: BatchPlan,
    pub request: TranslateRequest,
    pub retries: u32,
}

/// 失败处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum FailureAction {
    /// 已用相同内容重发
    Retried { attempt: u32 },
    /// 重试耗尽或错误不可重试，批次被放弃
    Abandoned {
        load: usize,
        consumed: usize,
        window: Window,
    },
    /// 未知请求
    Unknown,
}

/// 批处理统计
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    pub batches_sent: usize,
    pub batches_completed: usize,
    pub retries: usize,
    pub batches_abandoned: usize,
}

/// 请求批处理器
#[derive(Debug)]
pub struct RequestBatcher {
    quota: usize,
    max_retries: u32,
    next_id: u64,
    in_flight: HashMap<RequestId, InFlightBatch>,
    pending: VecDeque<Window>,
    outstanding: usize,
    abandoned: usize,
    scroll_busy: bool,
    stats: BatchStats,
}

impl RequestBatcher {
    /// 创建批处理器
    ///
    /// # 参数
    ///
    /// * `quota` - 单次请求允许的查询串数量
    /// * `max_retries` - 每个批次的重试次数
    pub fn new(quota: usize, max_retries: u32) -> Self {
        Self {
            quota: quota.max(1),
            max_retries,
            next_id: 0,
            in_flight: HashMap::new(),
            pending: VecDeque::new(),
            outstanding: 0,
            abandoned: 0,
            scroll_busy: false,
            stats: BatchStats::default(),
        }
    }

    /// 最近分配的请求编号
    pub fn last_id(&self) -> u64 {
        self.next_id
    }

    /// 从 `last` 之后继续分配请求编号（新会话沿用上一会话的编号序列）
    pub fn resume_ids_after(&mut self, last: u64) {
        self.next_id = self.next_id.max(last);
    }

    /// 从窗口开头切出一个批次
    ///
    /// 依次扫描调度位置，直到查询串数量达到配额或窗口结束。
    /// 被合并的成员、已翻译的组长以及仍在途的组长只计入 `consumed`，不产生查询。
    ///
    /// # 返回值
    ///
    /// 批次计划；`load == 0` 表示窗口内没有需要发送的内容
    pub fn plan(&self, set: &UnitSet, window: Window) -> BatchPlan {
        let busy = self.heads_in_flight(window.set);
        let mut plan = BatchPlan {
            window,
            consumed: 0,
            load: 0,
            heads: Vec::new(),
            queries: Vec::new(),
        };

        let end = window.end.min(set.len().saturating_sub(1));
        let mut position = window.start;
        while position <= end && plan.load < self.quota && !set.is_empty() {
            plan.consumed += 1;
            if let Some(index) = set.index_at(position) {
                let unit = &set.units[index];
                if !unit.ignore && !unit.translated && !busy.contains(&index) {
                    plan.load += unit.q_str.len();
                    plan.heads.push(index);
                    plan.queries.push(encode_segments(&unit.q_str));
                }
            }
            position += 1;
        }
        plan
    }

    fn heads_in_flight(&self, set: usize) -> HashSet<usize> {
        self.in_flight
            .values()
            .filter(|batch| batch.plan.window.set == set)
            .flat_map(|batch| batch.plan.heads.iter().copied())
            .collect()
    }

    /// 发送批次
    ///
    /// # 参数
    ///
    /// * `plan` - 由 [`plan`](Self::plan) 得到的批次（`load > 0`）
    /// * `source` / `target` - 语言对
    /// * `network` - 后端
    pub fn dispatch<N: NetworkClient + ?Sized>(
        &mut self,
        plan: BatchPlan,
        source: &str,
        target: &str,
        network: &mut N,
    ) -> RequestId {
        self.next_id += 1;
        let id = RequestId(self.next_id);
        let request = TranslateRequest::new(plan.queries.clone(), source, target);

        tracing::debug!(
            "发送批次 {}: 位置 {}..={}, 覆盖 {} 个位置, {} 条查询",
            id,
            plan.window.start,
            plan.window.end,
            plan.consumed,
            plan.load
        );

        network.send_translate(id, &request);
        self.outstanding += plan.load;
        if plan.window.origin == WindowOrigin::Scroll {
            self.scroll_busy = true;
        }
        self.stats.batches_sent += 1;
        self.in_flight.insert(
            id,
            InFlightBatch {
                id,
                plan,
                request,
                retries: 0,
            },
        );
        id
    }

    /// 批次成功完成，取回批次记录并结清计数
    pub fn complete(&mut self, id: RequestId) -> Option<InFlightBatch> {
        let batch = self.in_flight.remove(&id)?;
        self.outstanding = self.outstanding.saturating_sub(batch.plan.load);
        if batch.plan.window.origin == WindowOrigin::Scroll {
            self.scroll_busy = false;
        }
        self.stats.batches_completed += 1;
        Some(batch)
    }

    /// 批次失败：可重试时用相同内容重发，否则放弃
    ///
    /// 放弃滚动批次时 `scroll_busy` 保持置位，滚动路径随之停止；
    /// 放弃的查询串计入 `abandoned`。
    pub fn fail<N: NetworkClient + ?Sized>(
        &mut self,
        id: RequestId,
        error: &TranslationError,
        network: &mut N,
    ) -> FailureAction {
        let retry = match self.in_flight.get_mut(&id) {
            Some(batch) => {
                if error.is_retryable() && batch.retries < self.max_retries {
                    batch.retries += 1;
                    Some((batch.retries, batch.request.clone()))
                } else {
                    None
                }
            }
            None => return FailureAction::Unknown,
        };

        if let Some((attempt, request)) = retry {
            tracing::warn!("批次 {} 失败 ({}), 第 {} 次重试", id, error, attempt);
            self.stats.retries += 1;
            network.send_translate(id, &request);
            return FailureAction::Retried { attempt };
        }

        match self.in_flight.remove(&id) {
            Some(batch) => {
                let load = batch.plan.load;
                self.outstanding = self.outstanding.saturating_sub(load);
                self.abandoned += load;
                self.stats.batches_abandoned += 1;
                tracing::error!("批次 {} 被放弃: {} 条查询, 原因: {}", id, load, error);
                FailureAction::Abandoned {
                    load,
                    consumed: batch.plan.consumed,
                    window: batch.plan.window,
                }
            }
            None => FailureAction::Unknown,
        }
    }

    /// 丢弃在途批次记录（翻译已被撤销时使用）
    pub fn forget(&mut self, id: RequestId) -> Option<InFlightBatch> {
        let batch = self.in_flight.remove(&id)?;
        self.outstanding = self.outstanding.saturating_sub(batch.plan.load);
        Some(batch)
    }

    pub fn push_pending(&mut self, window: Window) {
        if !window.is_empty() {
            self.pending.push_back(window);
        }
    }

    pub fn pop_pending(&mut self) -> Option<Window> {
        self.pending.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_scroll_busy(&self) -> bool {
        self.scroll_busy
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn abandoned(&self) -> usize {
        self.abandoned
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn in_flight_ids(&self) -> Vec<RequestId> {
        let mut ids: Vec<RequestId> = self.in_flight.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    /// 清空全部状态（请求编号继续递增）
    pub fn reset(&mut self) {
        self.in_flight.clear();
        self.pending.clear();
        self.outstanding = 0;
        self.abandoned = 0;
        self.scroll_busy = false;
        self.stats = BatchStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::MemoryNetworkClient;
    use crate::parsers::html::document::{DocumentAccessor, HtmlDocument};
    use crate::translation::pipeline::collector::TextNodeScanner;
    use crate::translation::pipeline::grouper::SemanticGrouper;

    fn unit_set(html: &str) -> UnitSet {
        let doc = HtmlDocument::parse(html.as_bytes(), "utf-8");
        let body = doc.body().unwrap();
        let mut units = TextNodeScanner::default().scan(&doc, &body);
        SemanticGrouper::new().group(&mut units);
        UnitSet::by_position(units, &doc)
    }

    fn paragraphs(count: usize) -> String {
        (0..count).map(|i| format!("<p>line {}</p>", i)).collect()
    }

    #[test]
    fn test_plan_respects_quota() {
        let set = unit_set(&paragraphs(5));
        let batcher = RequestBatcher::new(2, 1);
        let plan = batcher.plan(&set, Window::new(0, 0, 4, WindowOrigin::Scroll));
        assert_eq!(plan.load, 2);
        assert_eq!(plan.consumed, 2);
        assert_eq!(plan.queries, vec!["line 0", "line 1"]);
        assert_eq!(
            plan.window.remainder(plan.consumed),
            Some(Window::new(0, 2, 4, WindowOrigin::Scroll))
        );
    }

    #[test]
    fn test_group_counts_every_member_against_quota() {
        let set = unit_set("<p>Hello <b>world</b>!</p><p>next</p>");
        let batcher = RequestBatcher::new(3, 1);
        let plan = batcher.plan(&set, Window::new(0, 0, 3, WindowOrigin::Scroll));

        assert_eq!(plan.heads, vec![0]);
        assert_eq!(plan.load, 3);
        assert_eq!(plan.queries, vec!["<a i=0>Hello </a><a i=1>world</a><a i=2>!</a>"]);
    }

    #[test]
    fn test_window_of_only_members_has_no_load() {
        let set = unit_set("<p>Hello <b>world</b>!</p>");
        let batcher = RequestBatcher::new(50, 1);
        let plan = batcher.plan(&set, Window::new(0, 1, 2, WindowOrigin::Scroll));
        assert_eq!(plan.load, 0);
        assert_eq!(plan.consumed, 2);
    }

    #[test]
    fn test_outstanding_and_scroll_serialization() {
        let set = unit_set(&paragraphs(3));
        let mut network = MemoryNetworkClient::scripted(&["ko"]);
        let mut batcher = RequestBatcher::new(50, 1);

        let plan = batcher.plan(&set, Window::new(0, 0, 2, WindowOrigin::Scroll));
        let id = batcher.dispatch(plan, "en", "ko", &mut network);
        assert_eq!(batcher.outstanding(), 3);
        assert!(batcher.is_scroll_busy());

        let again = batcher.plan(&set, Window::new(0, 0, 2, WindowOrigin::Mutation));
        assert_eq!(again.load, 0, "heads in flight must not be resubmitted");

        let batch = batcher.complete(id).unwrap();
        assert_eq!(batch.plan.heads.len(), 3);
        assert_eq!(batcher.outstanding(), 0);
        assert!(!batcher.is_scroll_busy());
        assert!(batcher.complete(id).is_none());
    }

    #[test]
    fn test_next_batcher_continues_request_ids() {
        let set = unit_set(&paragraphs(1));
        let mut network = MemoryNetworkClient::scripted(&["ko"]);
        let mut first = RequestBatcher::new(50, 1);
        let old = first.dispatch(
            first.plan(&set, Window::new(0, 0, 0, WindowOrigin::Scroll)),
            "en",
            "ko",
            &mut network,
        );

        let mut second = RequestBatcher::new(50, 1);
        second.resume_ids_after(first.last_id());
        let new = second.dispatch(
            second.plan(&set, Window::new(0, 0, 0, WindowOrigin::Scroll)),
            "en",
            "ja",
            &mut network,
        );
        assert!(new > old);
        assert!(second.complete(old).is_none());
    }

    #[test]
    fn test_retry_once_then_abandon() {
        let set = unit_set(&paragraphs(2));
        let mut network = MemoryNetworkClient::scripted(&["ko"]);
        let backend = network.handle();
        let mut batcher = RequestBatcher::new(50, 1);

        let plan = batcher.plan(&set, Window::new(0, 0, 1, WindowOrigin::Scroll));
        let id = batcher.dispatch(plan, "en", "ko", &mut network);
        let error = TranslationError::TransportError {
            status: 500,
            body: String::new(),
        };

        assert_eq!(
            batcher.fail(id, &error, &mut network),
            FailureAction::Retried { attempt: 1 }
        );
        assert_eq!(backend.translate_requests(), 2);
        assert_eq!(backend.sent()[0].1, backend.sent()[1].1);

        match batcher.fail(id, &error, &mut network) {
            FailureAction::Abandoned { load, .. } => assert_eq!(load, 2),
            other => panic!("unexpected action: {:?}", other),
        }
        assert_eq!(batcher.outstanding(), 0);
        assert_eq!(batcher.abandoned(), 2);
        assert!(batcher.is_scroll_busy());
        assert_eq!(batcher.fail(id, &error, &mut network), FailureAction::Unknown);
    }

    #[test]
    fn test_non_retryable_error_abandons_immediately() {
        let set = unit_set(&paragraphs(1));
        let mut network = MemoryNetworkClient::scripted(&["ko"]);
        let mut batcher = RequestBatcher::new(50, 1);
        let plan = batcher.plan(&set, Window::new(0, 0, 0, WindowOrigin::Mutation));
        let id = batcher.dispatch(plan, "en", "ko", &mut network);

        let error = TranslationError::ParseError("bad body".into());
        assert!(matches!(
            batcher.fail(id, &error, &mut network),
            FailureAction::Abandoned { load: 1, .. }
        ));
    }
}

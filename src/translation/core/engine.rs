//! 翻译引擎核心实现
//!
//! 引擎驱动一次完整的页内翻译会话：
//!
//! 1. 查询后端支持的语言，决定翻译、不支持或无需翻译
//! 2. 扫描 `<body>` 下的可见文本，进行语义分组，按纵向位置排序
//! 3. 按视口位置逐窗请求译文，滚动时继续推进
//! 4. 译文按请求编号写回 DOM，完成顺序不受约束
//! 5. 首轮完成后监听 DOM 变化，对新出现的文本继续翻译
//! 6. 随时可以回滚到原始内容
//!
//! 引擎是单线程、事件驱动的：宿主调用 [`TranslationEngine::translate`]、
//! [`TranslationEngine::on_scroll`]，并反复调用 [`TranslationEngine::pump`]
//! 处理后端完成的请求与 DOM 变化。

use std::collections::HashSet;
use std::fmt;

use crate::network::{Completion, NetworkClient, RequestId};
use crate::parsers::html::document::DocumentAccessor;
use crate::translation::config::EngineConfig;
use crate::translation::core::reintegrate::{NodeRegistry, ReintegrationOutcome, Reintegrator};
use crate::translation::core::rollback::{rollback_sets, RollbackReport};
use crate::translation::core::scheduler::ViewportScheduler;
use crate::translation::core::watcher::{
    collect_changed_units, ChangeObserver, MutationRecord, ObserveOptions,
};
use crate::translation::error::{helpers, ErrorCode, TranslationError, TranslationResult};
use crate::translation::pipeline::batch::{
    BatchPlan, FailureAction, RequestBatcher, Window, WindowOrigin,
};
use crate::translation::pipeline::collector::{TextNodeScanner, UnitSet};
use crate::translation::pipeline::grouper::SemanticGrouper;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// 尚未开始
    Idle,
    /// 等待语言列表
    Checking,
    /// 正在扫描与分组
    Scanning,
    /// 首轮翻译进行中
    Translating,
    /// 首轮翻译完成，监听 DOM 变化
    Completed,
    /// 目标语言不受支持
    Unsupported,
    /// 源语言与目标语言相同
    NoOp,
    /// 已回滚
    RolledBack,
}

impl SessionState {
    /// 是否允许开始新的翻译
    pub fn accepts_translate(self) -> bool {
        matches!(
            self,
            SessionState::Idle
                | SessionState::Unsupported
                | SessionState::NoOp
                | SessionState::RolledBack
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 语言对
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePair {
    pub source: String,
    pub target: String,
}

impl LanguagePair {
    /// 规范化语言对：`zh-CN` 目标映射为 `zh`
    pub fn new(source: &str, target: &str) -> TranslationResult<Self> {
        let source = source.trim();
        let target = target.trim();
        if source.is_empty() || target.is_empty() {
            return Err(TranslationError::InvalidInput(format!(
                "语言代码不能为空: source={:?}, target={:?}",
                source, target
            )));
        }
        let target = if target.eq_ignore_ascii_case("zh-CN") {
            "zh"
        } else {
            target
        };
        Ok(Self {
            source: source.to_string(),
            target: target.to_string(),
        })
    }

    pub fn is_same(&self) -> bool {
        self.source == self.target
    }
}

/// 进度报告
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub percent: u8,
    pub finished: bool,
    pub error: ErrorCode,
}

impl Progress {
    pub fn new(percent: u8, finished: bool, error: ErrorCode) -> Self {
        Self {
            percent: percent.min(100),
            finished,
            error,
        }
    }
}

pub type ProgressCallback = Box<dyn FnMut(Progress)>;

/// 会话统计
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub units_scanned: usize,
    pub groups_formed: usize,
    pub grouping_failures: usize,
    pub units_translated: usize,
    pub entries_skipped: usize,
    pub reintegration_failures: usize,
    pub segments_dropped: usize,
    pub mutation_rounds: usize,
    pub mutation_units: usize,
}

impl EngineStats {
    fn absorb(&mut self, outcome: &ReintegrationOutcome) {
        self.units_translated += outcome.units_translated;
        self.entries_skipped += outcome.skipped_translated + outcome.skipped_detached;
        self.reintegration_failures += outcome.failures.len();
        self.segments_dropped += outcome.dropped_segments.len();
    }
}

/// 一次翻译会话的全部状态，开始新翻译时整体丢弃
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    languages: Option<LanguagePair>,
    /// 0 号为主扫描集合，其后为变化监听发现的集合
    sets: Vec<UnitSet>,
    scheduler: ViewportScheduler,
    batcher: RequestBatcher,
    registry: NodeRegistry,
    known_nodes: HashSet<usize>,
    should_translate: bool,
    completed: bool,
    stats: EngineStats,
}

impl Session {
    fn new(config: &EngineConfig) -> Self {
        Self {
            state: SessionState::Idle,
            languages: None,
            sets: Vec::new(),
            scheduler: ViewportScheduler::new(0.0, 0.0),
            batcher: RequestBatcher::new(config.request_quota, config.max_retries),
            registry: NodeRegistry::default(),
            known_nodes: HashSet::new(),
            should_translate: false,
            completed: false,
            stats: EngineStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn languages(&self) -> Option<&LanguagePair> {
        self.languages.as_ref()
    }

    pub fn sets(&self) -> &[UnitSet] {
        &self.sets
    }

    pub fn scheduler(&self) -> &ViewportScheduler {
        &self.scheduler
    }

    pub fn batcher(&self) -> &RequestBatcher {
        &self.batcher
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    fn remember(&mut self, set: &UnitSet) {
        self.known_nodes.extend(set.node_keys());
    }
}

/// 翻译引擎
pub struct TranslationEngine<D, N, O> {
    document: D,
    network: N,
    observer: O,
    config: EngineConfig,
    scanner: TextNodeScanner,
    grouper: SemanticGrouper,
    session: Session,
    progress: Option<ProgressCallback>,
}

impl<D, N, O> TranslationEngine<D, N, O>
where
    D: DocumentAccessor,
    N: NetworkClient,
    O: ChangeObserver,
{
    /// 创建新的翻译引擎
    ///
    /// # 参数
    /// - `document`: 文档访问能力
    /// - `network`: 翻译后端
    /// - `observer`: DOM 变化监听
    /// - `config`: 引擎配置
    pub fn new(document: D, network: N, observer: O, config: EngineConfig) -> Self {
        let session = Session::new(&config);
        Self {
            document,
            network,
            observer,
            config,
            scanner: TextNodeScanner::default(),
            grouper: SemanticGrouper::new(),
            session,
            progress: None,
        }
    }

    /// 设置进度回调
    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: FnMut(Progress) + 'static,
    {
        self.progress = Some(Box::new(callback));
    }

    /// 打开或关闭逐条查询/译文的调试日志
    pub fn set_debug(&mut self, debug: bool) {
        self.config.debug = debug;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    pub fn network_mut(&mut self) -> &mut N {
        &mut self.network
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// 本次会话的源语言
    pub fn source_language(&self) -> Option<&str> {
        self.session.languages.as_ref().map(|l| l.source.as_str())
    }

    pub fn outstanding(&self) -> usize {
        self.session.batcher.outstanding()
    }

    pub fn abandoned(&self) -> usize {
        self.session.batcher.abandoned()
    }

    /// 开始翻译：先查询后端支持的语言，后续流程在 `pump` 中推进
    pub fn translate(&mut self, source: &str, target: &str) -> TranslationResult<()> {
        if !self.session.state.accepts_translate() {
            return Err(TranslationError::StateError(format!(
                "当前状态 {} 不能开始新的翻译",
                self.session.state
            )));
        }
        let languages = LanguagePair::new(source, target)?;
        tracing::info!("开始翻译: {} -> {}", languages.source, languages.target);

        self.observer.disconnect();
        let last_id = self.session.batcher.last_id();
        self.session = Session::new(&self.config);
        self.session.batcher.resume_ids_after(last_id);
        self.session.languages = Some(languages);
        self.session.state = SessionState::Checking;
        self.network.request_languages();
        Ok(())
    }

    /// 处理所有已完成的请求与已记录的 DOM 变化，直到没有新进展。
    /// 返回处理的事件数。
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let mut progressed = 0;
            while let Some(completion) = self.network.poll_completion() {
                self.handle_completion(completion);
                progressed += 1;
            }

            let records = self.observer.take_records();
            if !records.is_empty() {
                self.handle_mutations(&records);
                progressed += 1;
            }

            if self.session.batcher.has_pending() {
                self.drain_pending();
                progressed += 1;
            }

            if progressed == 0 {
                break;
            }
            handled += progressed;
        }
        handled
    }

    /// 处理滚动
    pub fn on_scroll(&mut self) {
        if !self.session.should_translate || self.session.sets.is_empty() {
            return;
        }
        let bottom = self.document.viewport_bottom();
        let moved = self
            .session
            .scheduler
            .on_scroll(bottom, &self.session.sets[0], &self.document);
        if moved {
            tracing::debug!(
                "滚动到 {:.0}px, 调度目标 {}",
                bottom,
                self.session.scheduler.target()
            );
            self.request_by_scroll();
        }
    }

    /// 回滚全部改动并停止本次会话
    pub fn revert(&mut self) -> RollbackReport {
        self.session.should_translate = false;
        self.observer.disconnect();

        let report = rollback_sets(&mut self.session.sets);
        self.session.sets.clear();
        self.session.known_nodes.clear();
        self.session.registry.clear();
        self.session.batcher.reset();
        self.session.state = SessionState::RolledBack;
        report
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Languages(result) => self.on_languages(result),
            Completion::Translate { id, result } => {
                if !self.session.should_translate {
                    tracing::debug!("会话已停止, 丢弃请求 {} 的结果", id);
                    self.session.batcher.forget(id);
                    return;
                }
                match result {
                    Ok(translations) => self.on_batch_success(id, translations),
                    Err(error) => self.on_batch_failure(id, error),
                }
            }
        }
    }

    fn on_languages(&mut self, result: TranslationResult<Vec<String>>) {
        if self.session.state != SessionState::Checking {
            tracing::debug!("忽略过期的语言列表结果");
            return;
        }
        let Some(languages) = self.session.languages.clone() else {
            return;
        };

        let supported = match result {
            Ok(list) => list.iter().any(|lang| lang == &languages.target),
            Err(error) => {
                helpers::log_error(&error);
                false
            }
        };

        if !supported {
            helpers::log_error(&TranslationError::UnsupportedLanguage(languages.target.clone()));
            self.session.state = SessionState::Unsupported;
            self.report(Progress::new(100, true, ErrorCode::TranslationError));
        } else if languages.is_same() {
            tracing::info!("源语言与目标语言相同, 无需翻译: {}", languages.source);
            self.session.state = SessionState::NoOp;
            self.report(Progress::new(100, true, ErrorCode::UnsupportedLanguage));
        } else {
            self.start_translation();
        }
    }

    fn start_translation(&mut self) {
        self.session.state = SessionState::Scanning;
        self.session.should_translate = true;

        let mut units = match self.document.body() {
            Some(body) => self.scanner.scan(&self.document, &body),
            None => {
                tracing::warn!("文档没有 body, 无可翻译内容");
                Vec::new()
            }
        };
        let grouping = self.grouper.group(&mut units);
        self.session.stats.units_scanned = units.len();
        self.session.stats.groups_formed = grouping.groups.len();
        self.session.stats.grouping_failures = grouping.failures.len();

        let set = UnitSet::by_position(units, &self.document);
        self.session.remember(&set);
        tracing::info!(
            "扫描完成: {} 个文本单元, {} 个合并组",
            set.len(),
            grouping.groups.len()
        );

        let margin = self
            .config
            .look_ahead_px
            .unwrap_or_else(|| self.document.viewport().height);
        self.session.scheduler = ViewportScheduler::new(margin, self.document.viewport_bottom());
        self.session.scheduler.update_target(&set, &self.document);
        self.session.sets = vec![set];

        self.session.state = SessionState::Translating;
        self.request_by_scroll();
    }

    /// 滚动路径：串行发送 `[done + 1, target]` 窗口
    fn request_by_scroll(&mut self) {
        loop {
            if !self.session.should_translate || self.session.batcher.is_scroll_busy() {
                return;
            }
            let Some(set) = self.session.sets.first() else {
                return;
            };
            let len = set.len();
            // 当前窗口已全部发送并完成
            let Some((start, end)) = self.session.scheduler.pending_window(len) else {
                self.mark_completed();
                return;
            };

            let plan = self
                .session
                .batcher
                .plan(set, Window::new(0, start, end, WindowOrigin::Scroll));
            if plan.load > 0 {
                self.dispatch_plan(plan);
                return;
            }

            // 窗口内没有需要发送的内容，直接推进
            self.session.scheduler.advance(plan.consumed.max(1), len);
        }
    }

    fn mark_completed(&mut self) {
        if self.session.completed {
            return;
        }
        self.session.completed = true;
        self.session.state = SessionState::Completed;
        tracing::info!(
            "首轮翻译完成: 已翻译 {} 个单元, 放弃 {} 条查询",
            self.session.stats.units_translated,
            self.session.batcher.abandoned()
        );
        self.report(Progress::new(100, true, ErrorCode::None));
        if let Some(body) = self.document.body() {
            self.observer.observe(&body, ObserveOptions::default());
        }
    }

    fn on_batch_success(&mut self, id: RequestId, translations: Vec<String>) {
        let Some(batch) = self.session.batcher.complete(id) else {
            tracing::warn!("收到未知请求 {} 的结果", id);
            return;
        };
        self.log_translations(&translations);

        let window = batch.plan.window;
        let outcome = match self.session.sets.get_mut(window.set) {
            Some(set) => Reintegrator::new(&self.grouper, &mut self.session.registry).apply(
                set,
                &batch.plan.heads,
                &translations,
            ),
            None => {
                helpers::log_error(&helpers::internal_error(format!(
                    "请求 {} 对应的单元集合 {} 不存在",
                    id, window.set
                )));
                return;
            }
        };
        self.session.stats.absorb(&outcome);

        match window.origin {
            WindowOrigin::Scroll => {
                let len = self.session.sets[0].len();
                self.session.scheduler.advance(batch.plan.consumed, len);
                if !self.session.completed {
                    let covered = self.session.scheduler.next_position();
                    let percent = (covered * 100 / len.max(1)).min(99) as u8;
                    self.report(Progress::new(percent, false, ErrorCode::None));
                }
                self.request_by_scroll();
            }
            WindowOrigin::Mutation => {
                if let Some(rest) = window.remainder(batch.plan.consumed) {
                    self.session.batcher.push_pending(rest);
                }
            }
        }
    }

    fn on_batch_failure(&mut self, id: RequestId, error: TranslationError) {
        helpers::log_error(&error);
        match self.session.batcher.fail(id, &error, &mut self.network) {
            FailureAction::Retried { .. } => {}
            FailureAction::Abandoned {
                load,
                consumed,
                window,
            } => match window.origin {
                WindowOrigin::Scroll => {
                    tracing::warn!("滚动批次被放弃 ({} 条查询), 滚动翻译停止", load);
                }
                WindowOrigin::Mutation => {
                    if let Some(rest) = window.remainder(consumed) {
                        self.session.batcher.push_pending(rest);
                    }
                }
            },
            FailureAction::Unknown => tracing::warn!("收到未知请求 {} 的失败结果", id),
        }
    }

    fn handle_mutations(&mut self, records: &[MutationRecord]) {
        if !self.session.should_translate || !self.session.completed {
            return;
        }
        let mut units = collect_changed_units(
            &mut self.scanner,
            &self.document,
            records,
            &self.session.registry,
            &self.session.known_nodes,
        );
        self.session.stats.mutation_rounds += 1;
        if units.is_empty() {
            return;
        }

        self.grouper.group(&mut units);
        let set = UnitSet::sequential(units);
        self.session.remember(&set);
        self.session.stats.mutation_units += set.len();
        tracing::debug!("DOM 变化: {} 条记录, 新文本单元 {} 个", records.len(), set.len());

        let index = self.session.sets.len();
        let end = set.len() - 1;
        self.session.sets.push(set);
        self.session
            .batcher
            .push_pending(Window::new(index, 0, end, WindowOrigin::Mutation));
    }

    /// 发送待处理的变化窗口；每个窗口按配额切出一个批次，剩余部分在完成后继续
    fn drain_pending(&mut self) {
        while let Some(window) = self.session.batcher.pop_pending() {
            if !self.session.should_translate {
                continue;
            }
            let Some(set) = self.session.sets.get(window.set) else {
                continue;
            };
            let plan = self.session.batcher.plan(set, window);
            if plan.load == 0 {
                if let Some(rest) = window.remainder(plan.consumed) {
                    self.session.batcher.push_pending(rest);
                }
                continue;
            }
            self.dispatch_plan(plan);
        }
    }

    fn dispatch_plan(&mut self, plan: BatchPlan) {
        self.log_queries(&plan.queries);
        let Some(languages) = self.session.languages.as_ref() else {
            return;
        };
        self.session.batcher.dispatch(
            plan,
            &languages.source,
            &languages.target,
            &mut self.network,
        );
    }

    fn report(&mut self, progress: Progress) {
        tracing::debug!(
            "进度: {}% finished={} error={}",
            progress.percent,
            progress.finished,
            progress.error
        );
        if let Some(callback) = self.progress.as_mut() {
            callback(progress);
        }
    }

    fn log_queries(&self, queries: &[String]) {
        if self.config.debug {
            for (i, query) in queries.iter().enumerate() {
                tracing::debug!("查询[{}]: {}", i, query);
            }
        }
    }

    fn log_translations(&self, translations: &[String]) {
        if self.config.debug {
            for (i, text) in translations.iter().enumerate() {
                tracing::debug!("译文[{}]: {}", i, text);
            }
        }
    }
}

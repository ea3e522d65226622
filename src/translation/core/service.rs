//! 宿主接口
//!
//! [`TranslateController`] 是宿主（浏览器壳层、CLI、测试）看到的唯一入口：
//! 开始翻译、撤销翻译，以及查询就绪状态、完成状态、错误码、检测到的源语言和各阶段耗时。

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::network::NetworkClient;
use crate::parsers::html::document::DocumentAccessor;
use crate::translation::core::engine::{Progress, TranslationEngine};
use crate::translation::core::rollback::RollbackReport;
use crate::translation::core::watcher::ChangeObserver;
use crate::translation::error::{helpers, ErrorCode};

#[derive(Debug, Default)]
struct HostStatus {
    finished: bool,
    error: ErrorCode,
    percent: u8,
    finished_at: Option<Instant>,
}

/// 宿主接口
pub struct TranslateController<D, N, O> {
    engine: TranslationEngine<D, N, O>,
    status: Rc<RefCell<HostStatus>>,
    lib_ready: bool,
    injected_at: Instant,
    loaded_at: Instant,
    ready_at: Instant,
    started_at: Option<Instant>,
}

impl<D, N, O> TranslateController<D, N, O>
where
    D: DocumentAccessor,
    N: NetworkClient,
    O: ChangeObserver,
{
    /// 包装引擎，接管它的进度回调
    pub fn new(mut engine: TranslationEngine<D, N, O>) -> Self {
        let injected_at = Instant::now();
        let status = Rc::new(RefCell::new(HostStatus::default()));

        let sink = Rc::clone(&status);
        engine.set_progress_callback(move |progress: Progress| {
            let mut status = sink.borrow_mut();
            status.percent = progress.percent;
            status.finished = progress.finished;
            status.error = progress.error;
            if progress.finished && !progress.error.is_error() {
                status.finished_at = Some(Instant::now());
            }
        });

        let loaded_at = Instant::now();
        Self {
            engine,
            status,
            lib_ready: true,
            injected_at,
            loaded_at,
            ready_at: Instant::now(),
            started_at: None,
        }
    }

    /// 开始翻译。未就绪时返回 `false`；调用失败时错误码为 `UnexpectedScriptError`。
    pub fn translate(&mut self, source: &str, target: &str) -> bool {
        {
            let mut status = self.status.borrow_mut();
            status.finished = false;
            status.error = ErrorCode::None;
            status.percent = 0;
            status.finished_at = None;
        }
        if !self.lib_ready {
            return false;
        }

        self.started_at = Some(Instant::now());
        match self.engine.translate(source, target) {
            Ok(()) => true,
            Err(error) => {
                helpers::log_error(&error);
                self.status.borrow_mut().error = ErrorCode::UnexpectedScriptError;
                false
            }
        }
    }

    /// 撤销翻译
    pub fn revert(&mut self) -> RollbackReport {
        self.engine.revert()
    }

    /// 处理后端完成的请求与 DOM 变化
    pub fn pump(&mut self) -> usize {
        self.engine.pump()
    }

    /// 宿主滚动后调用
    pub fn on_scroll(&mut self) {
        self.engine.on_scroll();
    }

    pub fn lib_ready(&self) -> bool {
        self.lib_ready
    }

    pub fn finished(&self) -> bool {
        self.status.borrow().finished
    }

    pub fn error(&self) -> bool {
        self.status.borrow().error.is_error()
    }

    pub fn error_code(&self) -> ErrorCode {
        self.status.borrow().error
    }

    pub fn progress(&self) -> u8 {
        self.status.borrow().percent
    }

    /// 检测到的源语言；仅在就绪、完成且没有错误时非空
    pub fn source_lang(&self) -> String {
        if !self.lib_ready || !self.finished() || self.error() {
            return String::new();
        }
        self.engine
            .source_language()
            .map(str::to_string)
            .unwrap_or_default()
    }

    /// 从注入到加载完成的耗时
    pub fn load_time(&self) -> Duration {
        self.loaded_at.duration_since(self.injected_at)
    }

    /// 从注入到就绪的耗时
    pub fn ready_time(&self) -> Duration {
        self.ready_at.duration_since(self.injected_at)
    }

    /// 最近一次翻译从开始到完成的耗时；尚未完成时为零
    pub fn translation_time(&self) -> Duration {
        match (self.started_at, self.status.borrow().finished_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }

    pub fn engine(&self) -> &TranslationEngine<D, N, O> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut TranslationEngine<D, N, O> {
        &mut self.engine
    }
}

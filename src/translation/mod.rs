//! 翻译模块
//!
//! 页内翻译的完整实现，采用清晰的模块化架构：
//! - **core**: 会话引擎、宿主接口、写回与回滚
//! - **pipeline**: 文本处理管道（扫描、过滤、分组、批次）
//! - **config**: 配置管理
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use inpage_translate::network::MemoryNetworkClient;
//! use inpage_translate::parsers::html::HtmlDocument;
//! use inpage_translate::translation::{EngineConfig, RecordingObserver, TranslateController, TranslationEngine};
//!
//! let doc = HtmlDocument::parse(b"<p>Hello <b>world</b>!</p>", "utf-8");
//! let network = MemoryNetworkClient::automatic(&["en", "ko"], |q| q.to_uppercase());
//! let engine = TranslationEngine::new(doc, network, RecordingObserver::new(), EngineConfig::default());
//! let mut host = TranslateController::new(engine);
//!
//! host.translate("en", "ko");
//! host.pump();
//! assert!(host.finished());
//! ```

/// 配置管理模块
///
/// 引擎参数、后端地址与配置文件/环境变量加载
pub mod config;

/// 会话引擎与宿主接口
pub mod core;

/// 错误处理模块 - 统一的错误类型与宿主错误码
pub mod error;

/// 文本处理管道模块 - 扫描、过滤、语义分组与批次切分
pub mod pipeline;

pub use config::{constants, BackendConfig, EngineConfig};
pub use core::{
    ChangeObserver, MutationKind, MutationLog, Progress, RecordingObserver, RollbackReport,
    SessionState, TranslateController, TranslationEngine,
};
pub use error::{ErrorCategory, ErrorCode, ErrorSeverity, TranslationError, TranslationResult};
pub use pipeline::{SemanticGrouper, TextFilter, TextNodeScanner, TextUnit, UnitSet};

/// 检查文本是否应该翻译
///
/// # Examples
///
/// ```rust
/// use inpage_translate::translation::should_translate;
///
/// assert!(should_translate("Hello World"));
/// assert!(!should_translate("123"));
/// assert!(!should_translate("   "));
/// ```
pub fn should_translate(text: &str) -> bool {
    TextFilter::new().should_translate(text)
}

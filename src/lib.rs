//! # In-page Translate
//!
//! 在已渲染的页面中就地翻译文本：按视口渐进请求译文、写回 DOM，
//! 监听后续的 DOM 变化，并可以随时完整撤销。
//!
//! ## 模块组织
//!
//! - `parsers` - HTML 解析、文档访问与序列化
//! - `network` - 翻译后端通信
//! - `translation` - 扫描、分组、调度、写回、回滚与宿主接口
//! - `env` - 环境变量

pub mod env;
pub mod network;
pub mod parsers;
pub mod translation;

pub use network::{MemoryNetworkClient, NetworkClient};
pub use parsers::{serialize_document, DocumentAccessor, HtmlDocument};
pub use translation::{
    EngineConfig, ErrorCode, RecordingObserver, TranslateController, TranslationEngine,
    TranslationError, TranslationResult,
};

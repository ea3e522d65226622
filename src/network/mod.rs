//! # 网络模块
//!
//! 翻译后端的通信层：
//!
//! - `client` - 后端接口、请求与完成结果类型、响应解析
//! - `memory` - 内存后端（脚本模式与自动模式）
//! - `http` - 基于 reqwest 的 HTTP 后端（需要 `http` 特性）

pub mod client;
#[cfg(feature = "http")]
pub mod http;
pub mod memory;

pub use client::{Completion, NetworkClient, RequestId, TranslateRequest};
#[cfg(feature = "http")]
pub use http::HttpNetworkClient;
pub use memory::{MemoryBackend, MemoryNetworkClient};

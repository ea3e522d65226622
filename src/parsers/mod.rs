//! # 解析器模块
//!
//! 页面文档的解析、访问与序列化。
//!
//! # 模块组织
//!
//! - `html` - HTML文档解析、DOM操作、布局查询、序列化

pub mod html;

pub use html::{html_to_dom, serialize_document, DocumentAccessor, HtmlDocument};

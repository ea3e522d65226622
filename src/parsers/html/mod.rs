//! HTML解析和处理模块
//!
//! - `dom`: 基础DOM操作（查询、插入、替换、克隆）
//! - `document`: 文档访问接口与无头布局
//! - `serializer`: 序列化功能

pub mod document;
pub mod dom;
pub mod serializer;

pub use document::{DocumentAccessor, HtmlDocument, Rect, Viewport};
pub use dom::{get_child_node_by_name, get_node_attr, get_node_name, html_to_dom};
pub use serializer::serialize_document;

//! 翻译管道模块
//!
//! 提供文本处理管道：收集、过滤、语义分组、分段标记与批次切分

pub mod batch;
pub mod collector;
pub mod filters;
pub mod grouper;
pub mod markup;

// 重新导出主要类型
pub use batch::{BatchPlan, FailureAction, RequestBatcher, Window, WindowOrigin};
pub use collector::{SemanticSnapshot, TextNodeScanner, TextUnit, UnitSet};
pub use filters::TextFilter;
pub use grouper::{GroupOutcome, SemanticGrouper};

//! 翻译核心模块
//!
//! 在管道（扫描、分组、批次）之上驱动一次页内翻译会话。
//!
//! ## 架构设计
//!
//! - **服务层** (`service.rs`): 宿主接口，维护完成状态、错误码与耗时
//! - **引擎层** (`engine.rs`): 会话状态机，协调调度、请求、写回与监听
//! - `scheduler.rs`: 按视口位置决定下一批发送范围
//! - `reintegrate.rs`: 把译文写回 DOM
//! - `rollback.rs`: 恢复原始内容
//! - `watcher.rs`: DOM 变化监听
//!
//! ## 模块依赖关系
//!
//! ```text
//! TranslateController (service.rs)
//!     └── TranslationEngine (engine.rs)
//!             ├── TextNodeScanner / SemanticGrouper (pipeline)
//!             ├── ViewportScheduler (scheduler.rs)
//!             ├── RequestBatcher (pipeline/batch.rs)
//!             ├── Reintegrator (reintegrate.rs)
//!             ├── rollback_sets (rollback.rs)
//!             └── ChangeObserver (watcher.rs)
//! ```

pub mod engine;
pub mod reintegrate;
pub mod rollback;
pub mod scheduler;
pub mod service;
pub mod watcher;

pub use engine::{
    EngineStats, LanguagePair, Progress, ProgressCallback, Session, SessionState,
    TranslationEngine,
};
pub use reintegrate::{NodeRegistry, ReintegrationOutcome, Reintegrator};
pub use rollback::{rollback_sets, RollbackReport};
pub use scheduler::ViewportScheduler;
pub use service::TranslateController;
pub use watcher::{
    ChangeObserver, MutationKind, MutationLog, MutationRecord, ObserveOptions, RecordingObserver,
};

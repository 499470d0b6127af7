//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `task_driver` - 任务驱动器
//! - 遍历记录集，跳过已提交索引（断点续跑）
//! - 控制并发数量（Semaphore 即背压）
//! - 推进进度计数，快速失败
//!
//! ### `app` - 应用装配
//! - 管理一次运行的生命周期（初始化、运行、统计）
//! - 显式构造并注入存储句柄与服务客户端
//!
//! ## 层次关系
//!
//! ```text
//! orchestrator (分发 Vec<Record>)
//!     ↓
//! workflow::RecordFlow (处理单条 Record)
//!     ↓
//! services (能力层：LLM 补全)
//!     ↓
//! infrastructure (基础设施：ResultStore)
//! ```

pub mod app;
pub mod task_driver;

pub use app::App;
pub use task_driver::{RunStats, TaskDriver};

//! # LLM Batch Engine
//!
//! 可断点续跑的数据集批量推理引擎：把"记录 → 若干次模型调用 → 结构化
//! 结果"的声明式描述，变成容错、限并发、幂等的批处理作业。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `ResultStore` - 唯一的 SQLite 连接 owner，提供 exists/put/count 能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单次调用
//! - `ChatBackend` / `LlmService` - LLM 补全能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一条记录"的完整处理流程
//! - `BackoffPolicy` - 退避策略（瞬时按时长 / 解析按次数）
//! - `ConversationRunner` - 多轮对话执行（上下文携带 + 变体轮换）
//! - `splice` - 字段拼接（点分路径，写时复制）
//! - `RecordFlow` - 流程编排（对话 → 拼接 → 恰好一次落库）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/task_driver` - 任务驱动器，断点续跑与并发控制
//! - `orchestrator/app` - 应用装配，管理一次运行的生命周期
//!
//! ## 失败语义
//!
//! 服务瞬时故障指数退避，解析失败轮换提示词变体；两类预算耗尽后
//! 写入哨兵结果（不再自动重试），其余错误快速失败中止运行。

pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, BackoffDecision, FailureKind};
pub use infrastructure::ResultStore;
pub use models::{ResultEntry, TaskSpec};
pub use orchestrator::{App, RunStats, TaskDriver};
pub use services::{ChatBackend, LlmService};
pub use workflow::{BackoffGrowth, BackoffPolicy, ConversationRunner, RecordFlow, RecordHandler};

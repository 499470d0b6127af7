//! 流程层（Workflow Layer）
//!
//! 定义"一条记录"的完整处理流程
//!
//! - `backoff` - 纯退避策略（瞬时故障按时长，解析失败按次数）
//! - `conversation` - 对话运行器（多轮上下文携带 + 变体轮换）
//! - `splice` - 字段拼接器（点分路径遍历，写时复制）
//! - `record_flow` - 记录处理流程（对话 → 拼接 → 恰好一次落库）
//! - `record_ctx` - 日志上下文封装

pub mod backoff;
pub mod conversation;
pub mod record_ctx;
pub mod record_flow;
pub mod splice;

pub use backoff::{BackoffGrowth, BackoffPolicy};
pub use conversation::{ConversationOutcome, ConversationRunner, ConversationSpec, TurnSpec};
pub use record_ctx::RecordCtx;
pub use record_flow::{RecordFlow, RecordHandler};
pub use splice::{splice, FieldMapping};

//! 业务能力层（Services Layer）
//!
//! 描述"我能做什么"，只处理单次调用，不关心流程

pub mod llm_service;

pub use llm_service::{ChatBackend, LlmService};

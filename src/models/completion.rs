//! LLM 服务边界的数据类型
//!
//! 请求 / 响应形状与具体后端无关，`services::llm_service` 负责翻译成
//! async-openai 的请求结构

use serde::Deserialize;
use serde_json::Value;

/// 推理强度
///
/// 透传给服务端的 reasoning effort 档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffortLevel {
    /// 不做显式推理（映射到服务端最低档）
    None,
    Low,
    Medium,
    High,
}

/// 对话消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// 一条对话消息
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// 一次补全请求
///
/// `turns` 携带本次对话已完成的全部轮次（跨轮一致性的来源），
/// 最后一条必须是待回答的 user 消息
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// 系统提示词（整个对话期间保持不变）
    pub system_prompt: Option<String>,
    /// 按序排列的对话消息
    pub turns: Vec<ChatTurn>,
    pub temperature: f32,
    pub effort: EffortLevel,
    /// 期望的响应 JSON schema（None 表示自由文本）
    pub response_schema: Option<Value>,
}

/// 一次补全响应
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// 原始文本内容，上游缺失时为 None
    pub content: Option<String>,
    /// 按 schema 解析出的结构化内容，解析失败时为 None
    pub parsed: Option<Value>,
    /// 模型自身的推理文本（若服务端分离返回）
    pub reasoning: Option<String>,
}

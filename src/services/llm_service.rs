//! LLM 服务 - 业务能力层
//!
//! 只负责"发起一次补全"能力，不关心对话流程和重试
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）
//!
//! `ChatBackend` trait 是引擎与服务之间的缝合点：生产环境用
//! `LlmService`，测试用脚本化的桩实现。

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ReasoningEffort, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, ServiceError};
use crate::models::completion::{CompletionRequest, CompletionResponse, EffortLevel, Role};

/// 补全后端接口
///
/// 引擎内部一律面向此 trait 编程，保证对话运行器可以在确定性的
/// 桩后端上测试
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// 发起一次补全调用
    async fn complete(&self, request: CompletionRequest) -> AppResult<CompletionResponse>;
}

/// LLM 服务
///
/// 职责：
/// - 把 `CompletionRequest` 翻译为 async-openai 请求并调用 API
/// - 剥离代码围栏并按需解析 JSON
/// - 只处理单次调用，不出现重试 / 变体 / 记录索引
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
    max_tokens: u32,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        Self {
            client,
            model_name: config.llm_model_name.clone(),
            max_tokens: config.llm_max_tokens,
        }
    }

    fn effort_to_api(effort: EffortLevel) -> ReasoningEffort {
        match effort {
            EffortLevel::None => ReasoningEffort::Minimal,
            EffortLevel::Low => ReasoningEffort::Low,
            EffortLevel::Medium => ReasoningEffort::Medium,
            EffortLevel::High => ReasoningEffort::High,
        }
    }
}

/// 剥离模型输出外层的 Markdown 代码围栏
///
/// 模型在要求"只输出 JSON"时仍经常包一层 ```json 围栏
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// 按需把文本内容解析为 JSON
///
/// 未声明 schema 时返回 None；声明了 schema 但内容不是合法 JSON 时
/// 也返回 None（交由对话运行器归类为结构性失败）
pub fn parse_structured(content: &str, schema: Option<&Value>) -> Option<Value> {
    schema?;
    serde_json::from_str(strip_code_fences(content)).ok()
}

#[async_trait]
impl ChatBackend for LlmService {
    async fn complete(&self, request: CompletionRequest) -> AppResult<CompletionResponse> {
        debug!(
            "调用 LLM API，模型: {}，消息数: {}",
            self.model_name,
            request.turns.len()
        );

        // 构建消息列表
        let mut messages = Vec::new();

        if let Some(sys_msg) = &request.system_prompt {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg.as_str())
                .build()
                .map_err(|e| AppError::service_call_failed(&self.model_name, e))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        for turn in &request.turns {
            let msg = match turn.role {
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(turn.content.as_str())
                        .build()
                        .map_err(|e| AppError::service_call_failed(&self.model_name, e))?,
                ),
                Role::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(turn.content.as_str())
                        .build()
                        .map_err(|e| AppError::service_call_failed(&self.model_name, e))?,
                ),
            };
            messages.push(msg);
        }

        // 构建请求
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model_name)
            .messages(messages)
            .temperature(request.temperature)
            .reasoning_effort(Self::effort_to_api(request.effort))
            .max_tokens(self.max_tokens);

        if let Some(schema) = &request.response_schema {
            builder.response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    name: "result".to_string(),
                    description: None,
                    schema: Some(schema.clone()),
                    strict: Some(true),
                },
            });
        }

        let api_request = builder
            .build()
            .map_err(|e| AppError::service_call_failed(&self.model_name, e))?;

        // 调用 API
        let response = self
            .client
            .chat()
            .create(api_request)
            .await
            .map_err(|e| {
                warn!("LLM API 调用失败: {}", e);
                AppError::service_call_failed(&self.model_name, e)
            })?;

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            AppError::Service(ServiceError::EmptyResponse {
                model: self.model_name.clone(),
            })
        })?;

        debug!("LLM API 调用成功");

        let content = choice.message.content;
        let parsed = content
            .as_deref()
            .and_then(|c| parse_structured(c, request.response_schema.as_ref()));
        let reasoning = choice.message.reasoning_content;

        Ok(CompletionResponse {
            content,
            parsed,
            reasoning,
        })
    }
}

//! 对话运行器 - 流程层
//!
//! 按顺序执行一个对话变体中的全部轮次，把已完成的轮次回灌为上下文，
//! 在结果轮做字段拼接。原先写成 `while True` + 手动 sleep 的重试循环，
//! 这里改为显式状态推进 + 纯退避策略：
//!
//! - 服务瞬时故障 → 按退避策略等待后**从空上下文重启对话**
//! - 解析失败 → 递增解析计数（驱动变体轮换）后重启对话
//! - 预算耗尽 → 以哨兵结果收场（`Failed`，不再自动重试）
//! - 其余错误 → 原样上抛，由任务驱动器中止运行
//!
//! 上下文只在单次对话尝试内严格向前携带，重启后只有计数器幸存。

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{
    AppError, AppResult, BackoffDecision, ConfigError, FailureKind, ParseError,
};
use crate::models::completion::{ChatTurn, CompletionRequest, EffortLevel};
use crate::models::entry::{sentinel_content, SENTINEL_MISSING_JSON, SENTINEL_MISSING_OUTPUT};
use crate::services::llm_service::{parse_structured, ChatBackend};
use crate::workflow::backoff::BackoffPolicy;
use crate::workflow::record_ctx::RecordCtx;
use crate::workflow::splice::{splice, FieldMapping};

/// 一个轮次的声明
#[derive(Debug, Clone)]
pub struct TurnSpec {
    /// 提示词模板，`{name}` 占位符从替换表取值
    pub prompt_template: String,
    /// 响应文本是否追加进推理轨迹
    pub as_reasoning: bool,
    /// 响应是否作为本次对话的结果载荷
    pub as_result: bool,
    /// 是否捕获模型自身分离返回的推理文本
    pub capture_model_reasoning: bool,
    /// 期望的响应 JSON schema（None 表示自由文本轮）
    pub response_schema: Option<Value>,
    pub temperature: f32,
    pub effort: EffortLevel,
}

/// 一个对话变体：有序的轮次列表
#[derive(Debug, Clone)]
pub struct ConversationSpec {
    pub turns: Vec<TurnSpec>,
}

/// 一次对话调用的输入
///
/// `mappings` 和 `record` 在结果轮内使用：拼接失败要参与解析重试，
/// 所以拼接必须发生在对话循环内部而不是之后
pub struct ConversationInput<'a> {
    pub system_prompt: &'a str,
    pub variants: &'a [ConversationSpec],
    pub substitutions: &'a HashMap<String, String>,
    pub mappings: &'a [FieldMapping],
    pub record: &'a Value,
}

/// 对话结束状态
#[derive(Debug)]
pub enum ConversationOutcome {
    /// 最后一轮正常完成
    Done {
        content: Value,
        reasoning: Vec<String>,
    },
    /// 重试预算耗尽，`content` 为哨兵对象
    Failed {
        content: Value,
        reasoning: Vec<String>,
    },
}

/// 渲染提示词模板
///
/// `{name}` 从替换表取值，`{{` / `}}` 转义为字面大括号。
/// 引用了不存在的变量视为配置错误（不参与重试）。
pub fn render_template(template: &str, subs: &HashMap<String, String>) -> AppResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut name = String::new();
                for nc in chars.by_ref() {
                    if nc == '}' {
                        break;
                    }
                    name.push(nc);
                }
                match subs.get(&name) {
                    Some(value) => out.push_str(value),
                    None => {
                        return Err(AppError::Config(ConfigError::TemplateVarMissing { name }));
                    }
                }
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                }
                out.push('}');
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// 单个轮次的成功产物
struct TurnResult {
    /// 原始响应文本，回灌为后续轮次的上下文
    raw: String,
    /// 结果轮拼接出的记录内容
    spliced: Option<Value>,
    /// 本轮新增的推理轨迹片段
    trace: Vec<String>,
}

/// 对话运行器
pub struct ConversationRunner<'a> {
    backend: &'a dyn ChatBackend,
    policy: &'a BackoffPolicy,
}

impl<'a> ConversationRunner<'a> {
    /// 创建新的对话运行器
    pub fn new(backend: &'a dyn ChatBackend, policy: &'a BackoffPolicy) -> Self {
        Self { backend, policy }
    }

    /// 运行一次完整对话（含重试与变体轮换）
    ///
    /// # 返回
    /// - `Ok(Done)`：结果轮产出的拼接内容 + 推理轨迹
    /// - `Ok(Failed)`：预算耗尽后的哨兵内容（调用方照常落库）
    /// - `Err(_)`：不可恢复的程序 / 配置错误
    pub async fn run(
        &self,
        input: &ConversationInput<'_>,
        ctx: RecordCtx,
    ) -> AppResult<ConversationOutcome> {
        let variant_count = input.variants.len();
        if variant_count == 0 {
            return Err(AppError::Config(ConfigError::TaskSpecInvalid {
                reason: "至少需要一个对话变体".to_string(),
            }));
        }
        let turns_per_variant = input.variants[0].turns.len().max(1) as u32;

        let mut transient_attempts: u32 = 0;
        let mut parse_attempts: u32 = 0;
        // 轨迹跨重启保留：失败的尝试也留下可审计的痕迹
        let mut reasoning_trace: Vec<String> = Vec::new();

        'conversation: loop {
            // 每次重启重新选择变体：解析重试轮换提示词措辞
            let v = ((parse_attempts / turns_per_variant) as usize) % variant_count;
            let variant = &input.variants[v];
            let mut context: Vec<ChatTurn> = Vec::new();
            let mut content: Option<Value> = None;

            for (turn_index, turn) in variant.turns.iter().enumerate() {
                let prompt = render_template(&turn.prompt_template, input.substitutions)?;
                debug!("{} 变体[{}] 轮次[{}]", ctx, v, turn_index);

                match self
                    .try_turn(input, turn, v, turn_index, &context, &prompt)
                    .await
                {
                    Ok(result) => {
                        reasoning_trace.extend(result.trace);
                        if let Some(spliced) = result.spliced {
                            content = Some(spliced);
                        }
                        // 本轮提问与回答进入后续轮次的上下文
                        context.push(ChatTurn::user(prompt));
                        context.push(ChatTurn::assistant(result.raw));
                    }
                    Err(e) => match e.failure_kind() {
                        Some(FailureKind::Transient) => {
                            match self.policy.decide(
                                transient_attempts,
                                FailureKind::Transient,
                                variant_count,
                            ) {
                                BackoffDecision::Wait(delay) => {
                                    warn!(
                                        "{} 服务错误: {}，{}秒后重试",
                                        ctx,
                                        e,
                                        delay.as_secs()
                                    );
                                    transient_attempts += 1;
                                    tokio::time::sleep(delay).await;
                                    continue 'conversation;
                                }
                                BackoffDecision::GiveUp => {
                                    warn!("{} 服务错误: {}，退避超限，放弃", ctx, e);
                                    return Ok(ConversationOutcome::Failed {
                                        content: sentinel_content(SENTINEL_MISSING_OUTPUT),
                                        reasoning: reasoning_trace,
                                    });
                                }
                            }
                        }
                        Some(FailureKind::Parse) => {
                            match self.policy.decide(
                                parse_attempts,
                                FailureKind::Parse,
                                variant_count,
                            ) {
                                BackoffDecision::Wait(_) => {
                                    warn!("{} 解析失败，轮换变体重试: {}", ctx, e);
                                    parse_attempts += 1;
                                    continue 'conversation;
                                }
                                BackoffDecision::GiveUp => {
                                    warn!("{} 解析失败: {}，变体预算耗尽，放弃", ctx, e);
                                    return Ok(ConversationOutcome::Failed {
                                        content: sentinel_content(SENTINEL_MISSING_JSON),
                                        reasoning: reasoning_trace,
                                    });
                                }
                            }
                        }
                        None => return Err(e),
                    },
                }
            }

            // 最后一轮完成即 DONE
            let content = content.ok_or_else(|| {
                AppError::Config(ConfigError::TaskSpecInvalid {
                    reason: "没有任何轮次声明 as_result".to_string(),
                })
            })?;
            debug!("{} 对话完成 (变体: {})", ctx, v);
            return Ok(ConversationOutcome::Done {
                content,
                reasoning: reasoning_trace,
            });
        }
    }

    /// 执行单个轮次：调用后端、校验结构、按需拼接
    async fn try_turn(
        &self,
        input: &ConversationInput<'_>,
        turn: &TurnSpec,
        variant: usize,
        turn_index: usize,
        context: &[ChatTurn],
        prompt: &str,
    ) -> AppResult<TurnResult> {
        let mut turns = context.to_vec();
        turns.push(ChatTurn::user(prompt.to_string()));

        let request = CompletionRequest {
            system_prompt: Some(input.system_prompt.to_string()),
            turns,
            temperature: turn.temperature,
            effort: turn.effort,
            response_schema: turn.response_schema.clone(),
        };

        let response = self.backend.complete(request).await?;

        let raw = response.content.ok_or(ParseError::EmptyContent {
            variant,
            turn: turn_index,
        })?;

        let mut trace = Vec::new();
        let mut spliced = None;

        if turn.response_schema.is_some() {
            // 结构轮：必须能解析出 JSON
            let parsed = response
                .parsed
                .or_else(|| parse_structured(&raw, turn.response_schema.as_ref()))
                .ok_or_else(|| {
                    AppError::json_parse_failed(truncate_for_log(&raw, 120))
                })?;

            if turn.as_reasoning {
                trace.push(raw.clone());
            }
            if turn.as_result {
                spliced = Some(splice(input.record, &parsed, input.mappings)?);
            }
        } else {
            if turn.as_reasoning {
                trace.push(raw.clone());
            }
            if turn.as_result {
                // 自由文本结果：包成字符串值再走拼接
                let payload = Value::String(raw.clone());
                spliced = Some(splice(input.record, &payload, input.mappings)?);
            }
        }

        if turn.capture_model_reasoning {
            if let Some(reasoning) = response.reasoning {
                trace.push(reasoning);
            }
        }

        Ok(TurnResult { raw, spliced, trace })
    }
}

fn truncate_for_log(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::models::completion::CompletionResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// 脚本化补全后端：按预设顺序回放响应并记录请求
    struct ScriptedBackend {
        script: Mutex<Vec<AppResult<CompletionResponse>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<AppResult<CompletionResponse>>) -> Self {
            let mut script = script;
            script.reverse();
            Self {
                script: Mutex::new(script),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn text(content: &str) -> AppResult<CompletionResponse> {
            Ok(CompletionResponse {
                content: Some(content.to_string()),
                parsed: None,
                reasoning: None,
            })
        }

        fn text_with_reasoning(content: &str, reasoning: &str) -> AppResult<CompletionResponse> {
            Ok(CompletionResponse {
                content: Some(content.to_string()),
                parsed: None,
                reasoning: Some(reasoning.to_string()),
            })
        }

        fn rate_limited() -> AppResult<CompletionResponse> {
            Err(AppError::Service(ServiceError::RateLimited {
                model: "stub".to_string(),
            }))
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn complete(&self, request: CompletionRequest) -> AppResult<CompletionResponse> {
            self.requests.lock().unwrap().push(request);
            self.script
                .lock()
                .unwrap()
                .pop()
                .expect("脚本响应已耗尽")
        }
    }

    fn schema() -> Value {
        json!({"type": "object"})
    }

    fn plan_then_translate_variant(marker: &str) -> ConversationSpec {
        ConversationSpec {
            turns: vec![
                TurnSpec {
                    prompt_template: format!("{}为翻译 {{input}} 制定计划", marker),
                    as_reasoning: true,
                    as_result: false,
                    capture_model_reasoning: false,
                    response_schema: None,
                    temperature: 0.7,
                    effort: EffortLevel::Medium,
                },
                TurnSpec {
                    prompt_template: "按计划输出翻译 JSON".to_string(),
                    as_reasoning: false,
                    as_result: true,
                    capture_model_reasoning: false,
                    response_schema: Some(schema()),
                    temperature: 0.5,
                    effort: EffortLevel::None,
                },
            ],
        }
    }

    fn subs() -> HashMap<String, String> {
        HashMap::from([("input".to_string(), "原文".to_string())])
    }

    #[test]
    fn test_render_template() {
        let subs = HashMap::from([("name".to_string(), "世界".to_string())]);
        assert_eq!(render_template("你好 {name}", &subs).unwrap(), "你好 世界");
        // 转义的大括号保持字面
        assert_eq!(
            render_template("{{\"k\": {name}}}", &subs).unwrap(),
            "{\"k\": 世界}"
        );
    }

    #[test]
    fn test_render_template_missing_var_is_fatal() {
        let err = render_template("{missing}", &HashMap::new()).unwrap_err();
        assert_eq!(err.failure_kind(), None);
    }

    #[tokio::test]
    async fn test_two_turn_conversation_carries_context() {
        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::text("这是计划"),
            ScriptedBackend::text(r#"{"prompt": "译文"}"#),
        ]);
        let policy = BackoffPolicy::default();
        let runner = ConversationRunner::new(&backend, &policy);

        let variants = vec![plan_then_translate_variant("")];
        let record = json!({"prompt": "原文", "extra": 1});
        let substitutions = subs();
        let mappings = vec![FieldMapping::parse("prompt")];
        let input = ConversationInput {
            system_prompt: "系统提示",
            variants: &variants,
            substitutions: &substitutions,
            mappings: &mappings,
            record: &record,
        };

        let outcome = runner.run(&input, RecordCtx::new(0)).await.unwrap();

        match outcome {
            ConversationOutcome::Done { content, reasoning } => {
                // 字段拼接：只有映射的键被替换
                assert_eq!(content, json!({"prompt": "译文", "extra": 1}));
                // 计划轮进入推理轨迹
                assert_eq!(reasoning, vec!["这是计划".to_string()]);
            }
            other => panic!("期望 Done，得到 {:?}", other),
        }

        // 第二次调用必须携带第一轮的问答作为上下文
        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].turns.len(), 1);
        assert_eq!(requests[1].turns.len(), 3);
        assert_eq!(requests[1].turns[1].content, "这是计划");
        // 系统提示在各轮保持不变
        assert_eq!(requests[1].system_prompt.as_deref(), Some("系统提示"));
    }

    #[tokio::test]
    async fn test_parse_failure_rotates_variant_and_resets_context() {
        // 两个单轮变体：第一次输出非法 JSON → 轮换到第二个变体后成功
        let make_variant = |marker: &str| ConversationSpec {
            turns: vec![TurnSpec {
                prompt_template: format!("{}翻译 {{input}}", marker),
                as_reasoning: false,
                as_result: true,
                capture_model_reasoning: false,
                response_schema: Some(schema()),
                temperature: 0.5,
                effort: EffortLevel::Medium,
            }],
        };
        let variants = vec![make_variant("A:"), make_variant("B:")];

        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::text("不是JSON"),
            ScriptedBackend::text(r#"{"prompt": "ok"}"#),
        ]);
        let policy = BackoffPolicy::default();
        let runner = ConversationRunner::new(&backend, &policy);

        let record = json!({"prompt": "原文"});
        let substitutions = subs();
        let mappings = vec![FieldMapping::parse("prompt")];
        let input = ConversationInput {
            system_prompt: "s",
            variants: &variants,
            substitutions: &substitutions,
            mappings: &mappings,
            record: &record,
        };

        let outcome = runner.run(&input, RecordCtx::new(7)).await.unwrap();
        assert!(matches!(outcome, ConversationOutcome::Done { .. }));

        let requests = backend.requests.lock().unwrap();
        assert!(requests[0].turns[0].content.starts_with("A:"));
        assert!(requests[1].turns[0].content.starts_with("B:"));
        // 重启后上下文清空
        assert_eq!(requests[1].turns.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_exhaustion_yields_missing_output_sentinel() {
        // 持续限流：2+4+8+16 秒退避后放弃，共 5 次调用
        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::rate_limited(),
            ScriptedBackend::rate_limited(),
            ScriptedBackend::rate_limited(),
            ScriptedBackend::rate_limited(),
            ScriptedBackend::rate_limited(),
        ]);
        let policy = BackoffPolicy::default();
        let runner = ConversationRunner::new(&backend, &policy);

        let variants = vec![plan_then_translate_variant("")];
        let record = json!({"prompt": "原文"});
        let substitutions = subs();
        let mappings = vec![FieldMapping::parse("prompt")];
        let input = ConversationInput {
            system_prompt: "s",
            variants: &variants,
            substitutions: &substitutions,
            mappings: &mappings,
            record: &record,
        };

        let outcome = runner.run(&input, RecordCtx::new(0)).await.unwrap();
        match outcome {
            ConversationOutcome::Failed { content, .. } => {
                assert_eq!(content["content"], SENTINEL_MISSING_OUTPUT);
            }
            other => panic!("期望 Failed，得到 {:?}", other),
        }
        assert_eq!(backend.request_count(), 5);
    }

    #[tokio::test]
    async fn test_parse_exhaustion_yields_missing_json_sentinel() {
        // 单变体单轮：初次 + 3 次重试全部输出非法 JSON → 哨兵
        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::text("x"),
            ScriptedBackend::text("x"),
            ScriptedBackend::text("x"),
            ScriptedBackend::text("x"),
        ]);
        let policy = BackoffPolicy::default();
        let runner = ConversationRunner::new(&backend, &policy);

        let variants = vec![ConversationSpec {
            turns: vec![TurnSpec {
                prompt_template: "翻译 {input}".to_string(),
                as_reasoning: false,
                as_result: true,
                capture_model_reasoning: false,
                response_schema: Some(schema()),
                temperature: 0.5,
                effort: EffortLevel::Medium,
            }],
        }];
        let record = json!({"prompt": "原文"});
        let substitutions = subs();
        let mappings = vec![FieldMapping::parse("prompt")];
        let input = ConversationInput {
            system_prompt: "s",
            variants: &variants,
            substitutions: &substitutions,
            mappings: &mappings,
            record: &record,
        };

        let outcome = runner.run(&input, RecordCtx::new(0)).await.unwrap();
        match outcome {
            ConversationOutcome::Failed { content, .. } => {
                assert_eq!(content["content"], SENTINEL_MISSING_JSON);
            }
            other => panic!("期望 Failed，得到 {:?}", other),
        }
        assert_eq!(backend.request_count(), 4);
    }

    #[tokio::test]
    async fn test_model_reasoning_captured_into_trace() {
        // 模型分离返回的推理文本跟在本轮响应文本之后进入轨迹
        let backend = ScriptedBackend::new(vec![ScriptedBackend::text_with_reasoning(
            r#"{"prompt": "译文"}"#,
            "模型思考过程",
        )]);
        let policy = BackoffPolicy::default();
        let runner = ConversationRunner::new(&backend, &policy);

        let variants = vec![ConversationSpec {
            turns: vec![TurnSpec {
                prompt_template: "翻译 {input}".to_string(),
                as_reasoning: true,
                as_result: true,
                capture_model_reasoning: true,
                response_schema: Some(schema()),
                temperature: 0.5,
                effort: EffortLevel::High,
            }],
        }];
        let record = json!({"prompt": "原文"});
        let substitutions = subs();
        let mappings = vec![FieldMapping::parse("prompt")];
        let input = ConversationInput {
            system_prompt: "s",
            variants: &variants,
            substitutions: &substitutions,
            mappings: &mappings,
            record: &record,
        };

        let outcome = runner.run(&input, RecordCtx::new(0)).await.unwrap();
        match outcome {
            ConversationOutcome::Done { content, reasoning } => {
                assert_eq!(content["prompt"], "译文");
                assert_eq!(
                    reasoning,
                    vec![
                        r#"{"prompt": "译文"}"#.to_string(),
                        "模型思考过程".to_string(),
                    ]
                );
            }
            other => panic!("期望 Done，得到 {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_splice_field_counts_as_parse_retry() {
        // 响应缺少映射字段 → 结构性重试，第二次补齐后成功
        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::text(r#"{"other": 1}"#),
            ScriptedBackend::text(r#"{"prompt": "好"}"#),
        ]);
        let policy = BackoffPolicy::default();
        let runner = ConversationRunner::new(&backend, &policy);

        let variants = vec![ConversationSpec {
            turns: vec![TurnSpec {
                prompt_template: "翻译 {input}".to_string(),
                as_reasoning: false,
                as_result: true,
                capture_model_reasoning: false,
                response_schema: Some(schema()),
                temperature: 0.5,
                effort: EffortLevel::Medium,
            }],
        }];
        let record = json!({"prompt": "原文"});
        let substitutions = subs();
        let mappings = vec![FieldMapping::parse("prompt")];
        let input = ConversationInput {
            system_prompt: "s",
            variants: &variants,
            substitutions: &substitutions,
            mappings: &mappings,
            record: &record,
        };

        let outcome = runner.run(&input, RecordCtx::new(0)).await.unwrap();
        match outcome {
            ConversationOutcome::Done { content, .. } => {
                assert_eq!(content["prompt"], "好");
            }
            other => panic!("期望 Done，得到 {:?}", other),
        }
        assert_eq!(backend.request_count(), 2);
    }
}

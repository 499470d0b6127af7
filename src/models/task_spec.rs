//! 任务定义
//!
//! 一个任务 = 系统提示词 + 若干对话变体 + 字段映射 + 替换表。
//! 以前这些都硬编码在各数据集的处理器代码里，几乎逐份复制；现在
//! 收敛为 TOML 数据文件，引擎保持通用。
//!
//! ## 文件格式
//!
//! ```toml
//! system_prompt = "你是大规模语言模型……"
//! replace_keys = ["prompt", "Rubrics:reward_model.rubrics"]
//! max_record_chars = 16384
//!
//! [substitutions]
//! input_json_str = "."          # "." 表示整条记录紧凑序列化
//!
//! [[variant]]
//! [[variant.turn]]
//! prompt = "为翻译 {input_json_str} 制定完整计划，只输出计划。"
//! as_reasoning = true
//! temperature = 0.7
//! effort = "medium"
//!
//! [[variant.turn]]
//! prompt = "按计划执行翻译，只输出 JSON。"
//! as_result = true
//! response_schema = '{"type": "object"}'
//! temperature = 0.5
//! effort = "none"
//! ```
//!
//! `replace_keys` 为空表示整个响应直接替换记录。

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{AppError, AppResult, ConfigError};
use crate::models::completion::EffortLevel;
use crate::workflow::conversation::{ConversationSpec, TurnSpec};
use crate::workflow::splice::FieldMapping;

fn default_temperature() -> f32 {
    0.5
}

fn default_effort() -> EffortLevel {
    EffortLevel::Medium
}

/// TOML 任务文件的反序列化形状
#[derive(Debug, Deserialize)]
pub struct TaskSpecFile {
    /// 系统提示词（整个对话期间不变）
    pub system_prompt: String,
    /// 字段映射的紧凑写法，空列表表示整体替换
    #[serde(default)]
    pub replace_keys: Vec<String>,
    /// 模板变量 → 记录内点分路径（`"."` = 整条记录紧凑序列化）
    #[serde(default)]
    pub substitutions: BTreeMap<String, String>,
    /// 记录紧凑序列化后的长度上限，超过即跳过（处理器层过滤）
    #[serde(default)]
    pub max_record_chars: Option<usize>,
    /// 对话变体，解析失败时按序轮换
    #[serde(rename = "variant")]
    pub variants: Vec<VariantFile>,
}

#[derive(Debug, Deserialize)]
pub struct VariantFile {
    #[serde(rename = "turn")]
    pub turns: Vec<TurnFile>,
}

#[derive(Debug, Deserialize)]
pub struct TurnFile {
    pub prompt: String,
    #[serde(default)]
    pub as_reasoning: bool,
    #[serde(default)]
    pub as_result: bool,
    #[serde(default)]
    pub capture_model_reasoning: bool,
    /// 内联 JSON schema 字符串
    #[serde(default)]
    pub response_schema: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_effort")]
    pub effort: EffortLevel,
}

/// 校验完毕的运行时任务定义
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub system_prompt: String,
    pub variants: Vec<ConversationSpec>,
    pub mappings: Vec<FieldMapping>,
    /// (模板变量名, 记录内路径)
    pub substitutions: Vec<(String, String)>,
    pub max_record_chars: Option<usize>,
}

impl TaskSpecFile {
    /// 转换并校验为运行时任务定义
    ///
    /// 校验项：
    /// - 至少一个变体；各变体轮次数一致（变体轮换公式的前提）
    /// - 每个变体恰有一个 `as_result` 轮
    /// - `response_schema` 字符串必须是合法 JSON
    pub fn into_task_spec(self) -> AppResult<TaskSpec> {
        if self.variants.is_empty() {
            return Err(invalid("至少需要一个对话变体"));
        }

        let turn_count = self.variants[0].turns.len();
        if turn_count == 0 {
            return Err(invalid("变体不能没有轮次"));
        }

        let mut variants = Vec::with_capacity(self.variants.len());
        for (vi, variant) in self.variants.into_iter().enumerate() {
            if variant.turns.len() != turn_count {
                return Err(invalid(format!(
                    "变体 {} 的轮次数 ({}) 与变体 0 ({}) 不一致",
                    vi,
                    variant.turns.len(),
                    turn_count
                )));
            }

            let mut turns = Vec::with_capacity(variant.turns.len());
            let mut result_turns = 0usize;
            for (ti, turn) in variant.turns.into_iter().enumerate() {
                if turn.as_result {
                    result_turns += 1;
                }
                let response_schema = match turn.response_schema {
                    None => None,
                    Some(raw) => {
                        let schema: Value = serde_json::from_str(&raw).map_err(|e| {
                            invalid(format!("变体 {} 轮次 {} 的 schema 不是合法 JSON: {}", vi, ti, e))
                        })?;
                        Some(schema)
                    }
                };
                turns.push(TurnSpec {
                    prompt_template: turn.prompt,
                    as_reasoning: turn.as_reasoning,
                    as_result: turn.as_result,
                    capture_model_reasoning: turn.capture_model_reasoning,
                    response_schema,
                    temperature: turn.temperature,
                    effort: turn.effort,
                });
            }

            if result_turns != 1 {
                return Err(invalid(format!(
                    "变体 {} 必须恰有一个 as_result 轮次（实际 {}）",
                    vi, result_turns
                )));
            }
            variants.push(ConversationSpec { turns });
        }

        let mappings = if self.replace_keys.is_empty() {
            vec![FieldMapping::replace_all()]
        } else {
            self.replace_keys
                .iter()
                .map(|k| FieldMapping::parse(k))
                .collect()
        };

        Ok(TaskSpec {
            system_prompt: self.system_prompt,
            variants,
            mappings,
            substitutions: self.substitutions.into_iter().collect(),
            max_record_chars: self.max_record_chars,
        })
    }
}

fn invalid(reason: impl Into<String>) -> AppError {
    AppError::Config(ConfigError::TaskSpecInvalid {
        reason: reason.into(),
    })
}

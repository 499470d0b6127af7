//! 记录处理流程 - 流程层
//!
//! 定义"一条记录"的完整处理流程：构建替换表 → 运行对话 → 序列化
//! 推理轨迹 → 恰好一次落库（成功或哨兵都落库，保证后续运行不再
//! 重试该索引）。
//!
//! 过长记录的跳过是数据集层面的过滤策略，留在处理器这一层，
//! 不进入任务驱动器的契约。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{AppError, AppResult, ConfigError};
use crate::infrastructure::result_store::ResultStore;
use crate::models::entry::ResultEntry;
use crate::models::task_spec::TaskSpec;
use crate::services::llm_service::ChatBackend;
use crate::workflow::backoff::BackoffPolicy;
use crate::workflow::conversation::{ConversationInput, ConversationOutcome, ConversationRunner};
use crate::workflow::record_ctx::RecordCtx;
use crate::workflow::splice::resolve_path;

/// 每记录处理器接口
///
/// 任务驱动器面向此 trait 分发工作单元。实现方的契约：
/// - 正常完成（含哨兵失败）时为自己的索引恰好提交一次 `put`
/// - 瞬时 / 解析失败在内部消化，不向驱动器泄漏
/// - 返回 `Err` 表示程序缺陷，驱动器会中止整个运行
#[async_trait]
pub trait RecordHandler: Send + Sync {
    /// 处理一条记录
    async fn process(&self, record: Value, index: usize) -> AppResult<()>;
}

/// 通用记录处理流程
///
/// 以任务定义为参数的 `RecordHandler` 实现，覆盖"对话 → 拼接 → 落库"
/// 这一所有数据集任务共有的骨架
pub struct RecordFlow {
    backend: Arc<dyn ChatBackend>,
    store: Arc<ResultStore>,
    policy: BackoffPolicy,
    spec: TaskSpec,
    verbose_logging: bool,
}

impl RecordFlow {
    /// 创建新的记录处理流程（默认退避策略）
    pub fn new(backend: Arc<dyn ChatBackend>, store: Arc<ResultStore>, spec: TaskSpec) -> Self {
        Self {
            backend,
            store,
            policy: BackoffPolicy::default(),
            spec,
            verbose_logging: false,
        }
    }

    /// 使用自定义退避策略
    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 开启每条记录的详细日志
    pub fn with_verbose(mut self, verbose_logging: bool) -> Self {
        self.verbose_logging = verbose_logging;
        self
    }

    /// 按任务定义从记录构建模板替换表
    ///
    /// 路径 `"."` 取整条记录；字符串值原样使用，其余值紧凑序列化。
    /// 记录缺少声明的路径属于任务与数据集不匹配，按配置错误上抛。
    fn build_substitutions(&self, record: &Value) -> AppResult<HashMap<String, String>> {
        let mut subs = HashMap::with_capacity(self.spec.substitutions.len());
        for (var, path) in &self.spec.substitutions {
            let value = resolve_path(record, path).map_err(|_| {
                AppError::Config(ConfigError::TaskSpecInvalid {
                    reason: format!("记录中不存在替换变量 {} 声明的路径 {}", var, path),
                })
            })?;
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => serde_json::to_string(other)
                    .map_err(|e| AppError::Other(format!("替换变量序列化失败: {}", e)))?,
            };
            subs.insert(var.clone(), rendered);
        }
        Ok(subs)
    }
}

#[async_trait]
impl RecordHandler for RecordFlow {
    async fn process(&self, record: Value, index: usize) -> AppResult<()> {
        let ctx = RecordCtx::new(index);

        // 过长记录跳过（不落库：属于过滤而非失败）
        if let Some(max_chars) = self.spec.max_record_chars {
            let compact = serde_json::to_string(&record)
                .map_err(|e| AppError::Other(format!("记录序列化失败: {}", e)))?;
            if compact.chars().count() > max_chars {
                warn!("{} ⚠️ 记录过长，跳过 (长度: {})", ctx, compact.chars().count());
                return Ok(());
            }
        }

        let substitutions = self.build_substitutions(&record)?;
        let input = ConversationInput {
            system_prompt: &self.spec.system_prompt,
            variants: &self.spec.variants,
            substitutions: &substitutions,
            mappings: &self.spec.mappings,
            record: &record,
        };

        let runner = ConversationRunner::new(self.backend.as_ref(), &self.policy);
        let outcome = runner.run(&input, ctx).await?;

        let (content, reasoning, failed) = match outcome {
            ConversationOutcome::Done { content, reasoning } => (content, reasoning, false),
            ConversationOutcome::Failed { content, reasoning } => (content, reasoning, true),
        };

        let reasoning = if reasoning.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&reasoning)
                    .map_err(|e| AppError::Other(format!("推理轨迹序列化失败: {}", e)))?,
            )
        };

        if self.verbose_logging {
            info!("{} 📋 结果内容: {}", ctx, content);
        }

        let entry = ResultEntry::new(index, content, record, reasoning);
        self.store.put(&entry).await?;

        if failed {
            warn!("{} ❌ 重试预算耗尽，已写入哨兵结果", ctx);
        } else {
            info!("{} ✅ 处理完成", ctx);
        }
        Ok(())
    }
}

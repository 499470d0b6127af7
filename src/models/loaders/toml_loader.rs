//! 任务定义文件加载器

use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

use crate::models::task_spec::{TaskSpec, TaskSpecFile};

/// 从 TOML 文件加载任务定义并完成校验
pub async fn load_task_spec(path: &Path) -> Result<TaskSpec> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取任务文件: {}", path.display()))?;

    let file: TaskSpecFile = toml::from_str(&content)
        .with_context(|| format!("无法解析任务文件: {}", path.display()))?;

    let spec = file
        .into_task_spec()
        .with_context(|| format!("任务文件校验失败: {}", path.display()))?;

    tracing::info!(
        "已加载任务定义: {} 个变体，每变体 {} 轮",
        spec.variants.len(),
        spec.variants[0].turns.len()
    );

    Ok(spec)
}

//! 数据集加载器
//!
//! 薄的可替换输入包装：JSON-Lines 文件 → 按文件顺序排列的记录向量。
//! 行号即记录索引，引擎的断点续跑依赖这一顺序在多次运行间保持不变。

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use tokio::fs;

/// 从 JSONL 文件加载全部记录
///
/// 空行跳过（不占用索引），非法行带行号报错
pub async fn load_jsonl_records(path: &Path) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取数据集文件: {}", path.display()))?;

    let mut records = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: Value = serde_json::from_str(trimmed).with_context(|| {
            format!("数据集第 {} 行不是合法 JSON: {}", line_no + 1, path.display())
        })?;
        records.push(record);
    }

    tracing::info!("已加载数据集: {} 条记录", records.len());
    Ok(records)
}

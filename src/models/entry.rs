//! 结果条目
//!
//! 对应结果库中的一行：`(id, content, source, reasoning)`

use serde_json::Value;

/// 瞬时故障耗尽退避预算后写入的哨兵内容
pub const SENTINEL_MISSING_OUTPUT: &str = "<-- output is missing -->";

/// 解析失败耗尽变体预算后写入的哨兵内容
pub const SENTINEL_MISSING_JSON: &str = "<-- output is missing JSON -->";

/// 构造哨兵内容对象
///
/// 形状固定为一条 assistant 消息，下游按 `content` 字段识别
pub fn sentinel_content(marker: &str) -> Value {
    serde_json::json!({ "role": "assistant", "content": marker })
}

/// 一条记录的持久化处理结果
///
/// 每个索引至多一条（REPLACE 语义），`source` 保留输入原文用于审计
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEntry {
    /// 记录在数据集快照中的索引（从 0 开始）
    pub index: usize,
    /// 引擎输出：成功时为拼接后的记录，失败时为哨兵对象
    pub content: Value,
    /// 输入记录的逐字拷贝
    pub source: Value,
    /// 模型的自由文本推理轨迹（可选）
    pub reasoning: Option<String>,
}

impl ResultEntry {
    /// 创建成功结果条目
    pub fn new(index: usize, content: Value, source: Value, reasoning: Option<String>) -> Self {
        Self {
            index,
            content,
            source,
            reasoning,
        }
    }

    /// 创建哨兵失败条目
    ///
    /// 写入固定的占位内容，保证后续运行不再重试该记录
    pub fn sentinel(index: usize, marker: &str, source: Value, reasoning: Option<String>) -> Self {
        Self {
            index,
            content: sentinel_content(marker),
            source,
            reasoning,
        }
    }

    /// 判断条目是否为哨兵失败结果
    pub fn is_sentinel(&self) -> bool {
        self.content
            .get("content")
            .and_then(Value::as_str)
            .is_some_and(|c| c == SENTINEL_MISSING_OUTPUT || c == SENTINEL_MISSING_JSON)
    }
}

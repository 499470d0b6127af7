//! 记录处理上下文
//!
//! 封装"我正在处理第几条记录"这一信息，只用于日志显示

use std::fmt::Display;

/// 记录处理上下文
#[derive(Debug, Clone, Copy)]
pub struct RecordCtx {
    /// 记录在数据集中的索引（从 0 开始）
    pub index: usize,
}

impl RecordCtx {
    /// 创建新的记录上下文
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

impl Display for RecordCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[记录 #{}]", self.index)
    }
}

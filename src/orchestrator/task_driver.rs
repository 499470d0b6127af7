//! 任务驱动器 - 编排层
//!
//! ## 职责
//!
//! 1. **断点续跑**：分发前查询结果库，已提交的索引直接跳过
//! 2. **并发控制**：容量为 C 的信号量在 spawn 之前获取，槽位占满时
//!    分发阻塞，信号量本身就是背压机制（不做无界排队）
//! 3. **进度统计**：单调递增计数器，跳过 / 成功 / 哨兵失败均计一次
//! 4. **快速失败**：处理器抛出的未分类错误置中止标志，停止继续分发，
//!    在途槽位自然排空后返回首个错误
//!
//! ## 设计特点
//!
//! - 驱动器本层不做重试：重试全部内化在处理器 / 对话运行器里
//! - 记录索引 = 输入向量中的位置，调用方必须保证数据集顺序跨运行稳定
//! - 结果允许乱序提交，进度推进时刻不做跨记录的顺序保证

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::infrastructure::result_store::ResultStore;
use crate::workflow::record_flow::RecordHandler;

/// 一次运行的统计
#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    /// 输入记录总数
    pub total: usize,
    /// 因已有结果而跳过的记录数
    pub skipped: usize,
    /// 实际分发给处理器的记录数
    pub dispatched: usize,
}

/// 任务驱动器
pub struct TaskDriver {
    store: Arc<ResultStore>,
    concurrency: usize,
    progress: Arc<AtomicUsize>,
}

impl TaskDriver {
    /// 创建新的任务驱动器
    pub fn new(store: Arc<ResultStore>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
            progress: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 当前进度（已完成的记录数，含跳过与哨兵失败）
    pub fn completed(&self) -> usize {
        self.progress.load(Ordering::SeqCst)
    }

    /// 遍历记录集并分发处理
    ///
    /// # 参数
    /// - `records`: 按索引顺序排列的记录（索引在此一次性定格）
    /// - `handler`: 每记录处理器，负责为自己的索引恰好提交一次结果
    pub async fn run(
        &self,
        records: Vec<Value>,
        handler: Arc<dyn RecordHandler>,
    ) -> Result<RunStats> {
        let total = records.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let aborted = Arc::new(AtomicBool::new(false));
        let mut stats = RunStats {
            total,
            ..Default::default()
        };
        let mut handles = Vec::new();
        // 分发阶段的错误不立即返回：先停止分发，排空在途任务后再上报
        let mut dispatch_error: Option<anyhow::Error> = None;

        info!("📋 开始分发 {} 条记录 (并发上限: {})", total, self.concurrency);

        for (index, record) in records.into_iter().enumerate() {
            if aborted.load(Ordering::SeqCst) {
                break;
            }

            // 已提交的索引跳过，但计入进度
            let committed = match self.store.exists(index) {
                Ok(committed) => committed,
                Err(e) => {
                    dispatch_error = Some(
                        anyhow::Error::new(e).context(format!("记录 #{} 断点检查失败", index)),
                    );
                    break;
                }
            };
            if committed {
                stats.skipped += 1;
                self.tick(total);
                continue;
            }

            // 并发槽位在 spawn 之前获取：占满即阻塞分发
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    dispatch_error = Some(
                        anyhow::Error::new(e).context(format!("记录 #{} 并发槽位获取失败", index)),
                    );
                    break;
                }
            };
            if aborted.load(Ordering::SeqCst) {
                break;
            }

            let handler = handler.clone();
            let progress = self.progress.clone();
            let abort_flag = aborted.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let result = handler.process(record, index).await;
                match &result {
                    Ok(()) => {
                        let done = progress.fetch_add(1, Ordering::SeqCst) + 1;
                        if done % 100 == 0 {
                            info!("📊 进度: {}/{}", done, total);
                        }
                    }
                    Err(e) => {
                        error!("[记录 #{}] ❌ 处理过程中发生错误: {}", index, e);
                        abort_flag.store(true, Ordering::SeqCst);
                    }
                }
                result
            });
            handles.push((index, handle));
            stats.dispatched += 1;
        }

        // 等待在途任务排空，收集首个错误
        let (indices, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let mut first_error: Option<anyhow::Error> = None;
        for (index, joined) in indices.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error =
                            Some(anyhow::Error::new(e).context(format!("记录 #{} 处理失败", index)));
                    }
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error =
                            Some(anyhow::Error::new(e).context(format!("记录 #{} 任务执行失败", index)));
                    }
                }
            }
        }

        if let Some(e) = dispatch_error.or(first_error) {
            return Err(e);
        }

        info!(
            "✓ 分发完成: 共 {} 条，跳过 {} 条，实际处理 {} 条",
            stats.total, stats.skipped, stats.dispatched
        );
        Ok(stats)
    }

    fn tick(&self, total: usize) {
        let done = self.progress.fetch_add(1, Ordering::SeqCst) + 1;
        if done % 100 == 0 {
            info!("📊 进度: {}/{}", done, total);
        }
    }
}

//! 应用装配 - 编排层
//!
//! 负责一次运行的生命周期：打开结果库、构建 LLM 后端、加载任务定义
//! 与数据集、交给任务驱动器执行、输出最终统计。
//!
//! 服务客户端和存储句柄都在这里显式构造并注入，每次运行各持有一份，
//! 不使用全局单例。

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::warn;

use crate::config::Config;
use crate::infrastructure::result_store::ResultStore;
use crate::models::loaders::jsonl_loader::load_jsonl_records;
use crate::models::loaders::toml_loader::load_task_spec;
use crate::models::task_spec::TaskSpec;
use crate::orchestrator::task_driver::{RunStats, TaskDriver};
use crate::services::llm_service::{ChatBackend, LlmService};
use crate::utils::logging::{log_startup, print_final_stats};
use crate::workflow::record_flow::RecordFlow;

/// 应用主结构
pub struct App {
    config: Config,
    store: Arc<ResultStore>,
    backend: Arc<dyn ChatBackend>,
    spec: TaskSpec,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let store = Arc::new(ResultStore::open(Path::new(&config.db_path))?);
        let backend: Arc<dyn ChatBackend> = Arc::new(LlmService::new(&config));
        let spec = load_task_spec(Path::new(&config.task_file)).await?;

        Ok(Self {
            config,
            store,
            backend,
            spec,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<RunStats> {
        let records = load_jsonl_records(Path::new(&self.config.dataset_path)).await?;

        if records.is_empty() {
            warn!("⚠️ 数据集为空，程序结束");
            return Ok(RunStats::default());
        }

        let flow = Arc::new(
            RecordFlow::new(
                self.backend.clone(),
                self.store.clone(),
                self.spec.clone(),
            )
            .with_verbose(self.config.verbose_logging),
        );
        let driver = TaskDriver::new(self.store.clone(), self.config.max_concurrent_records);

        let stats = driver.run(records, flow).await?;

        print_final_stats(&stats, self.store.count()?);
        Ok(stats)
    }
}

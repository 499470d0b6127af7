//! 日志工具模块
//!
//! 提供日志初始化和统计输出的辅助函数

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::orchestrator::task_driver::RunStats;

/// 初始化日志订阅器
///
/// 级别由 `RUST_LOG` 环境变量控制，默认 `info`
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 数据集批量推理模式");
    info!("📊 最大并发数: {}", config.max_concurrent_records);
    info!("🗄 结果数据库: {}", config.db_path);
    info!("🤖 模型: {}", config.llm_model_name);
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `stats`: 本次运行的分发统计
/// - `committed`: 结果库中已提交的条目总数（覆盖率）
pub fn print_final_stats(stats: &RunStats, committed: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 本次处理: {}/{}", stats.dispatched, stats.total);
    info!("⏭ 断点跳过: {}", stats.skipped);
    info!("🗄 结果库覆盖: {}/{}", committed, stats.total);
    info!("{}", "=".repeat(60));
}

use anyhow::Result;

use llm_batch_engine::config::Config;
use llm_batch_engine::orchestrator::app::App;
use llm_batch_engine::utils::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();

    // 初始化并运行应用
    let _stats = App::initialize(config).await?.run().await?;

    Ok(())
}

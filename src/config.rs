/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时处理的记录数量
    pub max_concurrent_records: usize,
    /// 结果数据库路径
    pub db_path: String,
    /// 数据集文件路径（JSONL）
    pub dataset_path: String,
    /// 任务定义文件路径（TOML）
    pub task_file: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 单次补全的 token 上限
    pub llm_max_tokens: u32,
    /// 是否输出每条记录的详细处理日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_records: 8,
            db_path: "db.sqlite".to_string(),
            dataset_path: "dataset.jsonl".to_string(),
            task_file: "task.toml".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_max_tokens: 131072,
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_records: std::env::var("MAX_CONCURRENT_RECORDS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_records),
            db_path: std::env::var("DB_PATH").unwrap_or(default.db_path),
            dataset_path: std::env::var("DATASET_PATH").unwrap_or(default.dataset_path),
            task_file: std::env::var("TASK_FILE").unwrap_or(default.task_file),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            llm_max_tokens: std::env::var("LLM_MAX_TOKENS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_max_tokens),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
        }
    }
}

use std::fmt;
use std::time::Duration;

/// 失败分类
///
/// 引擎只对两类失败做本地恢复，其余错误一律视为程序缺陷并中止运行：
/// - `Transient`：限流、网络等服务侧瞬时故障，通过指数退避等待恢复
/// - `Parse`：模型输出不符合结构约定，通过轮换对话变体重试恢复
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 服务瞬时故障（限流 / 网络 / 上游异常响应）
    Transient,
    /// 结构性解析失败（schema 不匹配 / 缺少必需字段）
    Parse,
}

/// 退避决策
///
/// 由 `BackoffPolicy` 产出，调用方负责实际等待
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffDecision {
    /// 等待指定时长后重试
    Wait(Duration),
    /// 放弃重试，调用方应写入哨兵结果
    GiveUp,
}

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// LLM 服务错误（瞬时，可退避重试）
    Service(ServiceError),
    /// 模型输出解析错误（结构性，可轮换变体重试）
    Parse(ParseError),
    /// 结果存储错误
    Store(StoreError),
    /// 配置 / 任务定义错误
    Config(ConfigError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl AppError {
    /// 返回错误的失败分类
    ///
    /// `None` 表示不可恢复的程序错误，任务驱动器会直接中止运行
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            AppError::Service(_) => Some(FailureKind::Transient),
            AppError::Parse(_) => Some(FailureKind::Parse),
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Service(e) => write!(f, "LLM服务错误: {}", e),
            AppError::Parse(e) => write!(f, "解析错误: {}", e),
            AppError::Store(e) => write!(f, "存储错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Service(e) => Some(e),
            AppError::Parse(e) => Some(e),
            AppError::Store(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// LLM 服务错误
#[derive(Debug)]
pub enum ServiceError {
    /// API 调用失败
    ApiCallFailed {
        model: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 请求频率限制
    RateLimited {
        model: String,
    },
    /// API 返回空结果（choices 为空）
    EmptyResponse {
        model: String,
    },
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::ApiCallFailed { model, source } => {
                write!(f, "LLM API调用失败 (模型: {}): {}", model, source)
            }
            ServiceError::RateLimited { model } => {
                write!(f, "LLM API请求被限流 (模型: {})", model)
            }
            ServiceError::EmptyResponse { model } => {
                write!(f, "LLM返回结果为空 (模型: {})", model)
            }
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::ApiCallFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 模型输出解析错误
#[derive(Debug)]
pub enum ParseError {
    /// 返回内容为空
    EmptyContent {
        variant: usize,
        turn: usize,
    },
    /// JSON 解析失败（声明了 schema 但输出不是合法 JSON）
    JsonParseFailed {
        detail: String,
    },
    /// 拼接映射引用的字段在响应中不存在
    MissingField {
        path: String,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::EmptyContent { variant, turn } => {
                write!(f, "LLM返回内容为空 (变体: {}, 轮次: {})", variant, turn)
            }
            ParseError::JsonParseFailed { detail } => {
                write!(f, "JSON解析失败: {}", detail)
            }
            ParseError::MissingField { path } => {
                write!(f, "响应中缺少字段: {}", path)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// 结果存储错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite 底层错误
    #[error("sqlite错误: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// 文件系统 I/O 错误（例如创建数据库目录失败）
    #[error("i/o错误: {0}")]
    Io(#[from] std::io::Error),

    /// 连接锁被 panic 的线程污染
    #[error("存储连接锁已被污染")]
    LockPoisoned,

    /// 结果序列化失败
    #[error("结果序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 配置 / 任务定义错误
#[derive(Debug)]
pub enum ConfigError {
    /// 提示词模板引用了替换表中不存在的变量
    TemplateVarMissing {
        name: String,
    },
    /// 任务定义文件不合法
    TaskSpecInvalid {
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::TemplateVarMissing { name } => {
                write!(f, "提示词模板变量 {{{}}} 在替换表中不存在", name)
            }
            ConfigError::TaskSpecInvalid { reason } => {
                write!(f, "任务定义不合法: {}", reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ========== 从常见错误类型转换 ==========

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        AppError::Service(err)
    }
}

impl From<ParseError> for AppError {
    fn from(err: ParseError) -> Self {
        AppError::Parse(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建 LLM API 调用错误
    pub fn service_call_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Service(ServiceError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 创建缺少字段错误
    pub fn missing_field(path: impl Into<String>) -> Self {
        AppError::Parse(ParseError::MissingField { path: path.into() })
    }

    /// 创建 JSON 解析错误
    pub fn json_parse_failed(detail: impl Into<String>) -> Self {
        AppError::Parse(ParseError::JsonParseFailed {
            detail: detail.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

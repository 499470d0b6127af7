//! 数据模型与薄加载器

pub mod completion;
pub mod entry;
pub mod loaders;
pub mod task_spec;

pub use completion::{ChatTurn, CompletionRequest, CompletionResponse, EffortLevel, Role};
pub use entry::{ResultEntry, SENTINEL_MISSING_JSON, SENTINEL_MISSING_OUTPUT};
pub use task_spec::TaskSpec;

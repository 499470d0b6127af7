//! 基础设施层（Infrastructure Layer）
//!
//! 持有稀缺资源（SQLite 连接），只向上暴露能力

pub mod result_store;

pub use result_store::ResultStore;

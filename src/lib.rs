//! PostgreSQL 服务端日志分析库
//!
//! 按运维配置的 `log_line_prefix` 解析日志行，由并发摄取引擎分块读取大文件，
//! 把每一条逻辑行分发给各个分析器。
//!
//! 模块结构：
//! - [`logline`]：前缀模板编译与行解析
//! - [`engine`]：并发摄取引擎
//! - [`statement`]：SQL 语句的（列名，字面量）抽取
//! - [`analyzer`]：各类分析器
//! - [`process`]：一次完整运行的编排
//! - [`config`]：TOML 配置
//! - [`error`]：错误类型
//! - [`error_writer`]：JSONL 错误记录

pub mod analyzer;
pub mod config;
pub mod engine;
pub mod error;
pub mod error_writer;
pub mod logline;
pub mod process;
pub mod statement;

#[cfg(feature = "logging")]
pub mod logging;

pub use error::{AnalysisError, Result};

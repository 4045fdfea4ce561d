//! 并发日志摄取引擎
//!
//! 模块结构：
//! - `admission`：文件级与块级准入闸门
//! - `pool`：字节缓冲与字符串对象池
//! - `reader`：按逻辑行边界切块
//! - `validate`：前缀校验闸门
//! - `chunk`：块内续行合并与子批次分发
//! - `runner`：引擎主体
//! - `types`：参数、计数器与运行报告

pub mod admission;
pub mod chunk;
pub mod pool;
pub mod reader;
pub mod runner;
pub mod types;
pub mod validate;

pub use admission::{Admission, Permit};
pub use chunk::{ChunkProcessor, merge_continuations};
pub use pool::{Lease, Pool, Recycle};
pub use reader::ChunkReader;
pub use runner::IngestionEngine;
pub use types::{
    BATCH_LINES, CHUNK_SIZE_BYTES, CancelToken, EngineLimits, FileReport,
    LineCounters, LineSink, MAX_CONCURRENT_FILES, MAX_FILE_SIZE_BYTES,
    ParseOutcome, RunReport, VALIDATION_FAILURE_PERCENT,
    VALIDATION_SAMPLE_LINES,
};
pub use validate::{ValidationSummary, exceeds_threshold, validate_sample};

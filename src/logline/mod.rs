//! PostgreSQL 日志行解析
//!
//! 模块结构：
//! - `template`：将 `log_line_prefix` 模板编译为正则与字段映射
//! - `parser`：基于编译结果的行解析器
//! - `record`：单行解析结果及字段访问器
//! - `time`：时间戳格式

pub mod parser;
pub mod record;
pub mod template;
pub mod time;

pub use parser::{LineError, LineParser};
pub use record::{FieldError, ParsedRecord, UNKNOWN_PLACEHOLDER};
pub use template::{CompiledPattern, FieldIndex, Token};
pub use time::TimeFormat;

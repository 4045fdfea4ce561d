//! 从日志中捕获的 SQL 语句抽取列名与字面量
//!
//! 抽取结果供 PII 分析器使用，本模块自身不做任何分类。

pub mod extract;
pub mod pairs;

pub use extract::{ExtractError, extract, statement_from_message};
pub use pairs::{KVPair, KVPairs};

//! 引擎相关的数据类型

use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// 最大文件大小：50 GiB
pub const MAX_FILE_SIZE_BYTES: u64 = 50 * 1024 * 1024 * 1024;
/// 校验时采样的行数
pub const VALIDATION_SAMPLE_LINES: usize = 100;
/// 采样失败率超过该百分比时拒绝文件
pub const VALIDATION_FAILURE_PERCENT: usize = 70;
/// 单次读取的块大小：250 KiB
pub const CHUNK_SIZE_BYTES: usize = 250 * 1024;
/// 块内子批次的行数
pub const BATCH_LINES: usize = 30;
/// 同时处理的最大文件数
pub const MAX_CONCURRENT_FILES: usize = 10;

/// 引擎运行参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineLimits {
    pub max_concurrent_files: usize,
    /// 同时处理的最大块数，所有文件共享
    pub chunk_workers: usize,
    pub chunk_size_bytes: usize,
    pub batch_lines: usize,
    pub validation_sample_lines: usize,
    pub validation_failure_percent: usize,
    pub max_file_size_bytes: u64,
}

impl EngineLimits {
    /// 默认块并发数：逻辑 CPU 数的两倍
    pub fn default_chunk_workers() -> usize {
        2 * num_cpus::get()
    }
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_concurrent_files: MAX_CONCURRENT_FILES,
            chunk_workers: Self::default_chunk_workers(),
            chunk_size_bytes: CHUNK_SIZE_BYTES,
            batch_lines: BATCH_LINES,
            validation_sample_lines: VALIDATION_SAMPLE_LINES,
            validation_failure_percent: VALIDATION_FAILURE_PERCENT,
            max_file_size_bytes: MAX_FILE_SIZE_BYTES,
        }
    }
}

/// 逐行消费者
///
/// `feed` 会被许多工作线程并发调用；返回错误表示这一行对该消费者不可用，
/// 只会被计数和记录，不会中断运行。
pub trait LineSink: Send + Sync {
    fn feed(&self, line: &str) -> Result<()>;
}

impl<F> LineSink for F
where
    F: Fn(&str) -> Result<()> + Send + Sync,
{
    fn feed(&self, line: &str) -> Result<()> {
        self(line)
    }
}

/// 协作式取消标志
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 包装一个已有的标志（例如注册给信号处理器的标志）
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// 底层标志，供 signal-hook 注册
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// 单个文件的原子计数器
#[derive(Debug)]
pub struct LineCounters {
    total: AtomicU64,
    success: Vec<AtomicU64>,
}

impl LineCounters {
    pub fn new(sinks: usize) -> Self {
        Self {
            total: AtomicU64::new(0),
            success: (0..sinks).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn add_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_success(&self, sink: usize) {
        if let Some(counter) = self.success.get(sink) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn success(&self) -> Vec<u64> {
        self.success.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }
}

/// 单个文件的处理结果
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub total_lines: u64,
    /// 按消费者顺序的成功行数
    pub success_lines: Vec<u64>,
    /// 文件被拒绝、校验失败或处理异常时的错误信息
    pub error: Option<String>,
}

/// 解析成功率分类
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", content = "percent", rename_all = "snake_case")]
pub enum ParseOutcome {
    /// 没有读到任何行
    NoLines,
    /// 全部解析成功
    Complete,
    /// 完全无法解析
    Unparsed,
    /// 部分解析成功，值为成功百分比
    Partial(f64),
}

impl ParseOutcome {
    pub fn classify(success: u64, total: u64) -> Self {
        if total == 0 {
            ParseOutcome::NoLines
        } else if success == total {
            ParseOutcome::Complete
        } else if success == 0 {
            ParseOutcome::Unparsed
        } else {
            ParseOutcome::Partial(success as f64 * 100.0 / total as f64)
        }
    }
}

/// 一次运行的汇总
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub total_lines: u64,
    pub success_lines: Vec<u64>,
    /// 按输入顺序排列的文件结果
    pub files: Vec<FileReport>,
    /// 文件名 → 错误信息
    pub file_errors: BTreeMap<String, String>,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl RunReport {
    /// 由文件结果汇总
    pub fn from_files(
        sinks: usize,
        files: Vec<FileReport>,
        elapsed: Duration,
        cancelled: bool,
    ) -> Self {
        let mut total_lines = 0;
        let mut success_lines = vec![0; sinks];
        let mut file_errors = BTreeMap::new();
        for file in &files {
            total_lines += file.total_lines;
            for (sum, n) in success_lines.iter_mut().zip(&file.success_lines) {
                *sum += n;
            }
            if let Some(error) = &file.error {
                file_errors
                    .insert(file.path.display().to_string(), error.clone());
            }
        }
        Self {
            total_lines,
            success_lines,
            files,
            file_errors,
            elapsed,
            cancelled,
        }
    }

    /// 指定消费者的成功率分类
    pub fn outcome(&self, sink: usize) -> ParseOutcome {
        let success = self.success_lines.get(sink).copied().unwrap_or(0);
        ParseOutcome::classify(success, self.total_lines)
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        d: &Duration,
        s: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(ParseOutcome::classify(0, 0), ParseOutcome::NoLines);
        assert_eq!(ParseOutcome::classify(10, 10), ParseOutcome::Complete);
        assert_eq!(ParseOutcome::classify(0, 10), ParseOutcome::Unparsed);
        assert_eq!(ParseOutcome::classify(5, 20), ParseOutcome::Partial(25.0));
    }

    #[test]
    fn test_report_sums_files() {
        let files = vec![
            FileReport {
                path: PathBuf::from("a.log"),
                total_lines: 10,
                success_lines: vec![10, 4],
                error: None,
            },
            FileReport {
                path: PathBuf::from("b.log"),
                total_lines: 0,
                success_lines: vec![0, 0],
                error: Some("logline prefix is wrong".to_string()),
            },
        ];
        let report =
            RunReport::from_files(2, files, Duration::from_millis(3), false);
        assert_eq!(report.total_lines, 10);
        assert_eq!(report.success_lines, vec![10, 4]);
        assert_eq!(report.outcome(0), ParseOutcome::Complete);
        assert_eq!(report.outcome(1), ParseOutcome::Partial(40.0));
        assert_eq!(report.file_errors.len(), 1);
        assert!(report.file_errors.contains_key("b.log"));
    }

    #[test]
    fn test_closure_sink() {
        let sink = |line: &str| -> Result<()> {
            if line.is_empty() {
                Err(crate::error::AnalysisError::other("empty"))
            } else {
                Ok(())
            }
        };
        assert!(sink.feed("x").is_ok());
        assert!(sink.feed("").is_err());
    }

    #[test]
    fn test_cancel_token_shares_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(CancelToken::from_flag(token.flag()).is_cancelled());
    }
}

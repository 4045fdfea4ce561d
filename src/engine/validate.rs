//! 前缀校验闸门
//!
//! 正式处理一个文件之前，先用校验器检查开头的若干行。失败比例超过阈值
//! 说明 `log_line_prefix` 配置与文件不符，整个文件直接跳过。

use super::types::{CancelToken, LineSink};
use crate::error::{AnalysisError, Result};
use std::io::BufRead;
use std::path::Path;

/// 采样结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationSummary {
    pub sampled: usize,
    pub failed: usize,
}

/// 失败行数是否超过阈值：`sampled * percent / 100 < failed`
pub fn exceeds_threshold(sampled: usize, failed: usize, percent: usize) -> bool {
    sampled * percent / 100 < failed
}

/// 读取最多 `sample_lines` 行交给校验器
///
/// 取消时返回已采样的部分结果，由调用方决定是否继续。
pub fn validate_sample<R: BufRead>(
    reader: &mut R,
    path: &Path,
    validator: &dyn LineSink,
    sample_lines: usize,
    failure_percent: usize,
    cancel: &CancelToken,
) -> Result<ValidationSummary> {
    let mut summary = ValidationSummary { sampled: 0, failed: 0 };
    let mut raw = Vec::new();

    while summary.sampled < sample_lines {
        if cancel.is_cancelled() {
            return Ok(summary);
        }

        raw.clear();
        if reader.read_until(b'\n', &mut raw)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches('\n').trim_end_matches('\r');

        summary.sampled += 1;
        if let Err(e) = validator.feed(line) {
            summary.failed += 1;
            tracing::trace!(file = %path.display(), error = %e, "采样行校验失败");
        }
    }

    if summary.sampled == 0 {
        return Err(AnalysisError::file_rejected(
            path,
            "no log lines found in the log file",
        ));
    }

    if exceeds_threshold(summary.sampled, summary.failed, failure_percent) {
        tracing::warn!(
            file = %path.display(),
            failed = summary.failed,
            sampled = summary.sampled,
            "前缀校验失败，跳过文件"
        );
        return Err(AnalysisError::ValidationFailed {
            path: path.display().to_string(),
            failed: summary.failed,
            sampled: summary.sampled,
        });
    }

    tracing::debug!(
        file = %path.display(),
        failed = summary.failed,
        sampled = summary.sampled,
        "前缀校验通过"
    );
    Ok(summary)
}

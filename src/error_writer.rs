//! 处理错误写入模块 - 线程安全的 JSONL 错误记录器
//!
//! 被拒绝的文件、校验失败的文件以及恢复过的处理异常都会以一行一个 JSON
//! 对象的形式追加到错误文件中，便于事后排查。
//!
//! ## 输出格式示例
//!
//! ```json
//! {"path":"/var/log/postgresql/pg.log","kind":"validation_failed","error":"logline prefix is wrong: ..."}
//! {"path":"/var/log/postgresql/pg.log","kind":"line","line":"garbage","error":"invalid log format"}
//! ```

use crate::error::AnalysisError;
use serde_json::json;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// 错误写入器，线程安全地将处理错误写入 JSONL 文件
///
/// 每次写入后立即刷新缓冲区，程序意外退出时不会丢失已记录的错误。
pub struct ErrorWriter {
    writer: Arc<Mutex<BufWriter<std::fs::File>>>,
    path: PathBuf,
}

fn error_kind(error: &AnalysisError) -> &'static str {
    match error {
        AnalysisError::FileRejected { .. } => "file_rejected",
        AnalysisError::ValidationFailed { .. } => "validation_failed",
        AnalysisError::Fault(_) => "fault",
        AnalysisError::Io(_) => "io",
        AnalysisError::Line(_) => "line",
        AnalysisError::Extract(_) => "extract",
        _ => "other",
    }
}

impl ErrorWriter {
    /// 创建新的错误写入器
    ///
    /// # Errors
    /// 当无法创建或打开输出文件时返回错误
    pub fn new<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let writer = Arc::new(Mutex::new(BufWriter::new(file)));

        Ok(Self { writer, path })
    }

    /// 记录一个文件级错误
    pub fn write_file_error<P: AsRef<Path>>(
        &self,
        file_path: P,
        error: &AnalysisError,
    ) {
        let record = json!({
            "path": file_path.as_ref().to_string_lossy(),
            "kind": error_kind(error),
            "error": error.to_string(),
        });
        self.write_record(&record);
    }

    /// 记录一批处理失败的行
    pub fn write_line_errors<P: AsRef<Path>>(
        &self,
        file_path: P,
        errors: &[(String, AnalysisError)],
    ) {
        let path = file_path.as_ref().to_string_lossy();
        for (line, error) in errors {
            let record = json!({
                "path": path,
                "kind": error_kind(error),
                "line": line,
                "error": error.to_string(),
            });
            self.write_record(&record);
        }
    }

    fn write_record(&self, record: &serde_json::Value) {
        let Ok(mut writer) = self.writer.lock() else {
            tracing::error!("获取错误写入器锁失败");
            return;
        };

        match serde_json::to_string(record) {
            Ok(json_str) => {
                if writeln!(writer, "{json_str}").is_err() {
                    tracing::error!(
                        "写入错误信息到文件失败: {}",
                        self.path.display()
                    );
                }
            }
            Err(e) => tracing::error!("序列化错误信息失败: {}", e),
        }

        if writer.flush().is_err() {
            tracing::error!("刷新错误文件缓冲区失败: {}", self.path.display());
        }
    }

    /// 获取错误文件路径
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ErrorWriter {
    fn drop(&mut self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logline::LineError;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_error_writer_basic() {
        let temp_dir = tempdir().unwrap();
        let error_file = temp_dir.path().join("nested").join("errors.jsonl");

        let writer = ErrorWriter::new(&error_file).unwrap();
        writer.write_file_error(
            "/var/log/pg.log",
            &AnalysisError::ValidationFailed {
                path: "/var/log/pg.log".to_string(),
                failed: 80,
                sampled: 100,
            },
        );
        writer.write_line_errors(
            "/var/log/pg.log",
            &[("garbage".to_string(), LineError::InvalidFormat.into())],
        );

        let content = fs::read_to_string(&error_file).unwrap();
        let lines: Vec<&str> = content.trim().split('\n').collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["path"], "/var/log/pg.log");
        assert_eq!(first["kind"], "validation_failed");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["kind"], "line");
        assert_eq!(second["line"], "garbage");
        assert_eq!(second["error"], "invalid log format");
    }

    #[test]
    fn test_appends_across_writers() {
        let temp_dir = tempdir().unwrap();
        let error_file = temp_dir.path().join("errors.jsonl");

        for _ in 0..2 {
            let writer = ErrorWriter::new(&error_file).unwrap();
            writer.write_file_error(
                "a.log",
                &AnalysisError::Fault("boom".to_string()),
            );
        }

        let content = fs::read_to_string(&error_file).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert_eq!(writer_path_name(&error_file), "errors.jsonl");
    }

    fn writer_path_name(path: &Path) -> String {
        ErrorWriter::new(path)
            .unwrap()
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned()
    }
}

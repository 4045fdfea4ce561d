//! 错误类型定义
//!
//! 这个模块定义了库中使用的所有错误类型，使用 thiserror 提供丰富的错误信息。
//! 行级与语句级错误分别定义在 [`crate::logline`] 与 [`crate::statement`] 中，
//! 这里通过 `#[from]` 汇总为 [`AnalysisError`]。

use crate::logline::LineError;
use crate::statement::ExtractError;

/// 分析库的结果类型
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// 分析错误类型
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// 正则表达式错误
    #[error("正则表达式错误: {0}")]
    Regex(#[from] regex::Error),

    /// 配置文件解析错误
    #[error("配置文件解析错误: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON 序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 配置错误，在打开任何文件之前返回给调用方
    #[error("配置错误: {0}")]
    Config(String),

    /// 文件被拒绝（超出大小上限、无法打开、不是普通文件）
    #[error("文件被拒绝 {path}: {reason}")]
    FileRejected { path: String, reason: String },

    /// 前缀校验失败
    #[error(
        "logline prefix is wrong: {path} ({failed}/{sampled} sampled lines failed)"
    )]
    ValidationFailed { path: String, failed: usize, sampled: usize },

    /// 单行解析失败
    #[error(transparent)]
    Line(#[from] LineError),

    /// SQL 语句抽取失败
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// 处理单元内部发生 panic，已被恢复
    #[error("处理单元异常终止: {0}")]
    Fault(String),

    /// 日志错误（仅在启用 logging feature 时可用）
    #[cfg(feature = "logging")]
    #[error("日志错误: {0}")]
    Log(#[from] crate::logging::LogError),

    /// 其他错误
    #[error("未知错误: {0}")]
    Other(String),
}

impl AnalysisError {
    /// 创建一个配置错误
    pub fn config_error<S: Into<String>>(message: S) -> Self {
        let message = message.into();
        tracing::error!("配置错误: {}", message);
        Self::Config(message)
    }

    /// 创建一个文件拒绝错误
    pub fn file_rejected<P, S>(path: P, reason: S) -> Self
    where
        P: AsRef<std::path::Path>,
        S: Into<String>,
    {
        let path = path.as_ref().display().to_string();
        let reason = reason.into();
        tracing::warn!(file = %path, "文件被拒绝: {}", reason);
        Self::FileRejected { path, reason }
    }

    /// 从 panic 负载创建一个故障错误
    pub fn fault(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Fault(message)
    }

    /// 创建一个其他类型错误
    pub fn other<S: Into<String>>(message: S) -> Self {
        let message = message.into();
        tracing::error!("未知错误: {}", message);
        Self::Other(message)
    }

    /// 检查是否为 IO 错误
    pub fn is_io_error(&self) -> bool {
        matches!(self, AnalysisError::Io(_))
    }

    /// 检查是否为配置错误
    pub fn is_config_error(&self) -> bool {
        matches!(self, AnalysisError::Config(_))
    }

    /// 检查是否为文件拒绝错误
    pub fn is_file_rejected(&self) -> bool {
        matches!(self, AnalysisError::FileRejected { .. })
    }

    /// 检查是否为前缀校验失败
    pub fn is_validation_failed(&self) -> bool {
        matches!(self, AnalysisError::ValidationFailed { .. })
    }

    /// 检查是否为行解析错误
    pub fn is_line_error(&self) -> bool {
        matches!(self, AnalysisError::Line(_))
    }

    /// 检查是否为故障
    pub fn is_fault(&self) -> bool {
        matches!(self, AnalysisError::Fault(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_creation() {
        let config_err = AnalysisError::config_error("template lacks %u");
        assert!(config_err.is_config_error());
        assert!(!config_err.is_io_error());

        let rejected = AnalysisError::file_rejected("/tmp/a.log", "too large");
        assert!(rejected.is_file_rejected());
        assert!(rejected.to_string().contains("/tmp/a.log"));
    }

    #[test]
    fn test_error_from() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: AnalysisError = io_err.into();
        assert!(err.is_io_error());

        let err: AnalysisError = LineError::InvalidFormat.into();
        assert!(err.is_line_error());
        assert_eq!(err.to_string(), "invalid log format");
    }

    #[test]
    fn test_fault_payloads() {
        let err = AnalysisError::fault(Box::new("boom"));
        assert!(err.is_fault());
        assert!(err.to_string().contains("boom"));

        let err = AnalysisError::fault(Box::new(String::from("owned boom")));
        assert!(err.to_string().contains("owned boom"));

        let err = AnalysisError::fault(Box::new(42u32));
        assert!(err.to_string().contains("unknown panic payload"));
    }

    #[test]
    fn test_validation_display() {
        let err = AnalysisError::ValidationFailed {
            path: "pg.log".to_string(),
            failed: 71,
            sampled: 100,
        };
        assert!(err.is_validation_failed());
        let display = err.to_string();
        assert!(display.contains("logline prefix is wrong"));
        assert!(display.contains("71/100"));
    }
}

//! 日志初始化和配置模块
//!
//! 这个模块提供了统一的日志初始化功能，使用 tracing 库。
//! 日志写入 `log_dir` 下按天滚动的文件，可选同时输出到控制台。
//! 被拒绝的文件和处理失败的行都会出现在这里。

use crate::config::LogSection;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::SystemTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// 日志文件名前缀
const LOG_FILE_PREFIX: &str = "pglog-analysis";

/// 日志配置结构体
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志级别
    pub level: Level,
    /// 日志目录
    pub log_dir: PathBuf,
    /// 是否同时输出到控制台
    pub enable_stdout: bool,
}

impl LogConfig {
    /// 创建新的日志配置，使用默认级别
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置日志级别
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn log_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn enable_stdout(mut self, enable: bool) -> Self {
        self.enable_stdout = enable;
        self
    }

    /// 从配置文件的 `[log]` 段构造
    pub fn from_section(section: &LogSection) -> LogResult<Self> {
        let level = Level::from_str(&section.level)
            .map_err(|_| LogError::Config(format!("无效的日志级别: {}", section.level)))?;
        Ok(Self {
            level,
            log_dir: PathBuf::from(&section.log_dir),
            enable_stdout: section.enable_stdout,
        })
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_dir: PathBuf::from("logs"),
            enable_stdout: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("IO错误: {0}")]
    Io(#[from] io::Error),
    #[error("日志配置错误: {0}")]
    Config(String),
}

/// 日志初始化结果
pub type LogResult<T> = Result<T, LogError>;

/// 初始化日志系统
///
/// `RUST_LOG` 优先于配置的级别。返回的 guard 必须在程序退出前一直持有，
/// 否则后台写线程会提前结束。已经初始化过时什么也不做，返回 `None`。
///
/// # Examples
///
/// ```no_run
/// use pglog_analysis::logging::{init_logging, LogConfig};
/// use tracing::Level;
///
/// let _guard = init_logging(LogConfig::new().level(Level::DEBUG)).unwrap();
/// ```
pub fn init_logging(config: LogConfig) -> LogResult<Option<WorkerGuard>> {
    // 创建环境过滤器，默认使用配置的级别
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    std::fs::create_dir_all(&config.log_dir)?;
    let file_appender =
        tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_timer(SystemTime)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_ansi(false); // 文件中不使用颜色

    let console_layer = config.enable_stdout.then(|| {
        fmt::layer()
            .with_timer(SystemTime)
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(true)
    });

    match Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
    {
        Ok(()) => {
            tracing::info!(
                log_dir = %config.log_dir.display(),
                level = %config.level,
                "日志系统初始化完成"
            );
            Ok(Some(guard))
        }
        // 已经初始化过了，这不是错误
        Err(_) => Ok(None),
    }
}

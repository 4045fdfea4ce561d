//! 配置管理模块
//!
//! 提供统一的配置文件读取和管理功能

use crate::analyzer::{HbaRule, TimeWindow};
use crate::engine::{
    BATCH_LINES, CHUNK_SIZE_BYTES, EngineLimits, MAX_CONCURRENT_FILES,
    MAX_FILE_SIZE_BYTES, VALIDATION_FAILURE_PERCENT, VALIDATION_SAMPLE_LINES,
};
use crate::error::{AnalysisError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 支持的分析命令
pub const COMMANDS: [&str; 6] = [
    "unique_ips",
    "inactive_users",
    "password_leak",
    "hba_unused_lines",
    "pii",
    "sql_injection",
];

/// 主配置结构体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 日志配置
    #[serde(default)]
    pub log: LogSection,
    /// 日志解析配置
    pub parser: LogParserSettings,
    /// 引擎参数
    #[serde(default)]
    pub engine: EngineSection,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSection {
    /// 是否启用控制台输出
    pub enable_stdout: bool,
    /// 日志输出目录
    pub log_dir: String,
    /// 日志级别 (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            enable_stdout: true,
            log_dir: "logs".to_string(),
            level: "info".to_string(),
        }
    }
}

/// PostgreSQL 日志解析配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogParserSettings {
    /// 服务器的 `log_line_prefix`
    pub log_line_prefix: String,
    /// 待分析的日志文件
    pub log_files: Vec<PathBuf>,
    /// 只分析这个时间之后的记录（RFC 3339）
    #[serde(default)]
    pub begin: Option<DateTime<Utc>>,
    /// 只分析这个时间之前的记录（RFC 3339）
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    /// 服务器是否开启了 `log_connections`
    #[serde(default)]
    pub log_connections: bool,
    /// 要运行的分析器
    pub commands: Vec<String>,
    /// pg_hba.conf 规则
    #[serde(default)]
    pub hba_rules: Vec<HbaRule>,
    /// 数据库中已有的用户
    #[serde(default)]
    pub known_users: Vec<String>,
    /// 错误输出文件路径，不设置则不写
    #[serde(default)]
    pub errors_out: Option<PathBuf>,
}

impl LogParserSettings {
    pub fn time_window(&self) -> TimeWindow {
        TimeWindow::new(self.begin, self.end)
    }

    /// 记录时间是否在 `[begin, end]` 内
    pub fn is_valid_time(&self, time: Option<DateTime<Utc>>) -> bool {
        self.time_window().contains(time)
    }
}

/// 引擎参数，默认值即协议常量
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub max_concurrent_files: usize,
    /// 0 表示 CPU 数的两倍
    pub chunk_workers: usize,
    pub chunk_size_bytes: usize,
    pub batch_lines: usize,
    pub validation_sample_lines: usize,
    pub validation_failure_percent: usize,
    pub max_file_size_bytes: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_concurrent_files: MAX_CONCURRENT_FILES,
            chunk_workers: 0,
            chunk_size_bytes: CHUNK_SIZE_BYTES,
            batch_lines: BATCH_LINES,
            validation_sample_lines: VALIDATION_SAMPLE_LINES,
            validation_failure_percent: VALIDATION_FAILURE_PERCENT,
            max_file_size_bytes: MAX_FILE_SIZE_BYTES,
        }
    }
}

impl EngineSection {
    pub fn limits(&self) -> EngineLimits {
        EngineLimits {
            max_concurrent_files: self.max_concurrent_files,
            chunk_workers: self.chunk_workers,
            chunk_size_bytes: self.chunk_size_bytes,
            batch_lines: self.batch_lines,
            validation_sample_lines: self.validation_sample_lines,
            validation_failure_percent: self.validation_failure_percent,
            max_file_size_bytes: self.max_file_size_bytes,
        }
    }
}

impl Config {
    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// 从字符串加载配置
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        // 验证日志级别
        match self.log.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(AnalysisError::config_error(format!(
                    "无效的日志级别: {}",
                    self.log.level
                )));
            }
        }

        let parser = &self.parser;
        if parser.log_line_prefix.is_empty() {
            return Err(AnalysisError::config_error("log_line_prefix 不能为空"));
        }
        if parser.log_files.is_empty() {
            return Err(AnalysisError::config_error("没有配置任何日志文件"));
        }
        if parser.commands.is_empty() {
            return Err(AnalysisError::config_error("没有配置任何分析命令"));
        }
        if let Some(unknown) =
            parser.commands.iter().find(|c| !COMMANDS.contains(&c.as_str()))
        {
            return Err(AnalysisError::config_error(format!(
                "未知的分析命令: {unknown}"
            )));
        }
        if let (Some(begin), Some(end)) = (parser.begin, parser.end) {
            if begin > end {
                return Err(AnalysisError::config_error(format!(
                    "开始时间 {begin} 晚于结束时间 {end}"
                )));
            }
        }

        // 除 chunk_workers 外的引擎参数不能为 0
        let engine = &self.engine;
        for (name, value) in [
            ("max_concurrent_files", engine.max_concurrent_files as u64),
            ("chunk_size_bytes", engine.chunk_size_bytes as u64),
            ("batch_lines", engine.batch_lines as u64),
            ("validation_sample_lines", engine.validation_sample_lines as u64),
            ("validation_failure_percent", engine.validation_failure_percent as u64),
            ("max_file_size_bytes", engine.max_file_size_bytes),
        ] {
            if value == 0 {
                return Err(AnalysisError::config_error(format!("{name} 不能为0")));
            }
        }
        if engine.validation_failure_percent > 100 {
            return Err(AnalysisError::config_error(
                "validation_failure_percent 不能超过100",
            ));
        }

        Ok(())
    }
}

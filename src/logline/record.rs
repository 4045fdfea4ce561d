//! 单行解析结果

use super::template::FieldIndex;
use chrono::{DateTime, Utc};
use regex::Captures;

/// PostgreSQL 在无法确定字段值时输出的占位符
pub const UNKNOWN_PLACEHOLDER: &str = "[unknown]";

/// 字段访问错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// 前缀模板中没有对应的占位符
    #[error("field not configured: {0}")]
    NotConfigured(&'static str),
    /// 捕获到的值为空或为 `[unknown]`
    #[error("invalid value for {0}")]
    InvalidValue(&'static str),
}

/// 一行日志的解析结果
///
/// 借用原始行和解析器的字段映射，只在一次 `feed` 调用内有效。
#[derive(Debug)]
pub struct ParsedRecord<'a> {
    captures: Captures<'a>,
    index: &'a FieldIndex,
    time: Option<DateTime<Utc>>,
}

impl<'a> ParsedRecord<'a> {
    pub(crate) fn new(
        captures: Captures<'a>,
        index: &'a FieldIndex,
        time: Option<DateTime<Utc>>,
    ) -> Self {
        Self { captures, index, time }
    }

    fn capture(&self, group: usize) -> &'a str {
        self.captures.get(group).map_or("", |m| m.as_str())
    }

    fn field(
        &self,
        group: Option<usize>,
        name: &'static str,
    ) -> Result<&'a str, FieldError> {
        let group = group.ok_or(FieldError::NotConfigured(name))?;
        let value = self.capture(group);
        if value.is_empty() || value == UNKNOWN_PLACEHOLDER {
            return Err(FieldError::InvalidValue(name));
        }
        Ok(value)
    }

    pub fn user(&self) -> Result<&'a str, FieldError> {
        self.field(self.index.user, "user")
    }

    pub fn database(&self) -> Result<&'a str, FieldError> {
        self.field(self.index.database, "database")
    }

    /// 客户端主机，`%r` 带出的 `(port)` 后缀会被去掉
    pub fn host(&self) -> Result<&'a str, FieldError> {
        let host = self.field(self.index.host, "host")?;
        match host.find('(') {
            Some(pos) => Ok(&host[..pos]),
            None => Ok(host),
        }
    }

    pub fn application(&self) -> Result<&'a str, FieldError> {
        self.field(self.index.application, "application")
    }

    /// `%e` 捕获的 SQLSTATE 错误码
    pub fn error_code(&self) -> Result<&'a str, FieldError> {
        self.field(self.index.error_code, "error code")
    }

    pub fn process_id(&self) -> Result<&'a str, FieldError> {
        self.field(self.index.process_id, "process id")
    }

    pub fn session_id(&self) -> Result<&'a str, FieldError> {
        self.field(self.index.session_id, "session id")
    }

    pub fn level(&self) -> &'a str {
        self.capture(self.index.level)
    }

    pub fn description(&self) -> &'a str {
        self.capture(self.index.description())
    }

    /// 解析出的时间；模板没有时间字段或时间为空时为 `None`
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }
}

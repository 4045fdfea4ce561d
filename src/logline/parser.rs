//! 行解析器

use super::record::ParsedRecord;
use super::template::CompiledPattern;
use super::time::TimeFormat;
use std::sync::atomic::{AtomicBool, Ordering};

/// 单行解析错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    /// 行与前缀模板不匹配
    #[error("invalid log format")]
    InvalidFormat,
    /// 两种时间格式都无法解析
    #[error("unable to parse time: {0}")]
    Time(String),
    /// 以制表符开头的续行未能合并到上一行
    #[error("stray continuation line")]
    StrayContinuation,
}

/// 基于编译后前缀模板的行解析器
///
/// 构建后不可变，可在多个线程间共享。唯一的可变状态是“优先尝试的时间格式”，
/// 用原子变量保存：一行用备用格式解析成功后，后续行优先使用该格式。
#[derive(Debug)]
pub struct LineParser {
    pattern: CompiledPattern,
    prefer_named_zone: AtomicBool,
}

impl LineParser {
    pub fn new(pattern: CompiledPattern) -> Self {
        Self { pattern, prefer_named_zone: AtomicBool::new(false) }
    }

    /// 直接从前缀模板构建
    pub fn from_template(template: &str) -> Result<Self, regex::Error> {
        Ok(Self::new(CompiledPattern::compile(template)?))
    }

    pub fn pattern(&self) -> &CompiledPattern {
        &self.pattern
    }

    /// 当前优先尝试的时间格式
    pub fn preferred_time_format(&self) -> TimeFormat {
        if self.prefer_named_zone.load(Ordering::Relaxed) {
            TimeFormat::NamedZone
        } else {
            TimeFormat::NumericOffset
        }
    }

    /// 解析一行日志
    pub fn parse<'a>(
        &'a self,
        line: &'a str,
    ) -> Result<ParsedRecord<'a>, LineError> {
        if line.starts_with('\t') {
            return Err(LineError::StrayContinuation);
        }

        let regex = self.pattern.regex();
        if !regex.is_match(line) {
            return Err(LineError::InvalidFormat);
        }
        let captures = regex.captures(line).ok_or(LineError::InvalidFormat)?;

        let index = self.pattern.index();
        let time_text = index
            .time
            .and_then(|group| captures.get(group))
            .map(|m| m.as_str())
            .filter(|text| !text.is_empty());

        let time = match time_text {
            Some(text) => Some(self.parse_time(text)?),
            None => None,
        };

        Ok(ParsedRecord::new(captures, index, time))
    }

    fn parse_time(
        &self,
        text: &str,
    ) -> Result<chrono::DateTime<chrono::Utc>, LineError> {
        let preferred = self.preferred_time_format();
        if let Some(t) = preferred.parse(text) {
            return Ok(t);
        }

        let alternate = preferred.other();
        self.prefer_named_zone
            .store(alternate == TimeFormat::NamedZone, Ordering::Relaxed);
        alternate.parse(text).ok_or_else(|| LineError::Time(text.to_string()))
    }
}

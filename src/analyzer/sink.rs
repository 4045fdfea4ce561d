//! 把分析器接到引擎上

use super::Analyzer;
use crate::engine::LineSink;
use crate::error::Result;
use crate::logline::LineParser;
use chrono::{DateTime, Utc};

/// 记录时间的过滤窗口 `[begin, end]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub begin: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn new(begin: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { begin, end }
    }

    /// 时间是否落在窗口内
    ///
    /// 没有时间的记录只在设置了 `begin` 时被排除。
    pub fn contains(&self, time: Option<DateTime<Utc>>) -> bool {
        match time {
            Some(t) => {
                self.begin.is_none_or(|begin| t >= begin)
                    && self.end.is_none_or(|end| t <= end)
            }
            None => self.begin.is_none(),
        }
    }
}

/// 解析一行后交给分析器
///
/// 解析失败作为该分析器的失败行返回；时间窗口外的记录直接忽略，不算失败。
pub struct AnalyzerSink<'a> {
    parser: &'a LineParser,
    window: TimeWindow,
    analyzer: &'a dyn Analyzer,
}

impl<'a> AnalyzerSink<'a> {
    pub fn new(
        parser: &'a LineParser,
        window: TimeWindow,
        analyzer: &'a dyn Analyzer,
    ) -> Self {
        Self { parser, window, analyzer }
    }

    pub fn analyzer(&self) -> &'a dyn Analyzer {
        self.analyzer
    }
}

impl LineSink for AnalyzerSink<'_> {
    fn feed(&self, line: &str) -> Result<()> {
        let record = self.parser.parse(line)?;
        if !self.window.contains(record.time()) {
            return Ok(());
        }
        self.analyzer.feed(&record)
    }
}

/// 前缀校验器：只检查行能否被解析
pub struct PrefixValidator<'a> {
    parser: &'a LineParser,
}

impl<'a> PrefixValidator<'a> {
    pub fn new(parser: &'a LineParser) -> Self {
        Self { parser }
    }
}

impl LineSink for PrefixValidator<'_> {
    fn feed(&self, line: &str) -> Result<()> {
        self.parser.parse(line)?;
        Ok(())
    }
}

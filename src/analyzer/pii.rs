//! SQL 语句中的个人敏感信息
//!
//! 从 `statement: ...` 消息中取出语句，抽取（列名，字面量）对，交给
//! [`PiiDetector`] 打标签，按标签分组保存命中的键值对。

use super::{Analyzer, AnalyzerResult};
use crate::error::Result;
use crate::logline::ParsedRecord;
use crate::statement::{KVPair, extract, statement_from_message};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// 敏感信息识别能力
///
/// 返回 `None` 表示这对键值不是敏感信息。
pub trait PiiDetector: Send + Sync {
    fn detect(&self, column: &str, value: &str) -> Result<Option<String>>;
}

lazy_static! {
    static ref COLUMN_LABELS: Vec<(&'static str, Regex)> = vec![
        ("Email", Regex::new(r"(?i)^.*e[\s_-]?mail.*$").unwrap()),
        ("Phone", Regex::new(r"(?i)^.*(phone|mobile|cell).*$").unwrap()),
        ("Password", Regex::new(r"(?i)^.*(password|passwd|pwd).*$").unwrap()),
        ("SSN", Regex::new(r"(?i)^(ssn|social[\s_-]?security.*)$").unwrap()),
        ("CreditCard", Regex::new(r"(?i)^.*(credit[\s_-]?card|card[\s_-]?number|cc[\s_-]?num).*$").unwrap()),
        ("BirthDate", Regex::new(r"(?i)^.*(birth|dob).*$").unwrap()),
        ("Username", Regex::new(r"(?i)^(user[\s_-]?name|user|login)$").unwrap()),
        ("Name", Regex::new(r"(?i)^((first|last|full|middle)[\s_-]?name|name)$").unwrap()),
        ("Address", Regex::new(r"(?i)^.*(address|street|city).*$").unwrap()),
    ];
    static ref EMAIL_VALUE_RE: Regex =
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap();
}

/// 按列名识别的默认实现
///
/// 列名命中常见敏感字段模式即打标签；列名无法判断时只识别邮箱格式的值。
#[derive(Debug, Default, Clone, Copy)]
pub struct ColumnNameDetector;

impl PiiDetector for ColumnNameDetector {
    fn detect(&self, column: &str, value: &str) -> Result<Option<String>> {
        let label = COLUMN_LABELS
            .iter()
            .find(|(_, re)| re.is_match(column))
            .map(|(label, _)| (*label).to_string());
        if label.is_some() {
            return Ok(label);
        }
        if EMAIL_VALUE_RE.is_match(value) {
            return Ok(Some("Email".to_string()));
        }
        Ok(None)
    }
}

pub struct PiiAnalyzer {
    detector: Box<dyn PiiDetector>,
    hits: Mutex<BTreeMap<String, Vec<KVPair>>>,
}

impl PiiAnalyzer {
    pub fn new(detector: Box<dyn PiiDetector>) -> Self {
        Self { detector, hits: Mutex::new(BTreeMap::new()) }
    }

    /// 对一条 SQL 语句做抽取和识别
    ///
    /// 语句无法抽取时返回错误；识别器出错时立即返回，本条语句的命中全部丢弃。
    pub fn process_statement(&self, sql: &str) -> Result<()> {
        if sql.is_empty() {
            return Ok(());
        }
        let pairs = extract(sql)?;

        let mut labelled = Vec::new();
        for pair in pairs {
            if let Some(label) = self.detector.detect(&pair.column, &pair.value)? {
                if !label.is_empty() {
                    labelled.push((label, pair));
                }
            }
        }

        if labelled.is_empty() {
            return Ok(());
        }
        if let Ok(mut hits) = self.hits.lock() {
            for (label, pair) in labelled {
                hits.entry(label).or_default().push(pair);
            }
        }
        Ok(())
    }

    pub fn labels(&self) -> BTreeMap<String, Vec<KVPair>> {
        self.hits.lock().map(|hits| hits.clone()).unwrap_or_default()
    }
}

impl Analyzer for PiiAnalyzer {
    fn name(&self) -> &'static str {
        "pii"
    }

    fn feed(&self, record: &ParsedRecord<'_>) -> Result<()> {
        match statement_from_message(record.description()) {
            Some(sql) => self.process_statement(sql),
            None => Ok(()),
        }
    }

    fn result(&self) -> AnalyzerResult {
        AnalyzerResult::Pii { labels: self.labels() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use crate::logline::LineParser;

    /// 只把 `email` 列识别为敏感信息
    struct EmailOnly;

    impl PiiDetector for EmailOnly {
        fn detect(&self, column: &str, _value: &str) -> Result<Option<String>> {
            Ok((column == "email").then(|| "Email".to_string()))
        }
    }

    struct Failing;

    impl PiiDetector for Failing {
        fn detect(&self, _: &str, _: &str) -> Result<Option<String>> {
            Err(AnalysisError::other("detector offline"))
        }
    }

    #[test]
    fn test_groups_hits_by_label() {
        let parser = LineParser::from_template("%t [%p] ").unwrap();
        let analyzer = PiiAnalyzer::new(Box::new(EmailOnly));
        let line = "2024-03-01 10:00:00 UTC [1] LOG:  statement: SELECT * FROM users WHERE email = 'a@b.io' AND id = 7";
        analyzer.feed(&parser.parse(line).unwrap()).unwrap();

        let labels = analyzer.labels();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels["Email"], vec![KVPair::new("email", "a@b.io")]);
    }

    #[test]
    fn test_non_statement_messages_are_ignored() {
        let parser = LineParser::from_template("%t [%p] ").unwrap();
        let analyzer = PiiAnalyzer::new(Box::new(Failing));
        let line = "2024-03-01 10:00:00 UTC [1] LOG:  checkpoint complete";
        assert!(analyzer.feed(&parser.parse(line).unwrap()).is_ok());
        assert!(analyzer.result().is_empty());
    }

    #[test]
    fn test_errors_are_returned() {
        let analyzer = PiiAnalyzer::new(Box::new(Failing));
        assert!(analyzer.process_statement("SELECT * FROM t WHERE a = 1").is_err());

        let analyzer = PiiAnalyzer::new(Box::new(EmailOnly));
        let err = analyzer.process_statement("INSERT INTO t (a, b) VALUES (1)").unwrap_err();
        assert!(matches!(err, AnalysisError::Extract(_)));
    }

    #[test]
    fn test_column_name_detector() {
        let detector = ColumnNameDetector;
        assert_eq!(detector.detect("user_email", "x").unwrap().as_deref(), Some("Email"));
        assert_eq!(detector.detect("phone", "1").unwrap().as_deref(), Some("Phone"));
        assert_eq!(detector.detect("note", "bob@example.com").unwrap().as_deref(), Some("Email"));
        assert_eq!(detector.detect("id", "7").unwrap(), None);
    }
}

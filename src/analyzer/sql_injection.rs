//! SQL 注入痕迹
//!
//! 三类线索：探测系统目录的语句、认证失败类的错误消息、与注入尝试相关的
//! SQLSTATE 错误码（需要前缀中有 `%e`）。

use super::{Analyzer, AnalyzerResult};
use crate::error::Result;
use crate::logline::ParsedRecord;
use crate::statement::statement_from_message;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Mutex;

lazy_static! {
    static ref PROBE_QUERIES: Vec<Regex> = [
        r"(?i)SELECT\s+usename[\s\n]+FROM\s+pg_user",
        r"(?i)SELECT\s+DISTINCT\s*\(\s*usename\s*\)[\s\n]+FROM\s+pg_user[\s\n]+ORDER\s+BY\s+usename\s+OFFSET\s+\d+\s+LIMIT\s+1",
        r"(?i)SELECT\s+COUNT\s*\(\s*DISTINCT\s*\(\s*usename\s*\)\s*\)[\s\n]+FROM\s+pg_user",
        r"(?i)SELECT\s+usename\s*,\s*passwd[\s\n]+FROM\s+pg_shadow",
        r"(?i)SELECT\s+DISTINCT\s*\(\s*passwd\s*\)[\s\n]+FROM\s+pg_shadow[\s\n]+WHERE\s+usename\s*=\s*'\w+'[\s\n]+OFFSET\s+\d+[\s\n]+LIMIT\s+1",
        r"(?i)SELECT\s+COUNT\s*\(\s*DISTINCT\s*\(\s*passwd\s*\)\s*\)[\s\n]+FROM\s+(?:pg_shadow)[\s\n]+WHERE\s+usename\s*=\s*'\w+'",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect();

    static ref AUTH_ERRORS: Vec<Regex> = [
        r#"(?i)no\s+pg_hba\.conf\s+entry\s+for\s+host\s+"[^"]+",\s+user\s+"[^"]+",\s+database\s+"[^"]+""#,
        r#"(?i)password\s+authentication\s+failed\s+for\s+user\s+"[^"]+""#,
        r#"(?i)user\s+"[^"]+"\s+does\s+not\s+exist"#,
        r#"(?i)role\s+"[^"]+"\s+does\s+not\s+exist"#,
        r#"(?i)database\s+"[^"]+"\s+does\s+not\s+exist"#,
        r"(?i)Connection\s+to\s+Server\s+Failed:\s+Connection\s+Refused",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect();
}

/// 与注入尝试相关的 SQLSTATE
const SUSPICIOUS_CODES: [&str; 12] = [
    "42000", "42601", "42501", "3F000", "28000", "28P01", "42809", "42703", "42883",
    "42P01", "42P02", "42704",
];

#[derive(Default)]
pub struct SqlInjection {
    findings: Mutex<BTreeSet<String>>,
}

impl SqlInjection {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, finding: String) {
        if let Ok(mut findings) = self.findings.lock() {
            findings.insert(finding);
        }
    }

    pub fn findings(&self) -> Vec<String> {
        self.findings
            .lock()
            .map(|findings| findings.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Analyzer for SqlInjection {
    fn name(&self) -> &'static str {
        "sql_injection"
    }

    fn feed(&self, record: &ParsedRecord<'_>) -> Result<()> {
        let message = record.description();

        if let Some(query) = statement_from_message(message) {
            if PROBE_QUERIES.iter().any(|re| re.is_match(query)) {
                self.insert(query.to_string());
            }
        }

        if AUTH_ERRORS.iter().any(|re| re.is_match(message)) {
            self.insert(message.to_string());
        }

        if let Ok(code) = record.error_code() {
            if SUSPICIOUS_CODES.contains(&code) {
                self.insert(format!("Error code found from logfile {code}"));
            }
        }
        Ok(())
    }

    fn result(&self) -> AnalyzerResult {
        AnalyzerResult::SqlInjection { findings: self.findings() }
    }
}

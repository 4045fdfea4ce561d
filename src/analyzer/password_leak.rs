//! 明文密码泄露
//!
//! `ALTER ROLE ... PASSWORD 'xxx'` 之类的语句如果被记录下来，明文密码就
//! 留在了日志里。已经是哈希形式的密码不算泄露。

use super::{Analyzer, AnalyzerResult};
use crate::error::Result;
use crate::logline::ParsedRecord;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::sync::Mutex;

lazy_static! {
    static ref PASSWORD_RE: Regex = Regex::new(r"(?i)PASSWORD\s+'([^']+)'").unwrap();
}

/// 哈希密码的前缀
const HASHED_PREFIXES: [&str; 5] = ["md5", "scram-sha-256", "plain", "crypt", "password"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeakedPassword {
    pub query: String,
    pub password: String,
}

/// 密码是否已是哈希形式：以已知前缀开头且前缀之后还有内容
fn is_hashed(password: &str) -> bool {
    let lower = password.to_lowercase();
    HASHED_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix) && lower.len() > prefix.len())
}

#[derive(Default)]
pub struct PasswordLeak {
    leaks: Mutex<Vec<LeakedPassword>>,
}

impl PasswordLeak {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leaks(&self) -> Vec<LeakedPassword> {
        self.leaks.lock().map(|leaks| leaks.clone()).unwrap_or_default()
    }
}

impl Analyzer for PasswordLeak {
    fn name(&self) -> &'static str {
        "password_leak"
    }

    fn feed(&self, record: &ParsedRecord<'_>) -> Result<()> {
        let message = record.description();
        let Some(password) = PASSWORD_RE.captures(message).and_then(|caps| caps.get(1))
        else {
            return Ok(());
        };
        if is_hashed(password.as_str()) {
            return Ok(());
        }

        if let Ok(mut leaks) = self.leaks.lock() {
            leaks.push(LeakedPassword {
                query: message.to_string(),
                password: password.as_str().to_string(),
            });
        }
        Ok(())
    }

    fn result(&self) -> AnalyzerResult {
        AnalyzerResult::PasswordLeak { leaks: self.leaks() }
    }
}

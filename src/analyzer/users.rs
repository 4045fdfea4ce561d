//! 日志中出现的用户与不活跃用户

use super::{Analyzer, AnalyzerResult, CONNECTION_AUTHORIZED_RE};
use crate::error::{AnalysisError, Result};
use crate::logline::{LineParser, ParsedRecord};
use std::collections::BTreeSet;
use std::sync::Mutex;

/// 收集日志中出现过的用户，并与已知用户比对
///
/// 已知用户由调用方提供（通常来自数据库中的角色列表）。
pub struct InactiveUsers {
    from_prefix: bool,
    log_connections: bool,
    known_users: Vec<String>,
    seen: Mutex<BTreeSet<String>>,
}

impl InactiveUsers {
    pub fn new(
        parser: &LineParser,
        log_connections: bool,
        known_users: Vec<String>,
    ) -> Result<Self> {
        let from_prefix = parser.pattern().has_user();
        if !from_prefix && !log_connections {
            return Err(AnalysisError::config_error(
                "Please set log_line_prefix to '%u' or enable log_connections",
            ));
        }
        Ok(Self {
            from_prefix,
            log_connections,
            known_users,
            seen: Mutex::new(BTreeSet::new()),
        })
    }

    fn insert(&self, user: &str) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.insert(user.to_string());
        }
    }

    /// 日志中出现过的用户，按字典序排列
    pub fn users_from_log(&self) -> Vec<String> {
        self.seen
            .lock()
            .map(|seen| seen.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 已知但从未在日志中出现的用户
    pub fn inactive_users(&self) -> Vec<String> {
        let Ok(seen) = self.seen.lock() else {
            return Vec::new();
        };
        let mut inactive: Vec<String> = self
            .known_users
            .iter()
            .filter(|user| !seen.contains(user.as_str()))
            .cloned()
            .collect();
        inactive.sort();
        inactive.dedup();
        inactive
    }
}

impl Analyzer for InactiveUsers {
    fn name(&self) -> &'static str {
        "inactive_users"
    }

    fn feed(&self, record: &ParsedRecord<'_>) -> Result<()> {
        if self.from_prefix {
            if let Ok(user) = record.user() {
                self.insert(user);
                return Ok(());
            }
        }

        if !self.log_connections {
            return Ok(());
        }

        if let Some(user) = CONNECTION_AUTHORIZED_RE
            .captures(record.description())
            .and_then(|caps| caps.get(3))
        {
            self.insert(user.as_str());
        }
        Ok(())
    }

    fn result(&self) -> AnalyzerResult {
        AnalyzerResult::InactiveUsers {
            known_users: self.known_users.clone(),
            users_from_log: self.users_from_log(),
            inactive_users: self.inactive_users(),
        }
    }
}

//! 分析器
//!
//! 每个分析器消费解析后的日志行，并在自己的锁里累积结果。引擎对分析器的
//! 具体类型一无所知，只通过 [`AnalyzerSink`] 把它们当作行消费者调用。
//!
//! 模块结构：
//! - `sink`：行消费者适配器、时间窗口与前缀校验器
//! - `unique_ips`：客户端 IP 去重
//! - `users`：日志中出现的用户与不活跃用户
//! - `password_leak`：明文密码泄露
//! - `hba`：未使用的 pg_hba.conf 规则
//! - `pii`：SQL 语句中的个人敏感信息
//! - `sql_injection`：SQL 注入痕迹

pub mod hba;
pub mod password_leak;
pub mod pii;
pub mod sink;
pub mod sql_injection;
pub mod unique_ips;
pub mod users;

pub use hba::{HbaRule, HbaUnusedLines};
pub use password_leak::{LeakedPassword, PasswordLeak};
pub use pii::{ColumnNameDetector, PiiAnalyzer, PiiDetector};
pub use sink::{AnalyzerSink, PrefixValidator, TimeWindow};
pub use sql_injection::SqlInjection;
pub use unique_ips::UniqueIps;
pub use users::InactiveUsers;

use crate::error::Result;
use crate::logline::ParsedRecord;
use crate::statement::KVPair;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

lazy_static! {
    /// `connection received: host=... port=...`，第 3 组为主机
    pub(crate) static ref CONNECTION_RECEIVED_RE: Regex = Regex::new(
        r"(\s*)connection received:(\s+)host=(\S+)?(\s+)port=(\d+)?"
    )
    .unwrap();
    /// `connection authorized: user=... database=...`，第 3 组为用户
    pub(crate) static ref CONNECTION_AUTHORIZED_RE: Regex = Regex::new(
        r"(\s*)connection authorized:(\s+)user=(\S*)(\s+)database=(\S*)(\s+)application_name=(\S*)"
    )
    .unwrap();
}

/// 分析器能力
///
/// `feed` 会被多个工作线程并发调用，实现方自行保证内部状态线程安全。
/// 返回错误表示这一行对该分析器不可用，由引擎计数并记录，不会中断运行。
pub trait Analyzer: Send + Sync {
    /// 分析器名称，与配置中 `commands` 的取值一致
    fn name(&self) -> &'static str;

    fn feed(&self, record: &ParsedRecord<'_>) -> Result<()>;

    /// 当前累积结果的快照
    fn result(&self) -> AnalyzerResult;
}

/// 分析结果
///
/// 报告渲染按变体分派，不需要知道分析器的具体类型。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "analyzer", rename_all = "snake_case")]
pub enum AnalyzerResult {
    UniqueIps {
        ips: Vec<String>,
    },
    InactiveUsers {
        known_users: Vec<String>,
        users_from_log: Vec<String>,
        inactive_users: Vec<String>,
    },
    PasswordLeak {
        leaks: Vec<LeakedPassword>,
    },
    HbaUnusedLines {
        unused_lines: Vec<usize>,
    },
    Pii {
        labels: BTreeMap<String, Vec<KVPair>>,
    },
    SqlInjection {
        findings: Vec<String>,
    },
}

impl AnalyzerResult {
    /// 结果是否为空
    pub fn is_empty(&self) -> bool {
        match self {
            AnalyzerResult::UniqueIps { ips } => ips.is_empty(),
            AnalyzerResult::InactiveUsers { users_from_log, inactive_users, .. } => {
                users_from_log.is_empty() && inactive_users.is_empty()
            }
            AnalyzerResult::PasswordLeak { leaks } => leaks.is_empty(),
            AnalyzerResult::HbaUnusedLines { unused_lines } => unused_lines.is_empty(),
            AnalyzerResult::Pii { labels } => labels.is_empty(),
            AnalyzerResult::SqlInjection { findings } => findings.is_empty(),
        }
    }
}

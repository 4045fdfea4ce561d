//! 未使用的 pg_hba.conf 规则
//!
//! 对每条同时带有用户、数据库和客户端主机的记录，按 PostgreSQL 的查找
//! 顺序找到第一条匹配的规则并记为已使用。运行结束后从未被使用的规则
//! 行号即为结果。
//!
//! 候选规则的查找顺序：`db/user`、`db/all`，数据库名与用户名相同时再看
//! `sameuser`、`samerole`，最后是 `all/user`、`all/all`。候选按行号排序，
//! 第一条地址匹配的规则胜出。

use super::{Analyzer, AnalyzerResult};
use crate::error::{AnalysisError, Result};
use crate::logline::{LineParser, ParsedRecord};
use ipnet::IpNet;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

lazy_static! {
    static ref CIDR_RE: Regex =
        Regex::new(r"^(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}|[0-9a-fA-F:]+)(/\d+)$").unwrap();
}

const ALL: &str = "all";

/// pg_hba.conf 中的一条规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HbaRule {
    /// 在 pg_hba.conf 中的行号
    pub line: usize,
    /// 逗号分隔的数据库名，或 `all`/`sameuser`/`samerole`
    pub database: String,
    /// 逗号分隔的用户名，或 `all`
    pub user: String,
    /// CIDR、IP、主机名或关键字；`local` 规则为空
    #[serde(default)]
    pub address: String,
    /// 与 IP 地址搭配的掩码，例如 `255.255.255.0`
    #[serde(default)]
    pub netmask: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum AddressMatcher {
    /// `all`：任意地址
    Any,
    /// `samehost`：无法得知服务器自身的地址，按回环地址处理
    SameHost,
    /// `samenet`：无法得知服务器所在网段，按回环和私有地址处理
    SameNet,
    Net(IpNet),
    /// 主机名，客户端主机包含该名称即匹配
    Host(String),
}

impl AddressMatcher {
    fn from_rule(rule: &HbaRule) -> Result<Self> {
        let address = rule.address.as_str();
        let netmask = rule.netmask.as_deref().filter(|mask| !mask.is_empty());

        match address {
            ALL => return Ok(AddressMatcher::Any),
            "samehost" => return Ok(AddressMatcher::SameHost),
            "samenet" => return Ok(AddressMatcher::SameNet),
            "localhost" => {
                return IpNet::new(IpAddr::from([127, 0, 0, 1]), 32)
                    .map(AddressMatcher::Net)
                    .map_err(|e| AnalysisError::config_error(e.to_string()));
            }
            _ => {}
        }

        if let Some(mask) = netmask {
            return ip_with_mask(address, mask)
                .map(AddressMatcher::Net)
                .ok_or_else(|| {
                    AnalysisError::config_error(format!(
                        "invalid address/netmask on hba line {}: {} {}",
                        rule.line, address, mask
                    ))
                });
        }

        if CIDR_RE.is_match(address) {
            return address
                .parse::<IpNet>()
                .map(|net| AddressMatcher::Net(net.trunc()))
                .map_err(|e| {
                    AnalysisError::config_error(format!(
                        "invalid address on hba line {}: {} ({e})",
                        rule.line, address
                    ))
                });
        }

        Ok(AddressMatcher::Host(address.to_string()))
    }

    fn matches(&self, host: &str) -> bool {
        match self {
            AddressMatcher::Any => true,
            AddressMatcher::SameHost => {
                host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
            }
            AddressMatcher::SameNet => host.parse::<IpAddr>().is_ok_and(|ip| match ip {
                IpAddr::V4(v4) => v4.is_loopback() || v4.is_private(),
                IpAddr::V6(v6) => v6.is_loopback(),
            }),
            AddressMatcher::Net(net) => {
                host.parse::<IpAddr>().is_ok_and(|ip| net.contains(&ip))
            }
            AddressMatcher::Host(name) => host.contains(name.as_str()),
        }
    }
}

/// 用 IP 和点分掩码构造网段，掩码必须是连续的前缀
fn ip_with_mask(address: &str, mask: &str) -> Option<IpNet> {
    let ip: IpAddr = address.parse().ok()?;
    let mask: IpAddr = mask.parse().ok()?;
    let prefix = match (ip, mask) {
        (IpAddr::V4(_), IpAddr::V4(mask)) => {
            let bits = u32::from(mask);
            let ones = bits.leading_ones();
            (bits.count_ones() == ones).then_some(ones)?
        }
        (IpAddr::V6(_), IpAddr::V6(mask)) => {
            let bits = u128::from(mask);
            let ones = bits.leading_ones();
            (bits.count_ones() == ones).then_some(ones)?
        }
        _ => return None,
    };
    IpNet::new(ip, u8::try_from(prefix).ok()?).ok().map(|net| net.trunc())
}

struct CompiledRule {
    line: usize,
    matcher: AddressMatcher,
    hits: AtomicU64,
}

/// 统计 pg_hba.conf 中从未被使用的规则
pub struct HbaUnusedLines {
    rules: Vec<CompiledRule>,
    /// 数据库 -> 用户 -> 规则下标
    index: HashMap<String, HashMap<String, Vec<usize>>>,
}

impl HbaUnusedLines {
    pub fn new(parser: &LineParser, rules: &[HbaRule]) -> Result<Self> {
        let pattern = parser.pattern();
        if !pattern.has_host() {
            return Err(AnalysisError::config_error(
                "Please set log_line_prefix to '%h' or '%r' or enable log_connections",
            ));
        }
        if !pattern.has_user() || !pattern.has_database() {
            return Err(AnalysisError::config_error(
                "In logline prefix, please set '%u' and '%d'",
            ));
        }
        Self::from_rules(rules)
    }

    /// 只编译规则，不检查前缀
    pub fn from_rules(rules: &[HbaRule]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        let mut index: HashMap<String, HashMap<String, Vec<usize>>> = HashMap::new();

        for rule in rules {
            if rule.address.is_empty() {
                continue;
            }
            let slot = compiled.len();
            compiled.push(CompiledRule {
                line: rule.line,
                matcher: AddressMatcher::from_rule(rule)?,
                hits: AtomicU64::new(0),
            });

            for database in rule.database.split(',').filter(|d| !d.is_empty()) {
                for user in rule.user.split(',').filter(|u| !u.is_empty()) {
                    index
                        .entry(database.to_string())
                        .or_default()
                        .entry(user.to_string())
                        .or_default()
                        .push(slot);
                }
            }
        }

        tracing::debug!(rules = compiled.len(), "HBA 规则编译完成");
        Ok(Self { rules: compiled, index })
    }

    fn candidates(&self, database: &str, user: &str) -> Vec<usize> {
        let lookup = |db: &str, user: &str| -> &[usize] {
            self.index
                .get(db)
                .and_then(|users| users.get(user))
                .map_or(&[], Vec::as_slice)
        };

        let mut slots = Vec::new();
        slots.extend_from_slice(lookup(database, user));
        slots.extend_from_slice(lookup(database, ALL));
        if database == user {
            for keyword in ["sameuser", "samerole"] {
                slots.extend_from_slice(lookup(keyword, user));
                slots.extend_from_slice(lookup(keyword, ALL));
            }
        }
        slots.extend_from_slice(lookup(ALL, user));
        slots.extend_from_slice(lookup(ALL, ALL));

        slots.sort_by_key(|&slot| self.rules[slot].line);
        slots
    }

    /// 把一次连接计入第一条匹配的规则
    pub fn record_connection(&self, database: &str, user: &str, host: &str) {
        if let Some(rule) = self
            .candidates(database, user)
            .into_iter()
            .map(|slot| &self.rules[slot])
            .find(|rule| rule.matcher.matches(host))
        {
            rule.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 从未被使用的规则行号，升序
    pub fn unused_lines(&self) -> Vec<usize> {
        let mut used: HashMap<usize, bool> = HashMap::new();
        for rule in &self.rules {
            *used.entry(rule.line).or_default() |= rule.hits.load(Ordering::Relaxed) > 0;
        }
        let mut unused: Vec<usize> =
            used.into_iter().filter(|(_, used)| !used).map(|(line, _)| line).collect();
        unused.sort_unstable();
        unused
    }
}

impl Analyzer for HbaUnusedLines {
    fn name(&self) -> &'static str {
        "hba_unused_lines"
    }

    fn feed(&self, record: &ParsedRecord<'_>) -> Result<()> {
        let (Ok(user), Ok(host), Ok(database)) =
            (record.user(), record.host(), record.database())
        else {
            return Ok(());
        };
        self.record_connection(database, user, host);
        Ok(())
    }

    fn result(&self) -> AnalyzerResult {
        AnalyzerResult::HbaUnusedLines { unused_lines: self.unused_lines() }
    }
}

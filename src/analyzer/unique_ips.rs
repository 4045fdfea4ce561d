//! 客户端 IP 去重

use super::{Analyzer, AnalyzerResult, CONNECTION_RECEIVED_RE};
use crate::error::{AnalysisError, Result};
use crate::logline::{LineParser, ParsedRecord};
use std::collections::BTreeSet;
use std::sync::Mutex;

/// 收集日志中出现过的客户端地址
///
/// 优先使用前缀中的 `%h`/`%r`；取不到时，若开启了 `log_connections`，
/// 再从 `connection received` 消息里解析。
pub struct UniqueIps {
    from_prefix: bool,
    log_connections: bool,
    ips: Mutex<BTreeSet<String>>,
}

impl UniqueIps {
    pub fn new(parser: &LineParser, log_connections: bool) -> Result<Self> {
        let from_prefix = parser.pattern().has_host();
        if !from_prefix && !log_connections {
            return Err(AnalysisError::config_error(
                "Please set log_line_prefix to '%h' or '%r' or enable log_connections",
            ));
        }
        Ok(Self { from_prefix, log_connections, ips: Mutex::new(BTreeSet::new()) })
    }

    fn insert(&self, ip: &str) {
        if let Ok(mut ips) = self.ips.lock() {
            ips.insert(ip.to_string());
        }
    }

    /// 已收集的地址，按字典序排列
    pub fn ips(&self) -> Vec<String> {
        self.ips
            .lock()
            .map(|ips| ips.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Analyzer for UniqueIps {
    fn name(&self) -> &'static str {
        "unique_ips"
    }

    fn feed(&self, record: &ParsedRecord<'_>) -> Result<()> {
        if self.from_prefix {
            if let Ok(host) = record.host() {
                self.insert(host);
                return Ok(());
            }
        }

        if !self.log_connections {
            return Ok(());
        }

        if let Some(host) = CONNECTION_RECEIVED_RE
            .captures(record.description())
            .and_then(|caps| caps.get(3))
        {
            self.insert(host.as_str());
        }
        Ok(())
    }

    fn result(&self) -> AnalyzerResult {
        AnalyzerResult::UniqueIps { ips: self.ips() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser(template: &str) -> LineParser {
        LineParser::from_template(template).unwrap()
    }

    #[test]
    fn test_requires_host_or_connection_logging() {
        let err = UniqueIps::new(&parser("%t [%p] "), false).err().unwrap();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("'%h' or '%r'"));

        assert!(UniqueIps::new(&parser("%t [%p] "), true).is_ok());
        assert!(UniqueIps::new(&parser("%t %r "), false).is_ok());
    }

    #[test]
    fn test_collects_hosts_from_prefix() {
        let parser = parser("%t [%p] %r ");
        let analyzer = UniqueIps::new(&parser, false).unwrap();
        for line in [
            "2024-03-01 10:00:00 UTC [1] 10.0.0.2(5432) LOG:  a",
            "2024-03-01 10:00:01 UTC [2] 10.0.0.1(6000) LOG:  b",
            "2024-03-01 10:00:02 UTC [3] 10.0.0.2(7000) LOG:  c",
        ] {
            analyzer.feed(&parser.parse(line).unwrap()).unwrap();
        }
        assert_eq!(analyzer.ips(), vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn test_falls_back_to_connection_messages() {
        let parser = parser("%t [%p] ");
        let analyzer = UniqueIps::new(&parser, true).unwrap();
        let line = "2024-03-01 10:00:00 UTC [1] LOG:  connection received: host=192.168.1.5 port=50432";
        analyzer.feed(&parser.parse(line).unwrap()).unwrap();
        let other = "2024-03-01 10:00:00 UTC [1] LOG:  checkpoint starting";
        analyzer.feed(&parser.parse(other).unwrap()).unwrap();

        match analyzer.result() {
            AnalyzerResult::UniqueIps { ips } => assert_eq!(ips, vec!["192.168.1.5"]),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

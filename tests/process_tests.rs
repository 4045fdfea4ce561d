//! 完整运行的集成测试：配置 → 解析器 → 分析器 → 引擎 → 汇总

mod common;

use common::{PREFIX, SAMPLE_LOG, create_log, log_line};
use pglog_analysis::analyzer::{AnalyzerResult, LeakedPassword};
use pglog_analysis::config::Config;
use pglog_analysis::engine::{CancelToken, ParseOutcome};
use pglog_analysis::process::{RunSummary, run};
use pglog_analysis::statement::KVPair;
use std::path::PathBuf;
use tempfile::TempDir;

const ALL_COMMANDS: &str = r#"commands = ["unique_ips", "inactive_users", "password_leak", "hba_unused_lines", "pii", "sql_injection"]"#;

const HBA_RULES: &str = r#"known_users = ["postgres", "alice", "bob", "dave"]
hba_rules = [
    { line = 1, database = "shop", user = "alice", address = "10.0.0.0/24" },
    { line = 2, database = "shop", user = "bob", address = "10.0.0.0/24" },
    { line = 3, database = "all", user = "all", address = "192.168.0.0/16" },
    { line = 4, database = "all", user = "all", address = "all" },
    { line = 5, database = "crm", user = "dave", address = "all" },
    { line = 6, database = "all", user = "all", address = "" },
]"#;

fn config_for(files: &[PathBuf], prefix: &str, extra: &str) -> Config {
    let files: Vec<String> = files.iter().map(|f| format!("'{}'", f.display())).collect();
    let content = format!(
        "[engine]\nchunk_size_bytes = 64\nchunk_workers = 2\n\n\
         [parser]\nlog_line_prefix = \"{prefix}\"\nlog_files = [{}]\n{extra}\n",
        files.join(", ")
    );
    Config::from_str(&content).unwrap()
}

fn result_of<'a>(summary: &'a RunSummary, name: &str) -> &'a AnalyzerResult {
    &summary.analyzers.iter().find(|a| a.name == name).unwrap().result
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_all_analyzers_end_to_end() {
    let dir = TempDir::new().unwrap();
    let file = create_log(&dir, "postgresql.log", SAMPLE_LOG);
    let config = config_for(&[file], PREFIX, &format!("{ALL_COMMANDS}\n{HBA_RULES}"));

    let summary = run(&config, CancelToken::new()).unwrap();

    assert_eq!(summary.report.total_lines, 6);
    assert!(summary.report.file_errors.is_empty());
    assert_eq!(summary.analyzers.len(), 6);
    for analyzer in &summary.analyzers {
        assert_eq!(analyzer.success_lines, 6, "{}", analyzer.name);
        assert_eq!(analyzer.outcome, ParseOutcome::Complete);
    }

    assert_eq!(
        result_of(&summary, "unique_ips"),
        &AnalyzerResult::UniqueIps {
            ips: strings(&["10.0.0.5", "10.0.0.9", "192.168.1.20", "[local]"])
        }
    );
    assert_eq!(
        result_of(&summary, "inactive_users"),
        &AnalyzerResult::InactiveUsers {
            known_users: strings(&["postgres", "alice", "bob", "dave"]),
            users_from_log: strings(&["alice", "bob", "carol"]),
            inactive_users: strings(&["dave", "postgres"]),
        }
    );
    assert_eq!(
        result_of(&summary, "password_leak"),
        &AnalyzerResult::PasswordLeak {
            leaks: vec![LeakedPassword {
                query: "statement: ALTER ROLE bob PASSWORD 'hunter2'".to_string(),
                password: "hunter2".to_string(),
            }]
        }
    );
    assert_eq!(
        result_of(&summary, "hba_unused_lines"),
        &AnalyzerResult::HbaUnusedLines { unused_lines: vec![2, 5] }
    );

    let AnalyzerResult::Pii { labels } = result_of(&summary, "pii") else {
        panic!("unexpected pii result");
    };
    assert_eq!(labels["Email"], vec![KVPair::new("email", "alice@example.com")]);
    assert_eq!(labels["Phone"], vec![KVPair::new("phone", "555-0100")]);
    assert_eq!(labels.len(), 2);

    assert!(result_of(&summary, "sql_injection").is_empty());

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["analyzers"][0]["result"]["analyzer"], "unique_ips");
    assert_eq!(json["analyzers"][0]["outcome"]["status"], "complete");
}

#[test]
fn test_time_window_filters_records() {
    let dir = TempDir::new().unwrap();
    let file = create_log(&dir, "postgresql.log", SAMPLE_LOG);
    let extra = "commands = [\"unique_ips\"]\nbegin = \"2024-03-01T10:00:02Z\"";
    let config = config_for(&[file], PREFIX, extra);

    let summary = run(&config, CancelToken::new()).unwrap();

    // 窗口外的记录不算失败
    assert_eq!(summary.analyzers[0].success_lines, 6);
    assert_eq!(
        summary.analyzers[0].result,
        AnalyzerResult::UniqueIps { ips: strings(&["10.0.0.9", "192.168.1.20", "[local]"]) }
    );
}

#[test]
fn test_missing_token_fails_before_any_file_is_opened() {
    let dir = TempDir::new().unwrap();
    let errors_out = dir.path().join("errors.jsonl");
    let extra = format!(
        "commands = [\"inactive_users\"]\nerrors_out = '{}'",
        errors_out.display()
    );
    let config = config_for(&[dir.path().join("missing.log")], "%m [%p] ", &extra);

    let err = run(&config, CancelToken::new()).unwrap_err();
    assert!(err.is_config_error());
    assert!(err.to_string().contains("log_connections"));
    assert!(!errors_out.exists());
}

#[test]
fn test_bad_files_do_not_abort_the_run() {
    let dir = TempDir::new().unwrap();
    let good = create_log(&dir, "good.log", SAMPLE_LOG);
    let wrong_prefix = create_log(&dir, "other.log", &"this is not a postgres log\n".repeat(20));
    let missing = dir.path().join("missing.log");

    let mut partial = String::new();
    for i in 0..9 {
        partial.push_str(&log_line(i, "app", "shop", "10.0.0.1", "LOG", "statement: SELECT 1"));
    }
    partial.push_str("corrupted line\n");
    let partial = create_log(&dir, "partial.log", &partial);

    let errors_out = dir.path().join("out").join("errors.jsonl");
    let extra = format!(
        "commands = [\"unique_ips\"]\nerrors_out = '{}'",
        errors_out.display()
    );
    let config = config_for(&[good, wrong_prefix, missing, partial], PREFIX, &extra);

    let summary = run(&config, CancelToken::new()).unwrap();
    let report = &summary.report;

    assert_eq!(report.file_errors.len(), 2);
    assert_eq!(report.total_lines, 16);
    assert_eq!(summary.analyzers[0].success_lines, 15);
    assert_eq!(summary.analyzers[0].outcome, ParseOutcome::Partial(15.0 * 100.0 / 16.0));

    let content = std::fs::read_to_string(&errors_out).unwrap();
    let kinds: Vec<String> = content
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap())
        .map(|v| v["kind"].as_str().unwrap().to_string())
        .collect();
    assert!(kinds.contains(&"validation_failed".to_string()));
    assert!(kinds.contains(&"file_rejected".to_string()));
    assert!(kinds.contains(&"line".to_string()));
}

#[test]
fn test_cancelled_run_reports_partial_results() {
    let dir = TempDir::new().unwrap();
    let file = create_log(&dir, "postgresql.log", SAMPLE_LOG);
    let config = config_for(&[file], PREFIX, "commands = [\"password_leak\"]");

    let cancel = CancelToken::new();
    cancel.cancel();
    let summary = run(&config, cancel).unwrap();

    assert!(summary.report.cancelled);
    assert_eq!(summary.report.total_lines, 0);
    assert_eq!(summary.analyzers[0].outcome, ParseOutcome::NoLines);
    assert!(summary.analyzers[0].result.is_empty());
}

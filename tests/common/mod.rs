//! 集成测试公共模块

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// 测试用的 `log_line_prefix`
#[allow(dead_code)]
pub const PREFIX: &str = "%m [%p] %u@%d %h ";

/// 创建测试用的日志文件
pub fn create_log(dir: &TempDir, filename: &str, content: &str) -> PathBuf {
    let file_path = dir.path().join(filename);
    fs::write(&file_path, content).expect("Failed to write test file");
    file_path
}

/// 按 [`PREFIX`] 格式生成一行日志（带换行）
#[allow(dead_code)]
pub fn log_line(pid: u32, user: &str, db: &str, host: &str, level: &str, msg: &str) -> String {
    format!("2024-03-01 10:00:00.123 UTC [{pid}] {user}@{db} {host} {level}:  {msg}\n")
}

/// 标准测试日志内容
#[allow(dead_code)]
pub const SAMPLE_LOG: &str = "\
2024-03-01 10:00:00.001 UTC [101] alice@shop 10.0.0.5 LOG:  connection authorized: user=alice database=shop
2024-03-01 10:00:01.002 UTC [101] alice@shop 10.0.0.5 LOG:  statement: SELECT * FROM customers WHERE email = 'alice@example.com'
2024-03-01 10:00:02.003 UTC [102] bob@shop 192.168.1.20 LOG:  statement: ALTER ROLE bob PASSWORD 'hunter2'
2024-03-01 10:00:03.004 UTC [103] carol@crm 10.0.0.9 ERROR:  syntax error at or near \"FROM\"
2024-03-01 10:00:04.005 +0000 [104] bob@shop 192.168.1.20 LOG:  statement: UPDATE customers SET phone = '555-0100'
\tWHERE id = 42
2024-03-01 10:00:05.006 UTC [105] [unknown]@[unknown] [local] LOG:  checkpoint starting: time
";

/// 生成一个由若干日志行组成的文件，每行的进程号不同
#[allow(dead_code)]
pub fn create_numbered_log(dir: &TempDir, filename: &str, lines: usize) -> PathBuf {
    let mut content = String::new();
    for i in 0..lines {
        content.push_str(&log_line(i as u32, "app", "shop", "10.0.0.1", "LOG", &format!("event {i}")));
    }
    create_log(dir, filename, &content)
}

//! 运行编排
//!
//! 配置 → 前缀解析器 → 分析器 → 摄取引擎 → 汇总。
//!
//! 所有分析器都在打开任何文件之前初始化，前缀缺少某个分析器需要的字段时
//! 直接返回配置错误。之后的文件级、行级失败只体现在汇总里。

use crate::analyzer::{
    Analyzer, AnalyzerResult, AnalyzerSink, ColumnNameDetector, HbaUnusedLines,
    InactiveUsers, PasswordLeak, PiiAnalyzer, PiiDetector, PrefixValidator,
    SqlInjection, UniqueIps,
};
use crate::config::{Config, LogParserSettings};
use crate::engine::{CancelToken, IngestionEngine, LineSink, ParseOutcome, RunReport};
use crate::error::{AnalysisError, Result};
use crate::error_writer::ErrorWriter;
use crate::logline::LineParser;
use serde::Serialize;
use std::sync::Arc;

/// 单个分析器的运行结果
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerSummary {
    pub name: &'static str,
    /// 该分析器的成功行数
    pub success_lines: u64,
    pub outcome: ParseOutcome,
    pub result: AnalyzerResult,
}

/// 一次运行的完整结果
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub report: RunReport,
    pub analyzers: Vec<AnalyzerSummary>,
}

/// 按配置的命令构建分析器
///
/// 命令的顺序即分析器的顺序，也是成功计数的顺序。
///
/// # Errors
/// 前缀缺少分析器需要的字段，或者 HBA 规则无法解析时返回配置错误
pub fn build_analyzers(
    settings: &LogParserSettings,
    parser: &LineParser,
    detector: Box<dyn PiiDetector>,
) -> Result<Vec<Box<dyn Analyzer>>> {
    let mut detector = Some(detector);
    let mut analyzers: Vec<Box<dyn Analyzer>> = Vec::with_capacity(settings.commands.len());

    for command in &settings.commands {
        let analyzer: Box<dyn Analyzer> = match command.as_str() {
            "unique_ips" => Box::new(UniqueIps::new(parser, settings.log_connections)?),
            "inactive_users" => Box::new(InactiveUsers::new(
                parser,
                settings.log_connections,
                settings.known_users.clone(),
            )?),
            "password_leak" => Box::new(PasswordLeak::new()),
            "hba_unused_lines" => {
                Box::new(HbaUnusedLines::new(parser, &settings.hba_rules)?)
            }
            "pii" => {
                let detector = detector.take().ok_or_else(|| {
                    AnalysisError::config_error("pii 分析器只能配置一次")
                })?;
                Box::new(PiiAnalyzer::new(detector))
            }
            "sql_injection" => Box::new(SqlInjection::new()),
            other => {
                return Err(AnalysisError::config_error(format!(
                    "未知的分析命令: {other}"
                )));
            }
        };
        tracing::debug!(analyzer = analyzer.name(), "分析器初始化完成");
        analyzers.push(analyzer);
    }

    Ok(analyzers)
}

/// 使用默认的敏感信息识别器运行
pub fn run(config: &Config, cancel: CancelToken) -> Result<RunSummary> {
    run_with_detector(config, cancel, Box::new(ColumnNameDetector))
}

/// 运行一次完整的分析
///
/// # Errors
/// 只有配置错误（模板无法编译、分析器初始化失败、错误文件无法创建）会返回
/// `Err`；文件和行的失败记录在 [`RunReport`] 中。
pub fn run_with_detector(
    config: &Config,
    cancel: CancelToken,
    detector: Box<dyn PiiDetector>,
) -> Result<RunSummary> {
    let settings = &config.parser;
    let parser = LineParser::from_template(&settings.log_line_prefix)?;
    let analyzers = build_analyzers(settings, &parser, detector)?;

    let mut engine = IngestionEngine::new(config.engine.limits()).with_cancel(cancel);
    if let Some(path) = &settings.errors_out {
        let writer = ErrorWriter::new(path).map_err(|e| {
            AnalysisError::config_error(format!(
                "无法创建错误文件 {}: {e}",
                path.display()
            ))
        })?;
        engine = engine.with_error_writer(Arc::new(writer));
    }

    let window = settings.time_window();
    let sinks: Vec<AnalyzerSink<'_>> = analyzers
        .iter()
        .map(|analyzer| AnalyzerSink::new(&parser, window, analyzer.as_ref()))
        .collect();
    let sink_refs: Vec<&dyn LineSink> =
        sinks.iter().map(|sink| sink as &dyn LineSink).collect();
    let validator = PrefixValidator::new(&parser);

    let report = engine.run(&settings.log_files, &sink_refs, &validator);

    let analyzers = analyzers
        .iter()
        .enumerate()
        .map(|(index, analyzer)| AnalyzerSummary {
            name: analyzer.name(),
            success_lines: report.success_lines.get(index).copied().unwrap_or(0),
            outcome: report.outcome(index),
            result: analyzer.result(),
        })
        .collect();

    Ok(RunSummary { report, analyzers })
}

/// 在 tokio 的阻塞线程池上运行，Ctrl-C 时取消
///
/// # Errors
/// 与 [`run`] 相同；后台任务异常退出时返回 `Fault`
#[cfg(feature = "async")]
pub async fn run_async(config: Config) -> Result<RunSummary> {
    let cancel = CancelToken::new();
    let task_cancel = cancel.clone();
    let mut task = tokio::task::spawn_blocking(move || run(&config, task_cancel));

    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("收到 Ctrl-C，等待进行中的任务结束");
            cancel.cancel();
            task.await
        }
    };

    joined.map_err(|e| AnalysisError::Fault(e.to_string()))?
}

use anyhow::{Context, Result};
use pglog_analysis::config::Config;
use pglog_analysis::engine::CancelToken;
use pglog_analysis::process::run;
use signal_hook::consts::{SIGINT, SIGTERM};

const DEFAULT_CONFIG: &str = "config.toml";

fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = Config::from_file(&config_path)
        .with_context(|| format!("加载配置文件失败: {config_path}"))?;

    #[cfg(feature = "logging")]
    let _guard = {
        use pglog_analysis::logging::{LogConfig, init_logging};
        init_logging(LogConfig::from_section(&config.log)?)?
    };

    // SIGINT/SIGTERM 只置位取消标志，进行中的任务会跑完
    let cancel = CancelToken::new();
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, cancel.flag())
            .with_context(|| format!("注册信号处理失败: {signal}"))?;
    }

    let summary = run(&config, cancel)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.report.cancelled {
        eprintln!("运行被取消，以上为部分结果");
    }
    Ok(())
}

//! Cluster Vitals 主程序入口
//!
//! Kubernetes 集群与插件健康检测工具

use anyhow::{Context, Result};
use clap::Parser;
use cluster_vitals::cli::{command_for, load_config, Args};
use cluster_vitals::config::Config;
use cluster_vitals::logging::{parse_level, LogConfig, LoggingSystem};
use std::sync::Arc;
use tracing::{debug, error};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 需要配置的命令先加载配置，日志级别由配置和命令行共同决定
    let config = if args.command.needs_config() {
        match load_config(&args).await {
            Ok(config) => Some(Arc::new(config)),
            Err(e) => {
                eprintln!("加载配置失败: {e}");
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    init_logging(&args, config.as_deref())?;
    debug!("Cluster Vitals v{} 启动", cluster_vitals::VERSION);

    let Some(command) = command_for(&args.command, config) else {
        eprintln!("该命令需要配置文件");
        std::process::exit(1);
    };

    match command.execute(&args).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("命令执行失败: {}", e);
            eprintln!("错误: {e}");
            std::process::exit(1);
        }
    }
}

/// 初始化日志系统
///
/// 命令行 `--log-level` 优先于配置文件中的 `global.log_level`。
/// 控制台日志写到标准错误，标准输出只留给检测报告。
fn init_logging(args: &Args, config: Option<&Config>) -> Result<()> {
    let level = args
        .log_level
        .map(log::LevelFilter::from)
        .or_else(|| config.and_then(|c| parse_level(&c.global.log_level)))
        .unwrap_or(log::LevelFilter::Info);

    let file_path = config.and_then(|c| c.global.log_file.clone());
    let log_config = LogConfig {
        level,
        console: file_path.is_none(),
        file_path,
        json_format: args.json_logs,
        ..Default::default()
    };

    LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;
    Ok(())
}

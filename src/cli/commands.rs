//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑。每个命令返回进程退出码：
//! 有 critical 结果时为 2，其余为 0。

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{Config, ConfigLoader, ConfigTargetSource, TomlConfigLoader};
use crate::error::Result;
use crate::health::dispatcher::Dispatcher;
use crate::health::orchestrator::HealthOrchestrator;
use crate::health::outcome::Severity;
use crate::health::record::CheckRecord;
use crate::health::registry::ProbeRegistry;
use crate::store::{JsonlRecordStore, MemoryRecordStore, RecordStore};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::fmt::Write as _;
use std::sync::Arc;

/// 成功退出码
pub const EXIT_OK: i32 = 0;

/// 存在 critical 结果时的退出码
pub const EXIT_CRITICAL: i32 = 2;

/// 历史查询的默认回溯天数
const DEFAULT_HISTORY_DAYS: i64 = 7;

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    ///
    /// # 返回
    /// * `Result<i32>` - 进程退出码
    async fn execute(&self, args: &Args) -> Result<i32>;
}

/// 加载命令行指定的配置文件
pub async fn load_config(args: &Args) -> Result<Config> {
    let path = args.get_config_path();
    TomlConfigLoader::new(true).load_from_file(&path).await
}

/// 按配置构建编排器
///
/// 配置了 `records_dir` 时记录写入 JSON Lines 文件，否则只保存在内存中。
pub async fn build_orchestrator(config: Arc<Config>) -> Result<HealthOrchestrator> {
    let global = &config.global;
    let dispatcher = Dispatcher::new(Arc::new(ProbeRegistry::with_defaults()))
        .with_default_timeout(global.probe_timeout())
        .with_max_concurrent(global.max_concurrent_probes);

    let store: Arc<dyn RecordStore> = match &global.records_dir {
        Some(dir) => Arc::new(JsonlRecordStore::open(dir.clone()).await?),
        None => Arc::new(MemoryRecordStore::new()),
    };

    let max_clusters = global.max_concurrent_clusters;
    let targets = Arc::new(ConfigTargetSource::new(config));
    let orchestrator = HealthOrchestrator::new(dispatcher, targets, store)?
        .with_max_concurrent_clusters(max_clusters);
    Ok(orchestrator)
}

/// 严重级别对应的终端图标
pub fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Healthy => "✓",
        Severity::Warning => "⚠",
        Severity::Critical => "✗",
        Severity::Unknown => "?",
    }
}

/// 渲染一条检测记录的文本报告
pub fn render_record(record: &CheckRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} ({}) - {} [{}ms]",
        severity_icon(record.overall),
        record.cluster_name,
        record.cluster_id,
        record.overall,
        record.duration.as_millis()
    );
    if let (Some(ready), Some(total)) = (record.ready_nodes, record.total_nodes) {
        let _ = writeln!(out, "  节点: {ready}/{total} Ready");
    }
    for item in &record.outcomes {
        let timing = item
            .outcome
            .response_time_ms
            .map(|ms| format!(" ({ms}ms)"))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  {} {:<20} {}{}",
            severity_icon(item.outcome.severity),
            item.name,
            item.outcome.message,
            timing
        );
    }
    if !record.errors.is_empty() {
        let _ = writeln!(out, "  错误:");
        for line in &record.errors {
            let _ = writeln!(out, "    - {line}");
        }
    }
    if !record.warnings.is_empty() {
        let _ = writeln!(out, "  警告:");
        for line in &record.warnings {
            let _ = writeln!(out, "    - {line}");
        }
    }
    out
}

/// 输出记录并计算退出码
fn emit_records(records: &[CheckRecord], format: OutputFormat) -> Result<i32> {
    match format {
        OutputFormat::Json => {
            if let [record] = records {
                println!("{}", serde_json::to_string_pretty(record)?);
            } else {
                println!("{}", serde_json::to_string_pretty(records)?);
            }
        }
        OutputFormat::Text => {
            if records.is_empty() {
                println!("没有执行任何检测");
            }
            for record in records {
                print!("{}", render_record(record));
            }
        }
    }
    Ok(exit_code(records))
}

/// 任一记录为 critical 时返回 2
pub fn exit_code(records: &[CheckRecord]) -> i32 {
    if records.iter().any(|r| r.overall == Severity::Critical) {
        EXIT_CRITICAL
    } else {
        EXIT_OK
    }
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(EXIT_OK)
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        let Commands::Validate { verbose } = &args.command else {
            return Ok(EXIT_OK);
        };
        let config_file = args.get_config_path();
        println!("验证配置文件: {}", config_file.display());

        // 加载时已完成验证
        let config = load_config(args).await?;
        let registry = ProbeRegistry::with_defaults();
        println!("✓ 配置文件验证通过");

        if *verbose {
            println!("\n配置详情:");
            println!("  日志级别: {}", config.global.log_level);
            println!("  探针超时: {}s", config.global.probe_timeout_seconds);
            println!("  并发探针数: {}", config.global.max_concurrent_probes);
            println!("  并发集群数: {}", config.global.max_concurrent_clusters);
            if let Some(dir) = &config.global.records_dir {
                println!("  记录目录: {}", dir.display());
            }
            println!("  集群数量: {}", config.clusters.len());

            for cluster in &config.clusters {
                println!("\n  集群: {} ({})", cluster.name, cluster.id);
                println!("    API: {}", cluster.api_endpoint);
                for addon in &cluster.addons {
                    let mark = if registry.contains(&addon.kind) {
                        ""
                    } else {
                        " (HTTP 回退)"
                    };
                    println!("    - {} [{}]{}", addon.name, addon.kind, mark);
                }
            }
        }
        Ok(EXIT_OK)
    }
}

/// 探针列表命令，不需要配置文件
pub struct ProbesCommand;

#[async_trait]
impl Command for ProbesCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        let Commands::Probes { category, format } = &args.command else {
            return Ok(EXIT_OK);
        };
        let registry = ProbeRegistry::with_defaults();
        let descriptors: Vec<_> = registry
            .list()
            .into_iter()
            .filter(|d| category.map_or(true, |c| d.category == c))
            .collect();

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&descriptors)?),
            OutputFormat::Text => {
                for d in &descriptors {
                    println!(
                        "{} {:<16} {:<11} {}",
                        d.icon,
                        d.kind,
                        d.category.to_string(),
                        d.description
                    );
                }
                println!("\n共 {} 个探针", descriptors.len());
            }
        }
        Ok(EXIT_OK)
    }
}

/// 集群检测命令（按已配置插件）
pub struct CheckCommand {
    pub config: Arc<Config>,
}

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        let Commands::Check { cluster, format } = &args.command else {
            return Ok(EXIT_OK);
        };
        let orchestrator = build_orchestrator(Arc::clone(&self.config)).await?;
        let record = orchestrator.run_cluster_check(cluster).await?;
        emit_records(&[record], *format)
    }
}

/// 日常检测命令
pub struct DailyCommand {
    pub config: Arc<Config>,
}

#[async_trait]
impl Command for DailyCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        let Commands::Daily {
            cluster,
            schedule,
            format,
        } = &args.command
        else {
            return Ok(EXIT_OK);
        };
        let orchestrator = build_orchestrator(Arc::clone(&self.config)).await?;
        let records = match cluster {
            Some(id) => vec![orchestrator.run_daily_check(id, *schedule).await?],
            None => orchestrator.run_daily_check_all(*schedule).await,
        };
        emit_records(&records, *format)
    }
}

/// 按类型运行探针命令
pub struct RunProbesCommand {
    pub config: Arc<Config>,
}

#[async_trait]
impl Command for RunProbesCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        let Commands::RunProbes {
            cluster,
            kinds,
            format,
        } = &args.command
        else {
            return Ok(EXIT_OK);
        };
        let orchestrator = build_orchestrator(Arc::clone(&self.config)).await?;
        let record = orchestrator.run_by_names(cluster, kinds).await?;
        emit_records(&[record], *format)
    }
}

/// 按类别运行探针命令
pub struct RunCategoryCommand {
    pub config: Arc<Config>,
}

#[async_trait]
impl Command for RunCategoryCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        let Commands::RunCategory {
            cluster,
            category,
            format,
        } = &args.command
        else {
            return Ok(EXIT_OK);
        };
        let orchestrator = build_orchestrator(Arc::clone(&self.config)).await?;
        let record = orchestrator
            .run_by_category(cluster, *category)
            .await?;
        emit_records(&[record], *format)
    }
}

/// 历史记录命令
pub struct HistoryCommand {
    pub config: Arc<Config>,
}

#[async_trait]
impl Command for HistoryCommand {
    async fn execute(&self, args: &Args) -> Result<i32> {
        let Commands::History {
            cluster,
            from,
            to,
            format,
        } = &args.command
        else {
            return Ok(EXIT_OK);
        };

        let Some(dir) = &self.config.global.records_dir else {
            eprintln!("未配置 records_dir，没有可查询的历史记录");
            return Ok(EXIT_OK);
        };
        let store = JsonlRecordStore::open(dir.clone()).await?;

        let from = from.unwrap_or_else(|| Utc::now() - ChronoDuration::days(DEFAULT_HISTORY_DAYS));
        let records = store.list_range(cluster, Some(from), *to).await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
            OutputFormat::Text => {
                if records.is_empty() {
                    println!("集群 {} 在该时间范围内没有检测记录", cluster);
                }
                for record in &records {
                    println!(
                        "{} {} {:<8} 错误 {} 项, 警告 {} 项",
                        record.checked_at.format("%Y-%m-%d %H:%M:%S"),
                        severity_icon(record.overall),
                        record.overall.to_string(),
                        record.errors.len(),
                        record.warnings.len()
                    );
                }
            }
        }
        Ok(EXIT_OK)
    }
}

/// 按子命令创建处理器
///
/// # 参数
/// * `command` - 解析后的子命令
/// * `config` - 已加载的配置，不需要配置的命令可为 `None`
pub fn command_for(command: &Commands, config: Option<Arc<Config>>) -> Option<Box<dyn Command>> {
    let handler: Box<dyn Command> = match command {
        Commands::Version { .. } => Box::new(VersionCommand),
        Commands::Probes { .. } => Box::new(ProbesCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Check { .. } => Box::new(CheckCommand { config: config? }),
        Commands::Daily { .. } => Box::new(DailyCommand { config: config? }),
        Commands::RunProbes { .. } => Box::new(RunProbesCommand { config: config? }),
        Commands::RunCategory { .. } => Box::new(RunCategoryCommand { config: config? }),
        Commands::History { .. } => Box::new(HistoryCommand { config: config? }),
    };
    Some(handler)
}

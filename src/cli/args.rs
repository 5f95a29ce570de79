//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use crate::health::probe::ProbeCategory;
use crate::health::record::ScheduleType;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Cluster Vitals - Kubernetes 集群与插件健康检测工具
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cluster-vitals",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "CLUSTER_VITALS_CONFIG",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// 日志级别，未指定时使用配置文件中的级别
    #[arg(
        short,
        long,
        value_enum,
        help = "日志级别",
        env = "CLUSTER_VITALS_LOG_LEVEL",
        global = true
    )]
    pub log_level: Option<LogLevel>,

    /// 以JSON格式输出日志
    #[arg(long, help = "以JSON格式输出日志", global = true)]
    pub json_logs: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 按已配置的插件检测一个集群
    Check {
        /// 集群标识
        #[arg(value_name = "CLUSTER", help = "集群标识")]
        cluster: String,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 执行内置日常检测
    Daily {
        /// 集群标识，不指定则检测所有集群
        #[arg(long, value_name = "CLUSTER", help = "集群标识")]
        cluster: Option<String>,

        /// 检测时段
        #[arg(
            short,
            long,
            value_name = "SCHEDULE",
            default_value = "manual",
            help = "检测时段 (morning|noon|evening|manual)"
        )]
        schedule: ScheduleType,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 只运行指定类型的探针
    RunProbes {
        /// 集群标识
        #[arg(value_name = "CLUSTER", help = "集群标识")]
        cluster: String,

        /// 探针类型
        #[arg(value_name = "KIND", required = true, help = "探针类型")]
        kinds: Vec<String>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 只运行某个类别的探针
    RunCategory {
        /// 集群标识
        #[arg(value_name = "CLUSTER", help = "集群标识")]
        cluster: String,

        /// 探针类别
        #[arg(value_name = "CATEGORY", help = "探针类别")]
        category: ProbeCategory,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 列出已注册的探针
    Probes {
        /// 只显示某个类别
        #[arg(long, value_name = "CATEGORY", help = "探针类别")]
        category: Option<ProbeCategory>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 查看历史检测记录
    History {
        /// 集群标识
        #[arg(value_name = "CLUSTER", help = "集群标识")]
        cluster: String,

        /// 起始时间（RFC 3339）
        #[arg(long, value_name = "TIME", value_parser = parse_timestamp, help = "起始时间")]
        from: Option<DateTime<Utc>>,

        /// 结束时间（RFC 3339）
        #[arg(long, value_name = "TIME", value_parser = parse_timestamp, help = "结束时间")]
        to: Option<DateTime<Utc>>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 验证配置文件
    Validate {
        /// 是否显示详细信息
        #[arg(short, long, help = "显示详细信息")]
        verbose: bool,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

impl Commands {
    /// 命令是否需要加载配置文件
    pub fn needs_config(&self) -> bool {
        !matches!(self, Commands::Probes { .. } | Commands::Version { .. })
    }
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

/// 解析 RFC 3339 时间
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("无效的时间格式 '{value}': {e}"))
}

impl Args {
    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::loader::get_default_config_path)
    }
}

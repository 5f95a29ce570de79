//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::health::record::ScheduleType;
use crate::health::target::{AddonSpec, ClusterTarget, Settings};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// 主配置结构，包含全局配置和集群列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 集群配置列表
    #[serde(default)]
    pub clusters: Vec<ClusterEntry>,
}

impl Config {
    /// 按标识查找集群
    pub fn cluster(&self, id: &str) -> Option<&ClusterEntry> {
        self.clusters.iter().find(|c| c.id == id)
    }
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 日志文件路径
    pub log_file: Option<PathBuf>,
    /// 探针默认超时时间（秒）
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
    /// 单个集群内最大并发探针数
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,
    /// 最大并发集群数
    #[serde(default = "default_max_concurrent_clusters")]
    pub max_concurrent_clusters: usize,
    /// 检测记录目录，未设置时只保存在内存中
    pub records_dir: Option<PathBuf>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
            probe_timeout_seconds: default_probe_timeout(),
            max_concurrent_probes: default_max_concurrent_probes(),
            max_concurrent_clusters: default_max_concurrent_clusters(),
            records_dir: None,
        }
    }
}

impl GlobalConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }
}

/// 集群配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterEntry {
    /// 集群标识
    pub id: String,
    /// 显示名称
    pub name: String,
    /// API 服务器地址
    pub api_endpoint: String,
    /// kubeconfig 路径，未设置时使用默认推断
    pub kubeconfig_path: Option<PathBuf>,
    /// 探针设置
    #[serde(default)]
    pub config: Settings,
    /// 日常检测时段开关
    #[serde(default)]
    pub daily_check: DailyCheckSettings,
    /// 插件列表
    #[serde(default)]
    pub addons: Vec<AddonEntry>,
}

impl ClusterEntry {
    /// 转换为检测目标
    pub fn to_target(&self) -> ClusterTarget {
        ClusterTarget {
            id: self.id.clone(),
            name: self.name.clone(),
            api_endpoint: self.api_endpoint.clone(),
            kubeconfig_path: self.kubeconfig_path.clone(),
            config: self.config.clone(),
        }
    }

    /// 转换为插件绑定，保持配置顺序
    pub fn addon_specs(&self) -> Vec<AddonSpec> {
        self.addons.iter().map(|a| a.to_spec(&self.id)).collect()
    }
}

/// 插件配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddonEntry {
    /// 插件名称
    pub name: String,
    /// 探针类型
    pub kind: String,
    /// 图标
    pub icon: Option<String>,
    /// 描述
    pub description: Option<String>,
    /// 回退脚本
    pub fallback_script: Option<PathBuf>,
    /// 插件设置，覆盖集群设置
    pub config: Option<Settings>,
}

impl AddonEntry {
    fn to_spec(&self, cluster_id: &str) -> AddonSpec {
        let mut spec = AddonSpec::new(cluster_id, &self.name, &self.kind);
        if let Some(icon) = &self.icon {
            spec.icon = icon.clone();
        }
        spec.description = self.description.clone();
        spec.fallback_script = self.fallback_script.clone();
        spec.config = self.config.clone();
        spec
    }
}

/// 日常检测时段开关
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DailyCheckSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_enabled")]
    pub morning: bool,
    #[serde(default = "default_enabled")]
    pub noon: bool,
    #[serde(default = "default_enabled")]
    pub evening: bool,
}

impl Default for DailyCheckSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            morning: true,
            noon: true,
            evening: true,
        }
    }
}

impl DailyCheckSettings {
    /// 某个时段是否需要执行，手动触发总是执行
    pub fn allows(&self, schedule: ScheduleType) -> bool {
        match schedule {
            ScheduleType::Manual => true,
            ScheduleType::Morning => self.enabled && self.morning,
            ScheduleType::Noon => self.enabled && self.noon,
            ScheduleType::Evening => self.enabled && self.evening,
        }
    }
}

// 默认值函数
fn default_log_level() -> String {
    "info".to_string()
}
fn default_probe_timeout() -> u64 {
    30
}
fn default_max_concurrent_probes() -> usize {
    8
}
fn default_max_concurrent_clusters() -> usize {
    4
}
fn default_enabled() -> bool {
    true
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    // 验证全局配置
    if config.global.probe_timeout_seconds == 0 {
        return Err("探针超时时间不能为0".to_string());
    }

    if config.global.max_concurrent_probes == 0 {
        return Err("最大并发探针数不能为0".to_string());
    }

    if config.global.max_concurrent_clusters == 0 {
        return Err("最大并发集群数不能为0".to_string());
    }

    // 验证日志级别
    let valid_log_levels = ["debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    // 验证集群配置
    if config.clusters.is_empty() {
        return Err("至少需要配置一个集群".to_string());
    }

    let mut seen = HashSet::new();
    for cluster in &config.clusters {
        if cluster.id.trim().is_empty() {
            return Err("集群标识不能为空".to_string());
        }

        if !seen.insert(cluster.id.as_str()) {
            return Err(format!("集群标识重复: {}", cluster.id));
        }

        if !cluster.api_endpoint.starts_with("http://") && !cluster.api_endpoint.starts_with("https://") {
            return Err(format!("集群 {} 的API地址格式无效", cluster.id));
        }

        for addon in &cluster.addons {
            if addon.name.trim().is_empty() {
                return Err(format!("集群 {} 存在名称为空的插件", cluster.id));
            }
            if addon.kind.trim().is_empty() {
                return Err(format!("集群 {} 的插件 {} 未指定探针类型", cluster.id, addon.name));
            }
        }
    }

    Ok(())
}

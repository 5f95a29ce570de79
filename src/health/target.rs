//! 检测目标定义
//!
//! 集群寻址信息和插件（addon）绑定，在一次编排过程中保持不可变

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

/// 自由格式的设置表
pub type Settings = HashMap<String, Value>;

/// 单个集群的寻址信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterTarget {
    /// 集群标识
    pub id: String,
    /// 显示名称
    pub name: String,
    /// API 服务器地址
    pub api_endpoint: String,
    /// kubeconfig 路径
    pub kubeconfig_path: Option<PathBuf>,
    /// 探针设置（对象存储凭据、CI 地址、令牌、命名空间覆盖等）
    #[serde(default)]
    pub config: Settings,
}

impl ClusterTarget {
    pub fn new(id: impl Into<String>, name: impl Into<String>, api_endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            api_endpoint: api_endpoint.into(),
            kubeconfig_path: None,
            config: HashMap::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// 去掉末尾斜杠的 API 地址
    pub fn api_base(&self) -> &str {
        self.api_endpoint.trim_end_matches('/')
    }
}

/// 一个已配置的探针绑定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonSpec {
    /// 所属集群
    pub cluster_id: String,
    /// 显示名称
    pub name: String,
    /// 探针类型
    pub kind: String,
    /// 图标
    pub icon: String,
    /// 描述
    pub description: Option<String>,
    /// 未注册探针时使用的脚本
    pub fallback_script: Option<PathBuf>,
    /// 覆盖或扩展集群设置
    #[serde(default)]
    pub config: Option<Settings>,
}

impl AddonSpec {
    pub fn new(cluster_id: impl Into<String>, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            name: name.into(),
            kind: kind.into(),
            icon: "📦".to_string(),
            description: None,
            fallback_script: None,
            config: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_fallback_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.fallback_script = Some(path.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// 只能在插件上设置的键
///
/// 这些键描述单个插件的位置，集群级同名设置（例如集群默认命名空间）不会下发到探针。
pub const ADDON_SCOPED_KEYS: [&str; 5] = ["url", "namespace", "label_selector", "workload", "health_path"];

/// 合并后的有效设置：插件设置优先于集群设置
#[derive(Debug, Clone, Default)]
pub struct EffectiveSettings {
    values: Settings,
}

impl EffectiveSettings {
    pub fn resolve(target: &ClusterTarget, addon: &AddonSpec) -> Self {
        let mut values: Settings = target
            .config
            .iter()
            .filter(|(key, _)| !ADDON_SCOPED_KEYS.contains(&key.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(overrides) = &addon.config {
            values.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// 读取字符串设置，空字符串视为未设置
    pub fn str(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// 依次尝试多个键
    pub fn first_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.str(key))
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        self.values.get(key).and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
    }
}

//! 探针接口定义

use crate::error::ProbeError;
use crate::health::cluster::ClusterHandle;
use crate::health::outcome::CheckOutcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// 探针的默认超时
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// 探针接口：针对一个外部系统的单次健康检测
///
/// 探针实例由注册表中的构造器按 `(集群, 插件)` 创建，每次执行都是无状态的。
/// 返回的错误由调度器统一转换为 critical 结果。
#[async_trait]
pub trait Probe: Send + Sync {
    /// 执行健康检测
    ///
    /// # 参数
    /// * `cluster` - 本次编排过程的集群句柄
    ///
    /// # 返回
    /// * `Result<CheckOutcome, ProbeError>` - 检测结果
    async fn check(&self, cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError>;

    /// 探针声明的超时，`None` 时使用调度器默认值
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// 探针类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeCategory {
    Core,
    Storage,
    Networking,
    Monitoring,
    Cicd,
    Security,
}

impl std::fmt::Display for ProbeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProbeCategory::Core => "core",
            ProbeCategory::Storage => "storage",
            ProbeCategory::Networking => "networking",
            ProbeCategory::Monitoring => "monitoring",
            ProbeCategory::Cicd => "cicd",
            ProbeCategory::Security => "security",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ProbeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "core" => Ok(ProbeCategory::Core),
            "storage" => Ok(ProbeCategory::Storage),
            "networking" => Ok(ProbeCategory::Networking),
            "monitoring" => Ok(ProbeCategory::Monitoring),
            "cicd" => Ok(ProbeCategory::Cicd),
            "security" => Ok(ProbeCategory::Security),
            other => Err(format!("unknown probe category: {other}")),
        }
    }
}

/// 注册表中每个探针类型的元信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeDescriptor {
    /// 探针类型键
    pub kind: String,
    /// 类别
    pub category: ProbeCategory,
    /// 显示名称
    pub label: String,
    /// 描述
    pub description: String,
    /// 图标
    pub icon: String,
    /// 覆盖调度器默认值的超时
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl ProbeDescriptor {
    pub fn new(kind: impl Into<String>, category: ProbeCategory, label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            kind: kind.into(),
            category,
            description: label.clone(),
            label,
            icon: "🔍".to_string(),
            timeout: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip_through_str() {
        for category in [
            ProbeCategory::Core,
            ProbeCategory::Storage,
            ProbeCategory::Networking,
            ProbeCategory::Monitoring,
            ProbeCategory::Cicd,
            ProbeCategory::Security,
        ] {
            assert_eq!(category.to_string().parse::<ProbeCategory>(), Ok(category));
        }
        assert!("CORE".parse::<ProbeCategory>().is_ok());
        assert!("dns".parse::<ProbeCategory>().is_err());
    }
}

//! 内置探针实现
//!
//! 每个探针负责一种外部协议，分类规则是独立的纯函数，便于单独测试

pub mod api_server;
pub mod argocd;
pub mod control_plane;
pub mod etcd;
pub mod http_fallback;
pub mod jenkins;
pub mod keycloak;
pub mod minio;
pub mod nexus;
pub mod node;
pub mod script;
pub mod system_pod;

use crate::health::registry::ProbeRegistry;
use crate::health::target::EffectiveSettings;
use k8s_openapi::api::core::v1::Pod;
use serde::Serialize;

pub use api_server::ApiServerProbe;
pub use argocd::ArgoCdProbe;
pub use control_plane::ControlPlaneProbe;
pub use etcd::EtcdProbe;
pub use http_fallback::HttpFallbackProbe;
pub use jenkins::JenkinsProbe;
pub use keycloak::KeycloakProbe;
pub use minio::MinioProbe;
pub use nexus::NexusProbe;
pub use node::NodeProbe;
pub use script::ScriptProbe;
pub use system_pod::SystemPodProbe;

/// 注册全部内置探针
pub fn register_builtin(registry: &mut ProbeRegistry) {
    registry.register(ApiServerProbe::descriptor(), |t, a| {
        Box::new(ApiServerProbe::new(t, a))
    });
    registry.register(EtcdProbe::descriptor(), |t, a| Box::new(EtcdProbe::new(t, a)));
    registry.register(NodeProbe::descriptor(), |t, a| Box::new(NodeProbe::new(t, a)));
    registry.register(ControlPlaneProbe::descriptor(), |t, a| {
        Box::new(ControlPlaneProbe::new(t, a))
    });
    registry.register(SystemPodProbe::descriptor(), |t, a| {
        Box::new(SystemPodProbe::new(t, a))
    });
    registry.register(MinioProbe::descriptor(), |t, a| Box::new(MinioProbe::new(t, a)));
    registry.register(ArgoCdProbe::descriptor(), |t, a| Box::new(ArgoCdProbe::new(t, a)));
    registry.register(JenkinsProbe::descriptor(), |t, a| {
        Box::new(JenkinsProbe::new(t, a))
    });
    registry.register(NexusProbe::descriptor(), |t, a| Box::new(NexusProbe::new(t, a)));
    registry.register(KeycloakProbe::descriptor(), |t, a| {
        Box::new(KeycloakProbe::new(t, a))
    });
}

/// 从设置中读取服务地址，去掉末尾斜杠
///
/// 插件上的 `url` 优先，其次是集群级的带前缀键（如 `jenkins_url`）。
pub(crate) fn service_url(settings: &EffectiveSettings, cluster_key: &str, default: &str) -> String {
    settings
        .first_str(&["url", cluster_key])
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

/// 系统组件所在的命名空间
pub(crate) const SYSTEM_NAMESPACE: &str = "kube-system";

/// Pod 状态摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PodSummary {
    pub name: String,
    pub phase: String,
    /// 全部容器就绪
    pub ready: bool,
}

impl PodSummary {
    pub fn new(name: impl Into<String>, phase: impl Into<String>, ready: bool) -> Self {
        Self {
            name: name.into(),
            phase: phase.into(),
            ready,
        }
    }

    pub fn from_pod(pod: &Pod) -> Self {
        let status = pod.status.as_ref();
        let ready = status
            .and_then(|s| s.container_statuses.as_deref())
            .unwrap_or_default()
            .iter()
            .all(|cs| cs.ready);
        Self {
            name: pod.metadata.name.clone().unwrap_or_default(),
            phase: status
                .and_then(|s| s.phase.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            ready,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == "Running"
    }

    /// 运行中且全部容器就绪
    pub fn is_running_ready(&self) -> bool {
        self.is_running() && self.ready
    }
}

/// 字节数转换为易读格式
pub fn human_readable_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} EB")
}

/// 字节数转换为 MB，保留两位小数
pub(crate) fn bytes_to_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_readable_size() {
        assert_eq!(human_readable_size(512), "512.00 B");
        assert_eq!(human_readable_size(1536), "1.50 KB");
        assert_eq!(human_readable_size(5 * 1024 * 1024 * 1024), "5.00 GB");
    }

    #[test]
    fn test_pod_summary_from_pod() {
        use k8s_openapi::api::core::v1::{ContainerStatus, PodStatus};

        let pod = Pod {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some("etcd-master-1".to_string()),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                container_statuses: Some(vec![ContainerStatus {
                    ready: false,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let summary = PodSummary::from_pod(&pod);
        assert_eq!(summary.name, "etcd-master-1");
        assert!(summary.is_running());
        assert!(!summary.is_running_ready());

        let empty = PodSummary::from_pod(&Pod::default());
        assert_eq!(empty.phase, "Unknown");
        assert!(empty.ready);
    }

    #[test]
    fn test_bytes_to_mb() {
        assert_eq!(bytes_to_mb(100 * 1024 * 1024), 100.0);
        assert_eq!(bytes_to_mb(0), 0.0);
    }
}

//! 系统 Pod 探针
//!
//! 按标签列出系统组件的 Pod。DaemonSet 类组件以节点数为分母计算就绪比例，
//! Deployment 类组件以 Pod 总数为分母。

use crate::error::ProbeError;
use crate::health::cluster::ClusterHandle;
use crate::health::outcome::{elapsed_ms, CheckOutcome};
use crate::health::probe::{Probe, ProbeCategory, ProbeDescriptor};
use crate::health::target::{AddonSpec, ClusterTarget, EffectiveSettings};
use crate::probes::{PodSummary, SYSTEM_NAMESPACE};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams};
use serde::Serialize;
use std::time::Instant;

/// 已知组件的标签选择器
const LABEL_MAP: [(&str, &str); 4] = [
    ("Cilium CNI", "k8s-app=cilium"),
    ("Calico CNI", "k8s-app=calico-node"),
    ("CoreDNS", "k8s-app=kube-dns"),
    ("kube-proxy", "k8s-app=kube-proxy"),
];

/// 以 DaemonSet 方式部署的组件
const DAEMONSETS: [&str; 3] = ["Cilium CNI", "Calico CNI", "kube-proxy"];

/// 工作负载类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    DaemonSet,
    Deployment,
}

impl WorkloadKind {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "daemonset" => Some(WorkloadKind::DaemonSet),
            "deployment" => Some(WorkloadKind::Deployment),
            _ => None,
        }
    }
}

/// 组件名称对应的默认标签选择器，未知组件使用 `app=<小写名称>`
pub fn default_label(addon_name: &str) -> String {
    LABEL_MAP
        .iter()
        .find(|(name, _)| *name == addon_name)
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| format!("app={}", addon_name.to_lowercase()))
}

/// 组件名称对应的默认工作负载类型
pub fn default_workload(addon_name: &str) -> WorkloadKind {
    if DAEMONSETS.contains(&addon_name) {
        WorkloadKind::DaemonSet
    } else {
        WorkloadKind::Deployment
    }
}

/// 系统 Pod 分类规则
///
/// # 参数
/// * `name` - 组件名称
/// * `workload` - 工作负载类型
/// * `label` - 使用的标签选择器
/// * `pods` - 匹配到的 Pod
/// * `node_count` - 集群节点数，仅 DaemonSet 使用
///
/// # 返回
/// * DaemonSet：就绪数为 0 ⇒ critical，比例低于 100% ⇒ warning
/// * Deployment：没有 Pod 或就绪数为 0 ⇒ critical，部分就绪 ⇒ warning
pub fn classify_system_pods(
    name: &str,
    workload: WorkloadKind,
    label: &str,
    pods: &[PodSummary],
    node_count: usize,
) -> CheckOutcome {
    let total = pods.len();
    let ready = pods.iter().filter(|p| p.is_running_ready()).count();

    let outcome = match workload {
        WorkloadKind::DaemonSet => {
            let expected = if node_count == 0 { total } else { node_count };
            let ratio = if expected == 0 {
                0.0
            } else {
                ready as f64 / expected as f64 * 100.0
            };
            let message = format!("{name} {ready}/{expected} nodes ({ratio:.0}%)");
            let outcome = if ready == 0 {
                CheckOutcome::critical(message)
            } else if ready < expected {
                CheckOutcome::warning(message)
            } else {
                CheckOutcome::healthy(message)
            };
            outcome.with_detail("ratio_pct", (ratio * 10.0).round() / 10.0)
        }
        WorkloadKind::Deployment => {
            let outcome = if total == 0 {
                CheckOutcome::critical(format!("{name}: no pods found ({label})"))
            } else if ready == 0 {
                CheckOutcome::critical(format!("{name} {ready}/{total} Ready"))
            } else if ready < total {
                CheckOutcome::warning(format!("{name} {ready}/{total} Ready"))
            } else {
                CheckOutcome::healthy(format!("{name} {ready}/{total} Ready"))
            };
            let ratio = if total == 0 { 0.0 } else { ready as f64 / total as f64 * 100.0 };
            outcome.with_detail("ratio_pct", (ratio * 10.0).round() / 10.0)
        }
    };

    outcome
        .with_detail("ready_pods", ready)
        .with_detail("total_pods", total)
        .with_detail("total_nodes", node_count)
        .with_detail("kind", serde_json::to_value(workload).unwrap_or_default())
        .with_detail("label", label)
}

/// 系统 Pod 探针
pub struct SystemPodProbe {
    name: String,
    namespace: String,
    label: String,
    workload: WorkloadKind,
}

impl SystemPodProbe {
    pub const KIND: &'static str = "system-pod";

    pub fn descriptor() -> ProbeDescriptor {
        ProbeDescriptor::new(Self::KIND, ProbeCategory::Core, "System Pods")
            .with_description("Kubernetes System Components (CNI, DNS, kube-proxy)")
            .with_icon("📦")
    }

    pub fn new(target: &ClusterTarget, addon: &AddonSpec) -> Self {
        let settings = EffectiveSettings::resolve(target, addon);
        Self {
            name: addon.name.clone(),
            namespace: settings
                .str("namespace")
                .unwrap_or(SYSTEM_NAMESPACE)
                .to_string(),
            label: settings
                .str("label_selector")
                .map(str::to_string)
                .unwrap_or_else(|| default_label(&addon.name)),
            workload: settings
                .str("workload")
                .and_then(WorkloadKind::parse)
                .unwrap_or_else(|| default_workload(&addon.name)),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn workload(&self) -> WorkloadKind {
        self.workload
    }
}

#[async_trait]
impl Probe for SystemPodProbe {
    async fn check(&self, cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
        let start = Instant::now();
        let client = cluster.kube_client().await?;

        let pods: Api<Pod> = Api::namespaced(client.clone(), &self.namespace);
        let list = pods.list(&ListParams::default().labels(&self.label)).await?;
        let summaries: Vec<PodSummary> = list.items.iter().map(PodSummary::from_pod).collect();

        let node_count = match self.workload {
            WorkloadKind::DaemonSet => Api::<Node>::all(client).list(&ListParams::default()).await?.items.len(),
            WorkloadKind::Deployment => 0,
        };

        Ok(
            classify_system_pods(&self.name, self.workload, &self.label, &summaries, node_count)
                .with_detail("namespace", self.namespace.clone())
                .with_response_time_ms(elapsed_ms(start)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::outcome::Severity;

    fn ready_pods(ready: usize, not_ready: usize) -> Vec<PodSummary> {
        (0..ready)
            .map(|i| PodSummary::new(format!("ok-{i}"), "Running", true))
            .chain((0..not_ready).map(|i| PodSummary::new(format!("bad-{i}"), "Running", false)))
            .collect()
    }

    #[test]
    fn test_label_and_workload_defaults() {
        assert_eq!(default_label("CoreDNS"), "k8s-app=kube-dns");
        assert_eq!(default_label("Ingress Nginx"), "app=ingress nginx");
        assert_eq!(default_workload("kube-proxy"), WorkloadKind::DaemonSet);
        assert_eq!(default_workload("CoreDNS"), WorkloadKind::Deployment);

        let target = ClusterTarget::new("dev", "Dev", "https://10.0.0.1:6443");
        let addon = AddonSpec::new("dev", "Fluent Bit", SystemPodProbe::KIND)
            .with_setting("label_selector", "app.kubernetes.io/name=fluent-bit")
            .with_setting("workload", "DaemonSet");
        let probe = SystemPodProbe::new(&target, &addon);
        assert_eq!(probe.label(), "app.kubernetes.io/name=fluent-bit");
        assert_eq!(probe.workload(), WorkloadKind::DaemonSet);
    }

    #[test]
    fn test_cluster_namespace_does_not_move_system_pods() {
        let target = ClusterTarget::new("prod", "Production", "https://10.0.0.1:6443")
            .with_setting("namespace", "argocd")
            .with_setting("label_selector", "app=argocd-server");
        let addon = AddonSpec::new("prod", "CoreDNS", SystemPodProbe::KIND);

        let probe = SystemPodProbe::new(&target, &addon);
        assert_eq!(probe.namespace(), SYSTEM_NAMESPACE);
        assert_eq!(probe.label(), "k8s-app=kube-dns");

        let addon = addon.with_setting("namespace", "dns");
        assert_eq!(SystemPodProbe::new(&target, &addon).namespace(), "dns");
    }

    #[test]
    fn test_daemonset_ratio_against_nodes() {
        let outcome = classify_system_pods("kube-proxy", WorkloadKind::DaemonSet, "k8s-app=kube-proxy", &ready_pods(3, 0), 4);
        assert_eq!(outcome.severity, Severity::Warning);
        assert_eq!(outcome.message, "kube-proxy 3/4 nodes (75%)");

        let full = classify_system_pods("kube-proxy", WorkloadKind::DaemonSet, "k8s-app=kube-proxy", &ready_pods(4, 0), 4);
        assert_eq!(full.severity, Severity::Healthy);
        assert_eq!(full.detail_str("kind"), Some("daemonset"));

        let none = classify_system_pods("kube-proxy", WorkloadKind::DaemonSet, "k8s-app=kube-proxy", &ready_pods(0, 4), 4);
        assert_eq!(none.severity, Severity::Critical);
    }

    #[test]
    fn test_deployment_counts() {
        let ok = classify_system_pods("CoreDNS", WorkloadKind::Deployment, "k8s-app=kube-dns", &ready_pods(2, 0), 0);
        assert_eq!(ok.severity, Severity::Healthy);
        assert_eq!(ok.message, "CoreDNS 2/2 Ready");

        let partial = classify_system_pods("CoreDNS", WorkloadKind::Deployment, "k8s-app=kube-dns", &ready_pods(1, 1), 0);
        assert_eq!(partial.severity, Severity::Warning);

        let missing = classify_system_pods("CoreDNS", WorkloadKind::Deployment, "k8s-app=kube-dns", &[], 0);
        assert_eq!(missing.severity, Severity::Critical);
        assert_eq!(missing.detail_u64("total_pods"), Some(0));
    }
}

//! 节点探针
//!
//! 只调用一次节点列表接口，在内存中统计就绪状态和压力条件

use crate::error::ProbeError;
use crate::health::cluster::ClusterHandle;
use crate::health::outcome::{elapsed_ms, CheckOutcome};
use crate::health::probe::{Probe, ProbeCategory, ProbeDescriptor};
use crate::health::target::{AddonSpec, ClusterTarget};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use serde_json::json;
use std::time::Instant;

/// 需要关注的压力条件
pub const PRESSURE_CONDITIONS: [&str; 3] = ["DiskPressure", "MemoryPressure", "PIDPressure"];

const NOT_READY_LIMIT: usize = 20;
const ISSUE_LIMIT: usize = 50;

/// 单个节点的状态摘要
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSummary {
    pub name: String,
    pub ready: bool,
    /// 处于 True 状态的压力条件
    pub pressure: Vec<String>,
}

impl NodeSummary {
    pub fn new(name: impl Into<String>, ready: bool) -> Self {
        Self {
            name: name.into(),
            ready,
            pressure: Vec::new(),
        }
    }

    pub fn with_pressure(mut self, condition: impl Into<String>) -> Self {
        self.pressure.push(condition.into());
        self
    }

    pub fn from_node(node: &Node) -> Self {
        let name = node.metadata.name.clone().unwrap_or_else(|| "unknown".to_string());
        let conditions = node
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_deref())
            .unwrap_or_default();

        let is_true = |kind: &str| {
            conditions
                .iter()
                .any(|c| c.type_ == kind && c.status == "True")
        };

        Self {
            ready: is_true("Ready"),
            pressure: PRESSURE_CONDITIONS
                .iter()
                .filter(|kind| is_true(**kind))
                .map(|kind| kind.to_string())
                .collect(),
            name,
        }
    }
}

/// 节点分类规则
///
/// 存在节点但全部未就绪 ⇒ critical；部分未就绪或存在压力条件 ⇒ warning；
/// 没有任何节点 ⇒ critical。
pub fn classify_nodes(nodes: &[NodeSummary]) -> CheckOutcome {
    let total = nodes.len();
    let ready = nodes.iter().filter(|n| n.ready).count();
    let not_ready: Vec<&str> = nodes
        .iter()
        .filter(|n| !n.ready)
        .map(|n| n.name.as_str())
        .collect();
    let issues: Vec<_> = nodes
        .iter()
        .flat_map(|n| {
            n.pressure
                .iter()
                .map(move |reason| json!({ "node": n.name, "reason": reason }))
        })
        .collect();

    let outcome = if total == 0 {
        CheckOutcome::critical("No nodes found in cluster")
    } else if ready == 0 {
        CheckOutcome::critical(format!("All {total} nodes NotReady"))
    } else if !not_ready.is_empty() || !issues.is_empty() {
        CheckOutcome::warning(format!(
            "Nodes {ready}/{total} Ready, {} pressure issues",
            issues.len()
        ))
    } else {
        CheckOutcome::healthy(format!("All {total} nodes Ready"))
    };

    outcome
        .with_detail("total", total)
        .with_detail("ready", ready)
        .with_detail(
            "not_ready",
            not_ready.into_iter().take(NOT_READY_LIMIT).collect::<Vec<_>>(),
        )
        .with_detail(
            "issues",
            issues.into_iter().take(ISSUE_LIMIT).collect::<Vec<_>>(),
        )
}

/// 节点探针
pub struct NodeProbe;

impl NodeProbe {
    pub const KIND: &'static str = "node-check";

    pub fn descriptor() -> ProbeDescriptor {
        ProbeDescriptor::new(Self::KIND, ProbeCategory::Core, "Nodes")
            .with_description("Kubernetes Cluster Nodes")
            .with_icon("🖥️")
    }

    pub fn new(_target: &ClusterTarget, _addon: &AddonSpec) -> Self {
        Self
    }
}

#[async_trait]
impl Probe for NodeProbe {
    async fn check(&self, cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
        let start = Instant::now();
        let nodes: Api<Node> = Api::all(cluster.kube_client().await?);
        let list = nodes.list(&ListParams::default()).await?;

        let summaries: Vec<NodeSummary> = list.items.iter().map(NodeSummary::from_node).collect();
        Ok(classify_nodes(&summaries).with_response_time_ms(elapsed_ms(start)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::outcome::Severity;
    use k8s_openapi::api::core::v1::{NodeCondition, NodeStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn node(name: &str, conditions: &[(&str, &str)]) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                conditions: Some(
                    conditions
                        .iter()
                        .map(|(kind, status)| NodeCondition {
                            type_: kind.to_string(),
                            status: status.to_string(),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_summary_from_node_object() {
        let summary = NodeSummary::from_node(&node(
            "worker-1",
            &[("Ready", "True"), ("DiskPressure", "True"), ("MemoryPressure", "False")],
        ));
        assert!(summary.ready);
        assert_eq!(summary.pressure, vec!["DiskPressure"]);

        let unknown = NodeSummary::from_node(&Node::default());
        assert_eq!(unknown.name, "unknown");
        assert!(!unknown.ready);
    }

    #[test]
    fn test_partial_ready_is_warning() {
        let outcome = classify_nodes(&[
            NodeSummary::new("a", true),
            NodeSummary::new("b", true),
            NodeSummary::new("c", false),
        ]);
        assert_eq!(outcome.severity, Severity::Warning);
        assert!(outcome.message.contains("2/3"));
        assert_eq!(outcome.detail_u64("total"), Some(3));
        assert_eq!(outcome.detail_u64("ready"), Some(2));
    }

    #[test]
    fn test_all_not_ready_is_critical() {
        let outcome = classify_nodes(&[NodeSummary::new("a", false), NodeSummary::new("b", false)]);
        assert_eq!(outcome.severity, Severity::Critical);
        assert_eq!(outcome.message, "All 2 nodes NotReady");
    }

    #[test]
    fn test_pressure_is_warning_and_empty_is_critical() {
        let outcome = classify_nodes(&[
            NodeSummary::new("a", true).with_pressure("PIDPressure"),
            NodeSummary::new("b", true),
        ]);
        assert_eq!(outcome.severity, Severity::Warning);
        assert_eq!(outcome.message, "Nodes 2/2 Ready, 1 pressure issues");
        assert_eq!(outcome.detail("issues").unwrap()[0]["reason"], "PIDPressure");

        assert_eq!(classify_nodes(&[]).severity, Severity::Critical);
        assert_eq!(
            classify_nodes(&[NodeSummary::new("a", true)]).message,
            "All 1 nodes Ready"
        );
    }

    #[test]
    fn test_detail_lists_are_bounded() {
        let nodes: Vec<_> = (0..60)
            .map(|i| NodeSummary::new(format!("n{i}"), i == 0).with_pressure("DiskPressure"))
            .collect();
        let outcome = classify_nodes(&nodes);
        assert_eq!(outcome.detail("not_ready").unwrap().as_array().unwrap().len(), 20);
        assert_eq!(outcome.detail("issues").unwrap().as_array().unwrap().len(), 50);
    }
}

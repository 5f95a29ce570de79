//! etcd 探针
//!
//! 在 etcd Pod 内执行 `etcdctl endpoint status --write-out=json`，
//! 解析 leader、数据库大小和 raft 信息。无法 exec 或解析失败时退化为
//! 只依据 Pod 状态的低置信度结果。

use crate::error::ProbeError;
use crate::health::cluster::ClusterHandle;
use crate::health::outcome::{elapsed_ms, truncate, CheckOutcome, MESSAGE_TEXT_LIMIT};
use crate::health::probe::{Probe, ProbeCategory, ProbeDescriptor};
use crate::health::target::{AddonSpec, ClusterTarget, EffectiveSettings};
use crate::probes::{bytes_to_mb, PodSummary, SYSTEM_NAMESPACE};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams, ListParams};
use serde_json::Value;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// 数据库大小告警阈值（字节），超过即告警
pub const DB_SIZE_WARNING_BYTES: u64 = 100 * 1024 * 1024;

/// 完整 etcdctl 校验的置信度标记
pub const CONFIDENCE_ETCDCTL: &str = "etcdctl";

/// 只依据 Pod 状态的置信度标记
pub const CONFIDENCE_POD_STATUS: &str = "pod-status-only";

const DEFAULT_LABEL: &str = "component=etcd";
const ETCD_CONTAINER: &str = "etcd";

/// etcdctl 执行的命令
pub fn etcdctl_command() -> Vec<String> {
    [
        "etcdctl",
        "endpoint",
        "status",
        "--cacert=/etc/kubernetes/pki/etcd/ca.crt",
        "--cert=/etc/kubernetes/pki/etcd/server.crt",
        "--key=/etc/kubernetes/pki/etcd/server.key",
        "--write-out=json",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// `etcdctl endpoint status` 的解析结果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EtcdStatus {
    pub member_id: u64,
    pub leader_id: u64,
    pub db_size: u64,
    pub db_size_in_use: u64,
    pub version: String,
    pub raft_term: u64,
    pub raft_index: u64,
}

impl EtcdStatus {
    /// 本成员是否为 leader
    pub fn is_leader(&self) -> bool {
        self.member_id != 0 && self.member_id == self.leader_id
    }
}

/// 解析 etcdctl 的 JSON 输出（数组或单个对象）
pub fn parse_etcdctl_status(raw: &str) -> Result<EtcdStatus, ProbeError> {
    let data: Value = serde_json::from_str(raw.trim())
        .map_err(|e| ProbeError::Parse(format!("etcdctl output is not JSON: {e}")))?;

    let entry = match &data {
        Value::Array(items) => items
            .first()
            .ok_or_else(|| ProbeError::Parse("etcdctl returned an empty list".to_string()))?,
        Value::Object(_) => &data,
        _ => return Err(ProbeError::Parse("unexpected etcdctl output shape".to_string())),
    };

    let status = entry.get("Status").unwrap_or(entry);
    let number = |value: Option<&Value>| value.and_then(Value::as_u64).unwrap_or(0);

    Ok(EtcdStatus {
        member_id: number(status.pointer("/header/member_id")),
        leader_id: number(status.get("leader")),
        db_size: number(status.get("dbSize")),
        db_size_in_use: number(status.get("dbSizeInUse")),
        version: status
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        raft_term: number(status.get("raftTerm")),
        raft_index: number(status.get("raftIndex")),
    })
}

/// 依据解析成功的 etcdctl 状态分类
///
/// 数据库大小严格大于 100MB ⇒ warning，否则 healthy。
pub fn classify_etcd_status(status: &EtcdStatus, pod_name: &str, pods: &[PodSummary]) -> CheckOutcome {
    let db_size_mb = bytes_to_mb(status.db_size);

    let outcome = if status.db_size > DB_SIZE_WARNING_BYTES {
        CheckOutcome::warning(format!("etcd DB large ({db_size_mb}MB)"))
    } else {
        let role = if status.is_leader() { "Leader" } else { "Follower" };
        CheckOutcome::healthy(format!(
            "etcd {role} healthy - v{}, DB: {db_size_mb}MB, Term: {}",
            status.version, status.raft_term
        ))
    };

    outcome
        .with_detail("confidence", CONFIDENCE_ETCDCTL)
        .with_detail("pod_name", pod_name)
        .with_detail("is_leader", status.is_leader())
        .with_detail("leader_id", status.leader_id.to_string())
        .with_detail("member_id", status.member_id.to_string())
        .with_detail("version", status.version.clone())
        .with_detail("db_size_mb", db_size_mb)
        .with_detail("db_size_in_use_mb", bytes_to_mb(status.db_size_in_use))
        .with_detail("raft_term", status.raft_term)
        .with_detail("raft_index", status.raft_index)
        .with_detail("member_count", pods.len())
        .with_detail("pods", pods_value(pods))
}

/// 无法使用 etcdctl 时只依据 Pod 状态分类
///
/// 全部 Pod 未就绪 ⇒ critical；否则最多为 warning，并标记低置信度。
pub fn classify_pod_status_only(pods: &[PodSummary], pod_name: &str, reason: &str) -> CheckOutcome {
    let members = pods.len();
    let ready = pods.iter().filter(|p| p.ready).count();
    let all_running = pods.iter().all(PodSummary::is_running);

    let outcome = if ready == 0 {
        CheckOutcome::critical(format!("etcd pods not ready ({members} members) - exec unavailable"))
    } else {
        let state = if all_running && ready == members { "running" } else { "mixed" };
        CheckOutcome::warning(format!(
            "etcd pods {state} ({ready}/{members} ready) - exec unavailable, status unverified"
        ))
    };

    outcome
        .with_detail("confidence", CONFIDENCE_POD_STATUS)
        .with_detail("pod_name", pod_name)
        .with_detail("member_count", members)
        .with_detail("pods", pods_value(pods))
        .with_detail("exec_error", truncate(reason, MESSAGE_TEXT_LIMIT))
}

/// Pod 列表层面的前置检查：没有 Pod 或没有运行中的 Pod ⇒ critical
pub fn classify_etcd_pods(pods: &[PodSummary]) -> Result<&PodSummary, CheckOutcome> {
    if pods.is_empty() {
        return Err(CheckOutcome::critical(format!("No etcd pods found in {SYSTEM_NAMESPACE}"))
            .with_detail("error", "no_etcd_pods"));
    }
    pods.iter().find(|p| p.is_running()).ok_or_else(|| {
        CheckOutcome::critical("No running etcd pods found").with_detail("pods", pods_value(pods))
    })
}

fn pods_value(pods: &[PodSummary]) -> Value {
    serde_json::to_value(pods).unwrap_or(Value::Null)
}

/// etcd 探针
pub struct EtcdProbe {
    namespace: String,
    label_selector: String,
}

impl EtcdProbe {
    pub const KIND: &'static str = "etcd-leader";

    pub fn descriptor() -> ProbeDescriptor {
        ProbeDescriptor::new(Self::KIND, ProbeCategory::Core, "etcd")
            .with_description("etcd Distributed Key-Value Store")
            .with_icon("💾")
    }

    pub fn new(target: &ClusterTarget, addon: &AddonSpec) -> Self {
        let settings = EffectiveSettings::resolve(target, addon);
        Self {
            namespace: settings
                .str("etcd_namespace")
                .unwrap_or(SYSTEM_NAMESPACE)
                .to_string(),
            label_selector: settings
                .str("etcd_label_selector")
                .unwrap_or(DEFAULT_LABEL)
                .to_string(),
        }
    }

    async fn exec_etcdctl(&self, pods: &Api<Pod>, pod_name: &str) -> Result<EtcdStatus, ProbeError> {
        let params = AttachParams::default().container(ETCD_CONTAINER).stderr(false);
        let mut attached = pods.exec(pod_name, etcdctl_command(), &params).await?;

        let mut stdout = attached
            .stdout()
            .ok_or_else(|| ProbeError::Unavailable("exec stdout stream unavailable".to_string()))?;
        let mut output = String::new();
        stdout
            .read_to_string(&mut output)
            .await
            .map_err(|e| ProbeError::Command {
                program: "etcdctl".to_string(),
                message: e.to_string(),
            })?;
        drop(stdout);

        if let Err(e) = attached.join().await {
            debug!("etcdctl exec 会话结束异常: {}", e);
        }

        parse_etcdctl_status(&output)
    }
}

#[async_trait]
impl Probe for EtcdProbe {
    async fn check(&self, cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
        let start = Instant::now();
        let pods: Api<Pod> = Api::namespaced(cluster.kube_client().await?, &self.namespace);
        let list = pods
            .list(&ListParams::default().labels(&self.label_selector))
            .await?;

        let summaries: Vec<PodSummary> = list.items.iter().map(PodSummary::from_pod).collect();
        let target_pod = match classify_etcd_pods(&summaries) {
            Ok(pod) => pod.name.clone(),
            Err(outcome) => return Ok(outcome.with_response_time_ms(elapsed_ms(start))),
        };

        let outcome = match self.exec_etcdctl(&pods, &target_pod).await {
            Ok(status) => classify_etcd_status(&status, &target_pod, &summaries),
            Err(e) => {
                warn!("etcdctl 不可用，退化为 Pod 状态检测: {}", e);
                classify_pod_status_only(&summaries, &target_pod, &e.to_string())
            }
        };
        Ok(outcome.with_response_time_ms(elapsed_ms(start)))
    }
}

//! 控制平面探针
//!
//! API 服务器 `/livez` 延迟加上调度器、控制器管理器的 Pod 就绪数

use crate::error::ProbeError;
use crate::health::aggregator::aggregate;
use crate::health::cluster::ClusterHandle;
use crate::health::outcome::{elapsed_ms, truncate, CheckOutcome, Severity, DETAIL_TEXT_LIMIT};
use crate::health::probe::{Probe, ProbeCategory, ProbeDescriptor};
use crate::health::target::{AddonSpec, ClusterTarget, EffectiveSettings};
use crate::probes::api_server::EndpointResult;
use crate::probes::{PodSummary, SYSTEM_NAMESPACE};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

/// `/livez` 延迟告警阈值（毫秒）
pub const LATENCY_WARNING_MS: u64 = 3000;

/// 控制平面组件及其 Pod 标签
pub const COMPONENTS: [(&str, &str); 2] = [
    ("Scheduler", "component=kube-scheduler"),
    ("Controller Manager", "component=kube-controller-manager"),
];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// 一个组件的 Pod 统计
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentCount {
    pub name: String,
    pub ready: usize,
    pub total: usize,
}

impl ComponentCount {
    pub fn new(name: impl Into<String>, ready: usize, total: usize) -> Self {
        Self {
            name: name.into(),
            ready,
            total,
        }
    }

    pub fn from_pods(name: impl Into<String>, pods: &[PodSummary]) -> Self {
        Self::new(
            name,
            pods.iter().filter(|p| p.is_running_ready()).count(),
            pods.len(),
        )
    }

    /// 没有 Pod ⇒ critical，部分就绪 ⇒ warning
    pub fn severity(&self) -> Severity {
        if self.total == 0 {
            Severity::Critical
        } else if self.ready < self.total {
            Severity::Warning
        } else {
            Severity::Healthy
        }
    }
}

/// `/livez` 结果的分级
pub fn livez_severity(result: &EndpointResult) -> Severity {
    match result {
        EndpointResult::Response {
            status_code: 200,
            response_time_ms,
            ..
        } if *response_time_ms > LATENCY_WARNING_MS => Severity::Warning,
        EndpointResult::Response { status_code: 200, .. } => Severity::Healthy,
        EndpointResult::Response { status_code, .. } if *status_code < 500 => Severity::Warning,
        _ => Severity::Critical,
    }
}

/// 控制平面分类规则：API 服务器与各组件中最差的状态
pub fn classify_control_plane(livez: &EndpointResult, components: &[ComponentCount]) -> CheckOutcome {
    let api_severity = livez_severity(livez);
    let mut entries = vec![match livez {
        EndpointResult::Response {
            status_code,
            response_time_ms,
            ..
        } => json!({
            "name": "API Server",
            "status": api_severity,
            "status_code": status_code,
            "latency_ms": response_time_ms,
        }),
        EndpointResult::Timeout => json!({ "name": "API Server", "status": api_severity, "error": "Timeout" }),
        EndpointResult::Failed(error) => json!({
            "name": "API Server",
            "status": api_severity,
            "error": truncate(error, DETAIL_TEXT_LIMIT),
        }),
    }];
    entries.extend(components.iter().map(|c| {
        json!({ "name": c.name, "status": c.severity(), "ready": c.ready, "total": c.total })
    }));

    let severities: Vec<Severity> = std::iter::once(api_severity)
        .chain(components.iter().map(ComponentCount::severity))
        .collect();
    let healthy = severities.iter().filter(|s| s.is_healthy()).count();
    let overall = aggregate(severities.iter().copied());

    let (api_text, latency) = match livez {
        EndpointResult::Response { response_time_ms, .. } => {
            (format!("API {response_time_ms}ms"), Value::from(*response_time_ms))
        }
        EndpointResult::Timeout => ("API timeout".to_string(), Value::Null),
        EndpointResult::Failed(_) => ("API unreachable".to_string(), Value::Null),
    };

    let outcome = CheckOutcome::new(
        overall,
        format!("Control Plane {healthy}/{} healthy, {api_text}", severities.len()),
    )
    .with_detail("components", entries)
    .with_detail("api_latency_ms", latency.clone());
    match latency.as_u64() {
        Some(ms) => outcome.with_response_time_ms(ms),
        None => outcome,
    }
}

/// 控制平面探针
pub struct ControlPlaneProbe {
    base_url: String,
    token: Option<String>,
}

impl ControlPlaneProbe {
    pub const KIND: &'static str = "control-plane";

    pub fn descriptor() -> ProbeDescriptor {
        ProbeDescriptor::new(Self::KIND, ProbeCategory::Core, "Control Plane")
            .with_description("Kubernetes Control Plane Components")
            .with_icon("🎛️")
    }

    pub fn new(target: &ClusterTarget, addon: &AddonSpec) -> Self {
        let settings = EffectiveSettings::resolve(target, addon);
        Self {
            base_url: target.api_base().to_string(),
            token: settings.first_str(&["token", "api_token"]).map(str::to_string),
        }
    }

    async fn livez(&self, cluster: &ClusterHandle) -> EndpointResult {
        let mut request = cluster
            .http()
            .get(format!("{}/livez", self.base_url))
            .timeout(REQUEST_TIMEOUT);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let start = Instant::now();
        match request.send().await {
            Ok(response) => EndpointResult::Response {
                status_code: response.status().as_u16(),
                response_time_ms: elapsed_ms(start),
                body: String::new(),
            },
            Err(e) if e.is_timeout() => EndpointResult::Timeout,
            Err(e) => EndpointResult::Failed(e.to_string()),
        }
    }
}

#[async_trait]
impl Probe for ControlPlaneProbe {
    async fn check(&self, cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
        let livez = self.livez(cluster).await;

        let pods: Api<Pod> = Api::namespaced(cluster.kube_client().await?, SYSTEM_NAMESPACE);
        let mut components = Vec::with_capacity(COMPONENTS.len());
        for (name, label) in COMPONENTS {
            let list = pods.list(&ListParams::default().labels(label)).await?;
            let summaries: Vec<PodSummary> = list.items.iter().map(PodSummary::from_pod).collect();
            components.push(ComponentCount::from_pods(name, &summaries));
        }

        Ok(classify_control_plane(&livez, &components))
    }
}

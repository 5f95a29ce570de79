//! ArgoCD 探针
//!
//! 列出 `argoproj.io/v1alpha1` 的 Application 资源，统计同步和健康状态

use crate::error::ProbeError;
use crate::health::cluster::ClusterHandle;
use crate::health::outcome::{elapsed_ms, CheckOutcome};
use crate::health::probe::{Probe, ProbeCategory, ProbeDescriptor};
use crate::health::target::{AddonSpec, ClusterTarget, EffectiveSettings};
use async_trait::async_trait;
use kube::api::{Api, ApiResource, DynamicObject, ListParams};
use kube::core::GroupVersionKind;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;

/// 默认命名空间
pub const DEFAULT_NAMESPACE: &str = "argocd";

const PROBLEM_APP_LIMIT: usize = 10;

/// 一个 Application 的同步与健康状态
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppStatus {
    pub name: String,
    pub sync: String,
    pub health: String,
}

impl AppStatus {
    pub fn new(name: impl Into<String>, sync: impl Into<String>, health: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sync: sync.into(),
            health: health.into(),
        }
    }

    pub fn from_object(app: &DynamicObject) -> Self {
        let field = |pointer: &str| {
            app.data
                .pointer(pointer)
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string()
        };
        Self {
            name: app.metadata.name.clone().unwrap_or_default(),
            sync: field("/status/sync/status"),
            health: field("/status/health/status"),
        }
    }

    fn is_problem(&self) -> bool {
        self.sync != "Synced" || !matches!(self.health.as_str(), "Healthy" | "Progressing")
    }
}

/// ArgoCD 分类规则
///
/// 任一 Degraded ⇒ critical；任一 OutOfSync 或 Missing ⇒ warning；否则 healthy。
pub fn classify_argocd(apps: &[AppStatus]) -> CheckOutcome {
    let total = apps.len();
    let count = |matches: fn(&AppStatus) -> bool| apps.iter().filter(|a| matches(a)).count();
    let synced = count(|a| a.sync == "Synced");
    let out_of_sync = count(|a| a.sync == "OutOfSync");
    let healthy = count(|a| a.health == "Healthy");
    let degraded = count(|a| a.health == "Degraded");
    let missing = count(|a| a.health == "Missing");
    let progressing = count(|a| a.health == "Progressing");

    let outcome = if degraded > 0 {
        CheckOutcome::critical(format!(
            "ArgoCD: {degraded} degraded, {out_of_sync} out-of-sync (total {total})"
        ))
    } else if out_of_sync > 0 || missing > 0 {
        CheckOutcome::warning(format!(
            "ArgoCD: {out_of_sync} out-of-sync, {missing} missing (total {total})"
        ))
    } else {
        CheckOutcome::healthy(format!("ArgoCD: {total} apps all synced & healthy"))
    };

    let problems: Vec<&AppStatus> = apps
        .iter()
        .filter(|a| a.is_problem())
        .take(PROBLEM_APP_LIMIT)
        .collect();

    outcome
        .with_detail("total", total)
        .with_detail("synced", synced)
        .with_detail("out_of_sync", out_of_sync)
        .with_detail("healthy", healthy)
        .with_detail("degraded", degraded)
        .with_detail("missing", missing)
        .with_detail("progressing", progressing)
        .with_detail("problem_apps", serde_json::to_value(problems).unwrap_or_default())
}

/// Application 资源定义
pub fn application_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk("argoproj.io", "v1alpha1", "Application");
    ApiResource::from_gvk_with_plural(&gvk, "applications")
}

/// ArgoCD 探针
pub struct ArgoCdProbe {
    namespace: String,
}

impl ArgoCdProbe {
    pub const KIND: &'static str = "argocd";

    pub fn descriptor() -> ProbeDescriptor {
        ProbeDescriptor::new(Self::KIND, ProbeCategory::Cicd, "ArgoCD")
            .with_description("ArgoCD GitOps Applications")
            .with_icon("🐙")
    }

    pub fn new(target: &ClusterTarget, addon: &AddonSpec) -> Self {
        let settings = EffectiveSettings::resolve(target, addon);
        Self {
            namespace: settings
                .first_str(&["namespace", "argocd_namespace"])
                .unwrap_or(DEFAULT_NAMESPACE)
                .to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl Probe for ArgoCdProbe {
    async fn check(&self, cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
        let start = Instant::now();
        let resource = application_resource();
        let apps: Api<DynamicObject> =
            Api::namespaced_with(cluster.kube_client().await?, &self.namespace, &resource);
        let list = apps.list(&ListParams::default()).await?;

        let statuses: Vec<AppStatus> = list.items.iter().map(AppStatus::from_object).collect();
        Ok(classify_argocd(&statuses)
            .with_detail("namespace", self.namespace.clone())
            .with_response_time_ms(elapsed_ms(start)))
    }
}

//! Nexus 仓库探针

use crate::error::ProbeError;
use crate::health::cluster::ClusterHandle;
use crate::health::outcome::{elapsed_ms, CheckOutcome};
use crate::health::probe::{Probe, ProbeCategory, ProbeDescriptor};
use crate::health::target::{AddonSpec, ClusterTarget, EffectiveSettings};
use crate::probes::service_url;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// 默认地址
pub const DEFAULT_URL: &str = "http://nexus.devops.svc:8081";

const WRITABLE_PATH: &str = "/service/rest/v1/status/writable";
const STATUS_PATH: &str = "/service/rest/v1/status";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// 两个状态接口的结果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NexusStatus {
    /// 可写接口返回码，请求失败为 0
    pub writable_status_code: u16,
    /// 系统状态接口返回码，请求失败为 0
    pub system_status_code: u16,
    /// 系统状态接口是否可达
    pub reachable: bool,
}

impl NexusStatus {
    pub fn writable(&self) -> bool {
        self.writable_status_code == 200
    }

    /// available、unavailable 或 unreachable
    pub fn system_status(&self) -> &'static str {
        match (self.reachable, self.system_status_code) {
            (false, _) => "unreachable",
            (true, 200) => "available",
            (true, _) => "unavailable",
        }
    }
}

/// Nexus 分类规则：可写 ⇒ healthy，可用但只读 ⇒ warning，其余 ⇒ critical
pub fn classify_nexus(url: &str, status: &NexusStatus, elapsed_ms: u64) -> CheckOutcome {
    let outcome = if status.writable() {
        CheckOutcome::healthy(format!("Nexus writable & available ({elapsed_ms}ms)"))
    } else if status.system_status() == "available" {
        CheckOutcome::warning("Nexus available but Read-Only (disk full?)")
    } else {
        CheckOutcome::critical(format!(
            "Nexus unreachable or down (system: {})",
            status.system_status()
        ))
    };

    outcome
        .with_detail("writable", status.writable())
        .with_detail("writable_status_code", status.writable_status_code)
        .with_detail("system_status", status.system_status())
        .with_detail("system_status_code", status.system_status_code)
        .with_detail("url", url)
        .with_response_time_ms(elapsed_ms)
}

/// Nexus 探针
pub struct NexusProbe {
    url: String,
}

impl NexusProbe {
    pub const KIND: &'static str = "nexus";

    pub fn descriptor() -> ProbeDescriptor {
        ProbeDescriptor::new(Self::KIND, ProbeCategory::Cicd, "Nexus")
            .with_description("Sonatype Nexus Repository")
            .with_icon("🗃️")
    }

    pub fn new(target: &ClusterTarget, addon: &AddonSpec) -> Self {
        let settings = EffectiveSettings::resolve(target, addon);
        Self {
            url: service_url(&settings, "nexus_url", DEFAULT_URL),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn status_code(&self, cluster: &ClusterHandle, path: &str) -> Option<u16> {
        cluster
            .http()
            .get(format!("{}{}", self.url, path))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .ok()
            .map(|response| response.status().as_u16())
    }
}

#[async_trait]
impl Probe for NexusProbe {
    async fn check(&self, cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
        let start = Instant::now();
        let writable = self.status_code(cluster, WRITABLE_PATH).await;
        let system = self.status_code(cluster, STATUS_PATH).await;

        let status = NexusStatus {
            writable_status_code: writable.unwrap_or(0),
            system_status_code: system.unwrap_or(0),
            reachable: system.is_some(),
        };
        Ok(classify_nexus(&self.url, &status, elapsed_ms(start)))
    }

    fn timeout(&self) -> Option<Duration> {
        Some(REQUEST_TIMEOUT * 2 + Duration::from_secs(2))
    }
}

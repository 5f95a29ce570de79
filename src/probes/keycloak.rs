//! Keycloak 探针
//!
//! 请求 `/health/ready`，解析整体状态和数据库检查项

use crate::error::ProbeError;
use crate::health::cluster::ClusterHandle;
use crate::health::outcome::{elapsed_ms, truncate, CheckOutcome, MESSAGE_TEXT_LIMIT};
use crate::health::probe::{Probe, ProbeCategory, ProbeDescriptor};
use crate::health::target::{AddonSpec, ClusterTarget, EffectiveSettings};
use crate::probes::service_url;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// 默认地址
pub const DEFAULT_URL: &str = "http://keycloak.auth.svc:8080";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// 单个就绪检查项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessCheck {
    #[serde(default = "unknown_field")]
    pub name: String,
    #[serde(default = "unknown_field")]
    pub status: String,
}

fn unknown_field() -> String {
    "?".to_string()
}

/// `/health/ready` 响应体
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Readiness {
    #[serde(default = "up")]
    pub status: String,
    #[serde(default)]
    pub checks: Vec<ReadinessCheck>,
}

fn up() -> String {
    "UP".to_string()
}

impl Readiness {
    /// 解析响应体，无法解析时视为 UP
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_else(|_| Self {
            status: up(),
            checks: Vec::new(),
        })
    }

    /// 名称包含 database 或 db 的检查项状态
    pub fn db_status(&self) -> &str {
        self.checks
            .iter()
            .find(|c| {
                let name = c.name.to_lowercase();
                name.contains("database") || name.contains("db")
            })
            .map(|c| c.status.as_str())
            .unwrap_or("unknown")
    }
}

/// Keycloak 分类规则
///
/// 200 且 UP ⇒ healthy；200 但非 UP ⇒ warning；非 200 ⇒ critical。
pub fn classify_keycloak(url: &str, status_code: u16, readiness: Option<&Readiness>) -> CheckOutcome {
    let ready = status_code == 200;
    let overall = match (ready, readiness) {
        (true, Some(r)) => r.status.clone(),
        (true, None) => up(),
        (false, _) => "DOWN".to_string(),
    };
    let db_status = readiness.filter(|_| ready).map_or("unknown", Readiness::db_status);

    let outcome = if ready && overall == "UP" {
        CheckOutcome::healthy(format!("Keycloak ready (DB: {db_status})"))
    } else if ready {
        CheckOutcome::warning(format!("Keycloak partially ready (status: {overall})"))
    } else {
        CheckOutcome::critical(format!("Keycloak not ready (HTTP {status_code})"))
    };

    let checks = readiness
        .filter(|_| ready)
        .map(|r| serde_json::to_value(&r.checks).unwrap_or_default())
        .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));

    outcome
        .with_detail("ready", ready)
        .with_detail("status_code", status_code)
        .with_detail("overall_status", overall)
        .with_detail("db_status", db_status)
        .with_detail("checks", checks)
        .with_detail("url", url)
}

/// Keycloak 探针
pub struct KeycloakProbe {
    url: String,
}

impl KeycloakProbe {
    pub const KIND: &'static str = "keycloak";

    pub fn descriptor() -> ProbeDescriptor {
        ProbeDescriptor::new(Self::KIND, ProbeCategory::Security, "Keycloak")
            .with_description("Keycloak Identity and Access Management")
            .with_icon("🔐")
    }

    pub fn new(target: &ClusterTarget, addon: &AddonSpec) -> Self {
        let settings = EffectiveSettings::resolve(target, addon);
        Self {
            url: service_url(&settings, "keycloak_url", DEFAULT_URL),
        }
    }
}

#[async_trait]
impl Probe for KeycloakProbe {
    async fn check(&self, cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
        let start = Instant::now();
        let response = match cluster
            .http()
            .get(format!("{}/health/ready", self.url))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let error = e.to_string();
                return Ok(
                    CheckOutcome::critical(format!("Keycloak unreachable: {}", truncate(&error, 100)))
                        .with_detail("url", self.url.clone())
                        .with_detail("error", if e.is_timeout() { "Timeout".to_string() } else { truncate(&error, MESSAGE_TEXT_LIMIT) })
                        .with_response_time_ms(elapsed_ms(start)),
                );
            }
        };

        let status_code = response.status().as_u16();
        let elapsed = elapsed_ms(start);
        let readiness = if status_code == 200 {
            Some(Readiness::parse(&response.text().await.unwrap_or_default()))
        } else {
            None
        };

        Ok(classify_keycloak(&self.url, status_code, readiness.as_ref()).with_response_time_ms(elapsed))
    }

    fn timeout(&self) -> Option<Duration> {
        Some(REQUEST_TIMEOUT + Duration::from_secs(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::outcome::Severity;

    #[test]
    fn test_readiness_parsing() {
        let readiness = Readiness::parse(
            r#"{"status":"UP","checks":[{"name":"Keycloak database connections health check","status":"UP"}]}"#,
        );
        assert_eq!(readiness.db_status(), "UP");
        assert_eq!(Readiness::parse("not json").status, "UP");
        assert_eq!(Readiness::parse("{}").db_status(), "unknown");
    }

    #[test]
    fn test_classification() {
        let up = Readiness::parse(r#"{"status":"UP","checks":[{"name":"db","status":"UP"}]}"#);
        let outcome = classify_keycloak(DEFAULT_URL, 200, Some(&up));
        assert_eq!(outcome.severity, Severity::Healthy);
        assert_eq!(outcome.message, "Keycloak ready (DB: UP)");

        let down = Readiness::parse(r#"{"status":"DOWN","checks":[{"name":"db","status":"DOWN"}]}"#);
        let outcome = classify_keycloak(DEFAULT_URL, 200, Some(&down));
        assert_eq!(outcome.severity, Severity::Warning);
        assert_eq!(outcome.message, "Keycloak partially ready (status: DOWN)");

        let outcome = classify_keycloak(DEFAULT_URL, 503, None);
        assert_eq!(outcome.severity, Severity::Critical);
        assert_eq!(outcome.message, "Keycloak not ready (HTTP 503)");
        assert_eq!(outcome.detail_str("overall_status"), Some("DOWN"));
    }

    #[tokio::test]
    async fn test_probe_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health/ready")
            .with_status(200)
            .with_body(r#"{"status":"UP","checks":[]}"#)
            .create_async()
            .await;

        let target = ClusterTarget::new("dev", "Dev", "https://10.0.0.1:6443");
        let addon = AddonSpec::new("dev", "Keycloak", KeycloakProbe::KIND).with_setting("url", server.url());
        let probe = KeycloakProbe::new(&target, &addon);
        let handle = ClusterHandle::new(target, reqwest::Client::new());

        let outcome = probe.check(&handle).await.unwrap();
        assert_eq!(outcome.severity, Severity::Healthy);
        assert_eq!(outcome.message, "Keycloak ready (DB: unknown)");
        mock.assert_async().await;
    }
}

//! Jenkins 探针
//!
//! 读取 `/api/json` 的运行模式、quietingDown 和执行器数量，
//! 以及 `/queue/api/json` 的排队任务数

use crate::error::ProbeError;
use crate::health::cluster::ClusterHandle;
use crate::health::outcome::{elapsed_ms, truncate, CheckOutcome, MESSAGE_TEXT_LIMIT};
use crate::health::probe::{Probe, ProbeCategory, ProbeDescriptor};
use crate::health::target::{AddonSpec, ClusterTarget, EffectiveSettings};
use crate::probes::service_url;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

/// 默认地址
pub const DEFAULT_URL: &str = "http://jenkins.devops.svc:8080";

/// 排队任务告警阈值
pub const QUEUE_WARNING_ITEMS: usize = 20;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const QUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// `/api/json` 中关心的字段
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JenkinsStatus {
    #[serde(default = "unknown_mode")]
    pub mode: String,
    #[serde(default)]
    pub quieting_down: bool,
    #[serde(default)]
    pub num_executors: u64,
    #[serde(default)]
    pub node_description: String,
    #[serde(skip)]
    pub queue_items: usize,
}

fn unknown_mode() -> String {
    "UNKNOWN".to_string()
}

/// Jenkins 分类规则
///
/// NORMAL 且未进入 quietingDown ⇒ healthy，排队超过 20 ⇒ warning；
/// quietingDown ⇒ warning；其他模式 ⇒ critical。
pub fn classify_jenkins(url: &str, status: &JenkinsStatus) -> CheckOutcome {
    let outcome = if status.mode == "NORMAL" && !status.quieting_down {
        if status.queue_items > QUEUE_WARNING_ITEMS {
            CheckOutcome::warning(format!("Jenkins queue backed up ({} items)", status.queue_items))
        } else {
            CheckOutcome::healthy(format!(
                "Jenkins Normal - Executors: {}, Queue: {}",
                status.num_executors, status.queue_items
            ))
        }
    } else if status.quieting_down {
        CheckOutcome::warning("Jenkins quieting down (preparing shutdown)")
    } else {
        CheckOutcome::critical(format!("Jenkins mode: {}", status.mode))
    };

    outcome
        .with_detail("mode", status.mode.clone())
        .with_detail("quieting_down", status.quieting_down)
        .with_detail("num_executors", status.num_executors)
        .with_detail("queue_items", status.queue_items)
        .with_detail("node_description", truncate(&status.node_description, MESSAGE_TEXT_LIMIT))
        .with_detail("url", url)
}

/// Jenkins 探针
pub struct JenkinsProbe {
    url: String,
    credentials: Option<(String, String)>,
}

impl JenkinsProbe {
    pub const KIND: &'static str = "jenkins";

    pub fn descriptor() -> ProbeDescriptor {
        ProbeDescriptor::new(Self::KIND, ProbeCategory::Cicd, "Jenkins")
            .with_description("Jenkins CI Server")
            .with_icon("🤵")
    }

    pub fn new(target: &ClusterTarget, addon: &AddonSpec) -> Self {
        let settings = EffectiveSettings::resolve(target, addon);
        let credentials = match (settings.str("username"), settings.str("api_token")) {
            (Some(user), Some(token)) => Some((user.to_string(), token.to_string())),
            _ => None,
        };
        Self {
            url: service_url(&settings, "jenkins_url", DEFAULT_URL),
            credentials,
        }
    }

    fn get(&self, cluster: &ClusterHandle, path: &str, timeout: Duration) -> reqwest::RequestBuilder {
        let request = cluster
            .http()
            .get(format!("{}{}", self.url, path))
            .timeout(timeout);
        match &self.credentials {
            Some((user, token)) => request.basic_auth(user, Some(token)),
            None => request,
        }
    }

    /// 排队任务数，失败时按 0 处理
    async fn queue_items(&self, cluster: &ClusterHandle) -> usize {
        let response = match self.get(cluster, "/queue/api/json", QUEUE_TIMEOUT).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!("Jenkins 队列接口返回 {}", response.status());
                return 0;
            }
            Err(e) => {
                debug!("Jenkins 队列接口请求失败: {}", e);
                return 0;
            }
        };
        response
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| v.get("items").and_then(Value::as_array).map(Vec::len))
            .unwrap_or(0)
    }
}

#[async_trait]
impl Probe for JenkinsProbe {
    async fn check(&self, cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
        let start = Instant::now();
        let response = match self.get(cluster, "/api/json", REQUEST_TIMEOUT).send().await {
            Ok(response) => response,
            Err(e) => {
                let error = e.to_string();
                return Ok(
                    CheckOutcome::critical(format!("Jenkins unreachable: {}", truncate(&error, 100)))
                        .with_detail("url", self.url.clone())
                        .with_detail("error", if e.is_timeout() { "Timeout".to_string() } else { truncate(&error, MESSAGE_TEXT_LIMIT) })
                        .with_response_time_ms(elapsed_ms(start)),
                );
            }
        };

        let code = response.status();
        if !code.is_success() {
            return Ok(CheckOutcome::critical(format!("Jenkins returned {}", code.as_u16()))
                .with_detail("url", self.url.clone())
                .with_detail("status_code", code.as_u16())
                .with_response_time_ms(elapsed_ms(start)));
        }

        let mut status: JenkinsStatus = response.json().await?;
        let elapsed = elapsed_ms(start);
        status.queue_items = self.queue_items(cluster).await;

        Ok(classify_jenkins(&self.url, &status).with_response_time_ms(elapsed))
    }

    fn timeout(&self) -> Option<Duration> {
        Some(REQUEST_TIMEOUT + QUEUE_TIMEOUT + Duration::from_secs(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::outcome::Severity;

    fn status(mode: &str, quieting_down: bool, queue_items: usize) -> JenkinsStatus {
        JenkinsStatus {
            mode: mode.to_string(),
            quieting_down,
            num_executors: 4,
            node_description: "the master Jenkins node".to_string(),
            queue_items,
        }
    }

    #[test]
    fn test_mode_and_queue_classification() {
        let url = DEFAULT_URL;
        let normal = classify_jenkins(url, &status("NORMAL", false, 3));
        assert_eq!(normal.severity, Severity::Healthy);
        assert_eq!(normal.message, "Jenkins Normal - Executors: 4, Queue: 3");

        assert_eq!(classify_jenkins(url, &status("NORMAL", false, 20)).severity, Severity::Healthy);
        let backed_up = classify_jenkins(url, &status("NORMAL", false, 21));
        assert_eq!(backed_up.severity, Severity::Warning);
        assert_eq!(backed_up.message, "Jenkins queue backed up (21 items)");

        assert_eq!(classify_jenkins(url, &status("NORMAL", true, 0)).severity, Severity::Warning);
        let exclusive = classify_jenkins(url, &status("EXCLUSIVE", false, 0));
        assert_eq!(exclusive.severity, Severity::Critical);
        assert_eq!(exclusive.message, "Jenkins mode: EXCLUSIVE");
    }

    #[test]
    fn test_status_deserialization_defaults() {
        let parsed: JenkinsStatus = serde_json::from_str(r#"{"numExecutors": 2}"#).unwrap();
        assert_eq!(parsed.mode, "UNKNOWN");
        assert!(!parsed.quieting_down);
        assert_eq!(parsed.num_executors, 2);
    }

    #[tokio::test]
    async fn test_probe_with_basic_auth_and_queue() {
        let mut server = mockito::Server::new_async().await;
        // admin:secret
        let auth = "Basic YWRtaW46c2VjcmV0";
        let api = server
            .mock("GET", "/api/json")
            .match_header("authorization", auth)
            .with_status(200)
            .with_body(r#"{"mode":"NORMAL","quietingDown":false,"numExecutors":6,"nodeDescription":"built-in"}"#)
            .create_async()
            .await;
        let queue = server
            .mock("GET", "/queue/api/json")
            .with_status(200)
            .with_body(r#"{"items":[{"id":1},{"id":2}]}"#)
            .create_async()
            .await;

        let target = ClusterTarget::new("dev", "Dev", "https://10.0.0.1:6443");
        let addon = AddonSpec::new("dev", "Jenkins", JenkinsProbe::KIND)
            .with_setting("url", server.url())
            .with_setting("username", "admin")
            .with_setting("api_token", "secret");
        let probe = JenkinsProbe::new(&target, &addon);
        let handle = ClusterHandle::new(target, reqwest::Client::new());

        let outcome = probe.check(&handle).await.unwrap();
        assert_eq!(outcome.severity, Severity::Healthy);
        assert_eq!(outcome.message, "Jenkins Normal - Executors: 6, Queue: 2");
        api.assert_async().await;
        queue.assert_async().await;
    }

    #[tokio::test]
    async fn test_probe_non_success_status_is_critical() {
        let mut server = mockito::Server::new_async().await;
        let _api = server.mock("GET", "/api/json").with_status(403).create_async().await;

        let target = ClusterTarget::new("dev", "Dev", "https://10.0.0.1:6443");
        let addon = AddonSpec::new("dev", "Jenkins", JenkinsProbe::KIND).with_setting("url", server.url());
        let probe = JenkinsProbe::new(&target, &addon);
        let handle = ClusterHandle::new(target, reqwest::Client::new());

        let outcome = probe.check(&handle).await.unwrap();
        assert_eq!(outcome.severity, Severity::Critical);
        assert_eq!(outcome.message, "Jenkins returned 403");
        assert_eq!(outcome.detail_u64("status_code"), Some(403));
    }
}

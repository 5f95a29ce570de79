//! API 服务器探针
//!
//! 依次请求 `/healthz`、`/livez`、`/readyz`

use crate::error::ProbeError;
use crate::health::cluster::ClusterHandle;
use crate::health::outcome::{truncate, CheckOutcome, Severity, DETAIL_TEXT_LIMIT};
use crate::health::probe::{Probe, ProbeCategory, ProbeDescriptor};
use crate::health::target::{AddonSpec, ClusterTarget, EffectiveSettings};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};

/// 检测的健康端点
pub const HEALTH_ENDPOINTS: [&str; 3] = ["/healthz", "/livez", "/readyz"];

/// 平均延迟告警阈值（毫秒）
pub const LATENCY_WARNING_MS: u64 = 3000;

/// 响应体保留的字符数
const BODY_LIMIT: usize = 200;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// 单个端点的请求结果
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointResult {
    /// 收到响应
    Response {
        status_code: u16,
        response_time_ms: u64,
        body: String,
    },
    /// 请求超时
    Timeout,
    /// 连接或传输失败
    Failed(String),
}

/// 根据各端点结果分类
///
/// 任一端点非 200、超时或连接失败 ⇒ critical；全部 200 但平均延迟超过阈值 ⇒ warning。
pub fn classify_api_server(results: &[(&str, EndpointResult)]) -> CheckOutcome {
    let mut details = Map::new();
    let mut failed = Vec::new();
    let mut total_ms = 0;

    for (path, result) in results {
        let entry = match result {
            EndpointResult::Response {
                status_code,
                response_time_ms,
                body,
            } => {
                total_ms += response_time_ms;
                let status = if *status_code != 200 {
                    failed.push(*path);
                    Severity::Critical
                } else if *response_time_ms > LATENCY_WARNING_MS {
                    Severity::Warning
                } else {
                    Severity::Healthy
                };
                json!({
                    "status": status,
                    "status_code": status_code,
                    "response_time_ms": response_time_ms,
                    "body": if body.is_empty() { Value::Null } else { Value::from(truncate(body, BODY_LIMIT)) },
                })
            }
            EndpointResult::Timeout => {
                failed.push(*path);
                json!({ "status": Severity::Critical, "error": "Timeout" })
            }
            EndpointResult::Failed(error) => {
                failed.push(*path);
                json!({ "status": Severity::Critical, "error": truncate(error, DETAIL_TEXT_LIMIT) })
            }
        };
        details.insert(path.to_string(), entry);
    }

    let avg_ms = if results.is_empty() {
        0
    } else {
        total_ms / results.len() as u64
    };

    let outcome = if !failed.is_empty() {
        CheckOutcome::critical(format!("API Server unhealthy: {}", failed.join(", ")))
    } else if avg_ms > LATENCY_WARNING_MS {
        CheckOutcome::warning("API Server is slow (response > 3s)")
    } else {
        CheckOutcome::healthy("API Server is healthy")
    };

    outcome
        .with_details(details.into_iter().collect())
        .with_response_time_ms(avg_ms)
}

/// API 服务器探针
pub struct ApiServerProbe {
    base_url: String,
    token: Option<String>,
}

impl ApiServerProbe {
    pub const KIND: &'static str = "api-server";

    pub fn descriptor() -> ProbeDescriptor {
        ProbeDescriptor::new(Self::KIND, ProbeCategory::Core, "API Server")
            .with_description("Kubernetes API Server")
            .with_icon("🔌")
    }

    pub fn new(target: &ClusterTarget, addon: &AddonSpec) -> Self {
        let settings = EffectiveSettings::resolve(target, addon);
        Self {
            base_url: target.api_base().to_string(),
            token: settings.first_str(&["token", "api_token"]).map(str::to_string),
        }
    }

    async fn request(&self, cluster: &ClusterHandle, path: &str) -> EndpointResult {
        let url = format!("{}{}", self.base_url, path);
        let mut request = cluster.http().get(&url).timeout(REQUEST_TIMEOUT);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let start = Instant::now();
        match request.send().await {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                EndpointResult::Response {
                    status_code,
                    response_time_ms: start.elapsed().as_millis() as u64,
                    body,
                }
            }
            Err(e) if e.is_timeout() => EndpointResult::Timeout,
            Err(e) => EndpointResult::Failed(e.to_string()),
        }
    }
}

#[async_trait]
impl Probe for ApiServerProbe {
    async fn check(&self, cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
        let mut results = Vec::with_capacity(HEALTH_ENDPOINTS.len());
        for path in HEALTH_ENDPOINTS {
            results.push((path, self.request(cluster, path).await));
        }
        Ok(classify_api_server(&results))
    }

    fn timeout(&self) -> Option<Duration> {
        Some(REQUEST_TIMEOUT * HEALTH_ENDPOINTS.len() as u32 + Duration::from_secs(5))
    }
}

//! 通用 HTTP 回退探针
//!
//! 插件类型未注册且没有回退脚本时使用：对集群地址发起 GET 请求，
//! 按状态码和延迟分类

use crate::error::ProbeError;
use crate::health::cluster::ClusterHandle;
use crate::health::outcome::{truncate, CheckOutcome, DETAIL_TEXT_LIMIT, MESSAGE_TEXT_LIMIT};
use crate::health::probe::Probe;
use crate::health::target::{AddonSpec, ClusterTarget, EffectiveSettings};
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// 延迟告警阈值（毫秒）
pub const LATENCY_WARNING_MS: u64 = 3000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// 插件名称到默认检测路径的映射，未知名称使用 `/healthz`
pub fn default_path(addon_name: &str) -> &'static str {
    match addon_name {
        "API Server" => "/healthz",
        "etcd" => "/health",
        "Metrics Server" => "/metrics",
        _ => "/healthz",
    }
}

/// 一次回退请求的结果
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackResponse {
    /// 收到响应
    Status { code: u16, elapsed_ms: u64 },
    /// 超时
    Timeout,
    /// 连接失败
    Failed(String),
}

/// 回退探针的分类规则
///
/// * 200 且延迟不超过阈值 ⇒ healthy
/// * 200 但延迟超过阈值，或非 200 且小于 500 ⇒ warning
/// * 大于等于 500、超时或连接失败 ⇒ critical
pub fn classify_http_fallback(addon: &str, endpoint: &str, response: &FallbackResponse) -> CheckOutcome {
    match response {
        FallbackResponse::Status { code, elapsed_ms } => {
            let outcome = if *code == 200 && *elapsed_ms > LATENCY_WARNING_MS {
                CheckOutcome::warning(format!("{addon} slow ({elapsed_ms}ms)"))
            } else if *code == 200 {
                CheckOutcome::healthy(format!("{addon} healthy ({elapsed_ms}ms)"))
            } else if *code < 500 {
                CheckOutcome::warning(format!("{addon} returned {code}"))
            } else {
                CheckOutcome::critical(format!("{addon} returned {code}"))
            };
            outcome
                .with_detail("endpoint", endpoint)
                .with_detail("status_code", *code)
                .with_response_time_ms(*elapsed_ms)
        }
        FallbackResponse::Timeout => CheckOutcome::critical(format!("{addon} timeout"))
            .with_detail("endpoint", endpoint)
            .with_detail("error", "Timeout")
            .with_response_time(REQUEST_TIMEOUT),
        FallbackResponse::Failed(error) => CheckOutcome::critical(format!(
            "{addon} failed: {}",
            truncate(error, MESSAGE_TEXT_LIMIT)
        ))
        .with_detail("endpoint", endpoint)
        .with_detail("error", truncate(error, DETAIL_TEXT_LIMIT)),
    }
}

/// 通用 HTTP 回退探针
pub struct HttpFallbackProbe {
    addon_name: String,
    url: String,
    endpoint: String,
}

impl HttpFallbackProbe {
    /// 检测地址：设置 `url` 优先，否则使用集群 API 地址；路径可由 `health_path` 覆盖
    pub fn new(target: &ClusterTarget, addon: &AddonSpec) -> Self {
        let settings = EffectiveSettings::resolve(target, addon);
        let endpoint = settings
            .str("health_path")
            .unwrap_or_else(|| default_path(&addon.name))
            .to_string();
        let base = settings
            .str("url")
            .unwrap_or_else(|| target.api_base())
            .trim_end_matches('/');

        Self {
            addon_name: addon.name.clone(),
            url: format!("{base}{endpoint}"),
            endpoint,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Probe for HttpFallbackProbe {
    async fn check(&self, cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
        let start = Instant::now();
        let response = match cluster.http().get(&self.url).timeout(REQUEST_TIMEOUT).send().await {
            Ok(response) => FallbackResponse::Status {
                code: response.status().as_u16(),
                elapsed_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) if e.is_timeout() => FallbackResponse::Timeout,
            Err(e) => FallbackResponse::Failed(e.to_string()),
        };
        Ok(classify_http_fallback(&self.addon_name, &self.endpoint, &response))
    }

    fn timeout(&self) -> Option<Duration> {
        Some(REQUEST_TIMEOUT + Duration::from_secs(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::outcome::Severity;

    fn status(code: u16, elapsed_ms: u64) -> FallbackResponse {
        FallbackResponse::Status { code, elapsed_ms }
    }

    #[test]
    fn test_classification_boundaries() {
        let cases = [
            (status(200, 100), Severity::Healthy),
            (status(200, 3000), Severity::Healthy),
            (status(200, 3001), Severity::Warning),
            (status(404, 10), Severity::Warning),
            (status(499, 10), Severity::Warning),
            (status(500, 10), Severity::Critical),
            (status(503, 10), Severity::Critical),
            (FallbackResponse::Timeout, Severity::Critical),
            (FallbackResponse::Failed("connection refused".into()), Severity::Critical),
        ];
        for (response, expected) in cases {
            let outcome = classify_http_fallback("Metrics", "/healthz", &response);
            assert_eq!(outcome.severity, expected, "{response:?}");
        }
    }

    #[test]
    fn test_timeout_is_marked() {
        let outcome = classify_http_fallback("Metrics", "/metrics", &FallbackResponse::Timeout);
        assert_eq!(outcome.detail_str("error"), Some("Timeout"));
        assert_eq!(outcome.detail_str("endpoint"), Some("/metrics"));
    }

    #[test]
    fn test_default_paths_and_overrides() {
        assert_eq!(default_path("etcd"), "/health");
        assert_eq!(default_path("Something Else"), "/healthz");

        let target = ClusterTarget::new("dev", "Dev", "https://10.0.0.1:6443/");
        let probe = HttpFallbackProbe::new(&target, &AddonSpec::new("dev", "Metrics Server", "metrics"));
        assert_eq!(probe.url(), "https://10.0.0.1:6443/metrics");

        let addon = AddonSpec::new("dev", "Grafana", "grafana")
            .with_setting("url", "http://grafana.monitoring:3000/")
            .with_setting("health_path", "/api/health");
        let probe = HttpFallbackProbe::new(&target, &addon);
        assert_eq!(probe.url(), "http://grafana.monitoring:3000/api/health");

        let shared = target
            .clone()
            .with_setting("url", "http://jenkins.prod:8080")
            .with_setting("health_path", "/login");
        let probe = HttpFallbackProbe::new(&shared, &AddonSpec::new("dev", "Exporter", "exporter"));
        assert_eq!(probe.url(), "https://10.0.0.1:6443/healthz");
    }
}

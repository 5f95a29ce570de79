//! 检测调度器
//!
//! 把 `(集群, 插件)` 转换为恰好一个检测结果。探针在独立任务中执行并受超时约束，
//! 任何错误、超时或 panic 都在这里被转换为 critical 结果，不会影响同批其他探针。

use crate::error::ProbeError;
use crate::health::cluster::ClusterHandle;
use crate::health::outcome::{
    elapsed_ms, truncate, CheckOutcome, DETAIL_TEXT_LIMIT, MESSAGE_TEXT_LIMIT,
};
use crate::health::probe::{Probe, DEFAULT_PROBE_TIMEOUT};
use crate::health::registry::ProbeRegistry;
use crate::health::target::{AddonSpec, EffectiveSettings};
use crate::logging::LoggingSystem;
use crate::probes::http_fallback::HttpFallbackProbe;
use crate::probes::script::ScriptProbe;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// 默认并发探针数
pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 8;

/// 单个插件的检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonOutcome {
    /// 插件名称
    pub name: String,
    /// 探针类型
    pub kind: String,
    /// 检测结果
    pub outcome: CheckOutcome,
}

/// 检测调度器
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ProbeRegistry>,
    default_timeout: Duration,
    max_concurrent: usize,
}

impl Dispatcher {
    /// 创建调度器
    ///
    /// # 参数
    /// * `registry` - 探针注册表
    pub fn new(registry: Arc<ProbeRegistry>) -> Self {
        Self {
            registry,
            default_timeout: DEFAULT_PROBE_TIMEOUT,
            max_concurrent: DEFAULT_MAX_CONCURRENT_PROBES,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<ProbeRegistry> {
        &self.registry
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// 解析探针实例和生效的超时
    ///
    /// 超时优先级：插件设置 `timeout_seconds` > 探针声明 > 注册元信息 > 调度器默认值。
    fn instantiate(&self, cluster: &ClusterHandle, addon: &AddonSpec) -> (Box<dyn Probe>, Duration) {
        let target = cluster.target();
        let (probe, descriptor_timeout): (Box<dyn Probe>, Option<Duration>) =
            match self.registry.resolve(&addon.kind) {
                Some(entry) => (entry.instantiate(target, addon), entry.descriptor.timeout),
                None => match &addon.fallback_script {
                    Some(script) => {
                        debug!("探针类型 {} 未注册，使用脚本 {}", addon.kind, script.display());
                        (Box::new(ScriptProbe::new(target, addon, script)), None)
                    }
                    None => {
                        debug!("探针类型 {} 未注册，使用通用 HTTP 检测", addon.kind);
                        (Box::new(HttpFallbackProbe::new(target, addon)), None)
                    }
                },
            };

        let configured = EffectiveSettings::resolve(target, addon)
            .u64("timeout_seconds")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let timeout = configured
            .or_else(|| probe.timeout())
            .or(descriptor_timeout)
            .unwrap_or(self.default_timeout);

        (probe, timeout)
    }

    /// 执行单个插件的检测
    ///
    /// # 参数
    /// * `cluster` - 本次编排过程的集群句柄
    /// * `addon` - 插件绑定
    ///
    /// # 返回
    /// * `CheckOutcome` - 检测结果，失败时为 critical
    pub async fn run_one(&self, cluster: &Arc<ClusterHandle>, addon: &AddonSpec) -> CheckOutcome {
        let (probe, timeout) = self.instantiate(cluster, addon);
        let start = Instant::now();

        let handle = Arc::clone(cluster);
        let mut task = tokio::spawn(async move { probe.check(&handle).await });

        let outcome = match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(Ok(outcome))) => outcome,
            Ok(Ok(Err(e))) => failure_outcome(&addon.name, &e),
            Ok(Err(join_error)) => {
                error!("探针 {} 异常终止: {}", addon.name, join_error);
                CheckOutcome::crashed(format!(
                    "{} check failed: {}",
                    addon.name,
                    truncate(&join_error.to_string(), MESSAGE_TEXT_LIMIT)
                ))
            }
            Err(_) => {
                // 超时后结果被丢弃
                task.abort();
                warn!("探针 {} 超时 ({}ms)", addon.name, timeout.as_millis());
                timeout_outcome(&addon.name, timeout)
            }
        };

        let outcome = if outcome.response_time_ms.is_none() {
            outcome.with_response_time_ms(elapsed_ms(start))
        } else {
            outcome
        };

        LoggingSystem::probe_log(&cluster.target().name, &addon.name, &addon.kind, &outcome);
        outcome
    }

    /// 执行一组插件的检测
    ///
    /// 探针并发执行（受 `max_concurrent` 约束），返回顺序与输入一致。
    pub async fn run_all(
        &self,
        cluster: &Arc<ClusterHandle>,
        addons: &[AddonSpec],
    ) -> Vec<AddonOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        let futures = addons.iter().map(|addon| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let outcome = match semaphore.acquire().await {
                    Ok(_permit) => self.run_one(cluster, addon).await,
                    Err(e) => CheckOutcome::critical(format!(
                        "{} check failed: {}",
                        addon.name, e
                    )),
                };
                AddonOutcome {
                    name: addon.name.clone(),
                    kind: addon.kind.clone(),
                    outcome,
                }
            }
        });

        join_all(futures).await
    }
}

/// 探针返回错误时的结果
pub fn failure_outcome(addon: &str, error: &ProbeError) -> CheckOutcome {
    let text = error.to_string();
    let detail = if error.is_timeout() {
        "Timeout".to_string()
    } else {
        truncate(&text, DETAIL_TEXT_LIMIT)
    };

    CheckOutcome::critical(format!(
        "{} check failed: {}",
        addon,
        truncate(&text, MESSAGE_TEXT_LIMIT)
    ))
    .with_detail("error", detail)
    .with_detail("error_type", error.kind())
}

/// 探针超时的结果
pub fn timeout_outcome(addon: &str, timeout: Duration) -> CheckOutcome {
    CheckOutcome::critical(format!(
        "{} check failed: timed out after {}ms",
        addon,
        timeout.as_millis()
    ))
    .with_detail("error", "Timeout")
    .with_detail("timeout_ms", timeout.as_millis() as u64)
    .with_response_time(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::outcome::Severity;
    use crate::health::probe::{ProbeCategory, ProbeDescriptor};
    use crate::health::target::ClusterTarget;
    use async_trait::async_trait;

    struct OkProbe;
    struct FailingProbe;
    struct SlowProbe;
    struct PanickingProbe;

    #[async_trait]
    impl Probe for OkProbe {
        async fn check(&self, _cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
            Ok(CheckOutcome::healthy("fine").with_detail("total", 3))
        }
    }

    #[async_trait]
    impl Probe for FailingProbe {
        async fn check(&self, _cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
            Err(ProbeError::Unavailable("connection refused".repeat(40)))
        }
    }

    #[async_trait]
    impl Probe for SlowProbe {
        async fn check(&self, _cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(CheckOutcome::healthy("too late"))
        }

        fn timeout(&self) -> Option<Duration> {
            Some(Duration::from_millis(50))
        }
    }

    #[async_trait]
    impl Probe for PanickingProbe {
        async fn check(&self, _cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
            panic!("boom");
        }
    }

    fn dispatcher() -> Dispatcher {
        let mut registry = ProbeRegistry::new();
        registry.register(
            ProbeDescriptor::new("ok", ProbeCategory::Core, "Ok"),
            |_, _| Box::new(OkProbe),
        );
        registry.register(
            ProbeDescriptor::new("failing", ProbeCategory::Core, "Failing"),
            |_, _| Box::new(FailingProbe),
        );
        registry.register(
            ProbeDescriptor::new("slow", ProbeCategory::Core, "Slow"),
            |_, _| Box::new(SlowProbe),
        );
        registry.register(
            ProbeDescriptor::new("panicking", ProbeCategory::Core, "Panicking"),
            |_, _| Box::new(PanickingProbe),
        );
        Dispatcher::new(Arc::new(registry))
    }

    fn handle() -> Arc<ClusterHandle> {
        let target = ClusterTarget::new("dev", "Dev", "http://127.0.0.1:1");
        Arc::new(ClusterHandle::new(target, reqwest::Client::new()))
    }

    #[tokio::test]
    async fn test_error_becomes_critical_with_truncated_detail() {
        let outcome = dispatcher()
            .run_one(&handle(), &AddonSpec::new("dev", "Broken", "failing"))
            .await;

        assert_eq!(outcome.severity, Severity::Critical);
        assert!(outcome.message.starts_with("Broken check failed: "));
        let error = outcome.detail_str("error").unwrap();
        assert!(error.chars().count() <= DETAIL_TEXT_LIMIT + 1);
        assert_eq!(outcome.detail_str("error_type"), Some("Unavailable"));
        assert!(outcome.response_time_ms.is_some());
    }

    #[tokio::test]
    async fn test_probe_declared_timeout_is_enforced() {
        let start = Instant::now();
        let outcome = dispatcher()
            .run_one(&handle(), &AddonSpec::new("dev", "Slow", "slow"))
            .await;

        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(outcome.severity, Severity::Critical);
        assert_eq!(outcome.detail_str("error"), Some("Timeout"));
        assert_eq!(outcome.detail_u64("timeout_ms"), Some(50));
    }

    #[tokio::test]
    async fn test_addon_timeout_setting_overrides_probe() {
        let addon = AddonSpec::new("dev", "Slow", "slow").with_setting("timeout_seconds", 0);
        let (_, timeout) = dispatcher().instantiate(&handle(), &addon);
        // 0 被忽略，回落到探针声明
        assert_eq!(timeout, Duration::from_millis(50));

        let addon = AddonSpec::new("dev", "Ok", "ok").with_setting("timeout_seconds", 5);
        let (_, timeout) = dispatcher().instantiate(&handle(), &addon);
        assert_eq!(timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let outcome = dispatcher()
            .run_one(&handle(), &AddonSpec::new("dev", "Panics", "panicking"))
            .await;

        assert_eq!(outcome.severity, Severity::Critical);
        assert!(outcome.details.is_none());
    }

    #[tokio::test]
    async fn test_run_all_preserves_order_and_isolation() {
        let addons = vec![
            AddonSpec::new("dev", "A", "ok"),
            AddonSpec::new("dev", "B", "failing"),
            AddonSpec::new("dev", "C", "ok"),
        ];
        let results = dispatcher()
            .with_max_concurrent(2)
            .run_all(&handle(), &addons)
            .await;

        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(results[0].outcome.severity, Severity::Healthy);
        assert_eq!(results[1].outcome.severity, Severity::Critical);
        assert_eq!(results[2].outcome.detail_u64("total"), Some(3));
    }
}

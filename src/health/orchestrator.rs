//! 健康检测编排器
//!
//! 每次调用都是一次固定阶段的过程：解析目标 → 调度 → 聚合 → 收集消息 → 组装记录 → 持久化。
//! 过程总是以恰好一条检测记录结束，唯一向外传播的错误是集群不存在。

use crate::error::{OrchestratorError, ProbeError};
use crate::health::cluster::{build_http_client, ClusterHandle};
use crate::health::dispatcher::Dispatcher;
use crate::health::outcome::{elapsed_ms, Severity};
use crate::health::probe::ProbeCategory;
use crate::health::record::{CheckMode, CheckRecord, ScheduleType};
use crate::health::target::{AddonSpec, ClusterTarget};
use crate::logging::LoggingSystem;
use crate::store::RecordStore;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// 默认并发集群数
pub const DEFAULT_MAX_CONCURRENT_CLUSTERS: usize = 4;

/// 集群目标来源（配置或外部 CRUD 层）
#[async_trait]
pub trait TargetSource: Send + Sync {
    /// 全部集群标识，按配置顺序
    async fn cluster_ids(&self) -> Vec<String>;

    /// 加载集群目标及其插件
    async fn load(&self, cluster_id: &str) -> Option<(ClusterTarget, Vec<AddonSpec>)>;

    /// 集群是否启用了某个日常检测时段
    async fn daily_check_enabled(&self, _cluster_id: &str, _schedule: ScheduleType) -> bool {
        true
    }
}

/// 内存中的固定目标集合
#[derive(Debug, Clone, Default)]
pub struct StaticTargetSource {
    clusters: Vec<(ClusterTarget, Vec<AddonSpec>)>,
}

impl StaticTargetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster(mut self, target: ClusterTarget, addons: Vec<AddonSpec>) -> Self {
        self.clusters.push((target, addons));
        self
    }
}

#[async_trait]
impl TargetSource for StaticTargetSource {
    async fn cluster_ids(&self) -> Vec<String> {
        self.clusters.iter().map(|(t, _)| t.id.clone()).collect()
    }

    async fn load(&self, cluster_id: &str) -> Option<(ClusterTarget, Vec<AddonSpec>)> {
        self.clusters.iter().find(|(t, _)| t.id == cluster_id).cloned()
    }
}

/// 日常检测的内置探针集合
pub fn daily_addons(cluster_id: &str) -> Vec<AddonSpec> {
    [
        ("API Server", "api-server", "🔌"),
        ("Control Plane", "control-plane", "🎛️"),
        ("etcd", "etcd-leader", "💾"),
        ("Nodes", "node-check", "🖥️"),
        ("CoreDNS", "system-pod", "🌐"),
        ("kube-proxy", "system-pod", "🔀"),
    ]
    .into_iter()
    .map(|(name, kind, icon)| AddonSpec::new(cluster_id, name, kind).with_icon(icon))
    .collect()
}

/// 健康检测编排器
pub struct HealthOrchestrator {
    dispatcher: Dispatcher,
    targets: Arc<dyn TargetSource>,
    store: Arc<dyn RecordStore>,
    http: reqwest::Client,
    max_concurrent_clusters: usize,
}

impl HealthOrchestrator {
    /// 创建编排器
    ///
    /// # 参数
    /// * `dispatcher` - 检测调度器
    /// * `targets` - 集群目标来源
    /// * `store` - 记录存储
    pub fn new(
        dispatcher: Dispatcher,
        targets: Arc<dyn TargetSource>,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self, ProbeError> {
        let http = build_http_client(dispatcher.default_timeout())?;
        Ok(Self {
            dispatcher,
            targets,
            store,
            http,
            max_concurrent_clusters: DEFAULT_MAX_CONCURRENT_CLUSTERS,
        })
    }

    pub fn with_max_concurrent_clusters(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent_clusters = max_concurrent.max(1);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    async fn resolve(
        &self,
        cluster_id: &str,
    ) -> Result<(ClusterTarget, Vec<AddonSpec>), OrchestratorError> {
        self.targets
            .load(cluster_id)
            .await
            .ok_or_else(|| OrchestratorError::ClusterNotFound(cluster_id.to_string()))
    }

    /// 对给定目标和插件执行一次完整过程
    ///
    /// 每次过程创建独立的集群句柄，Kubernetes 客户端只在本次过程内复用。
    pub async fn run_pass(
        &self,
        target: ClusterTarget,
        addons: Vec<AddonSpec>,
        mode: CheckMode,
    ) -> CheckRecord {
        info!(
            "开始检测集群 {} ({}), 探针数量: {}",
            target.name,
            target.id,
            addons.len()
        );

        let cluster_id = target.id.clone();
        let cluster_name = target.name.clone();
        let handle = Arc::new(ClusterHandle::new(target, self.http.clone()));

        let start = Instant::now();
        let outcomes = self.dispatcher.run_all(&handle, &addons).await;
        let mut record = CheckRecord::assemble(cluster_id, cluster_name, mode, outcomes, Duration::ZERO);
        record.duration = start.elapsed();

        self.persist(&record).await;

        let mut metadata = HashMap::new();
        metadata.insert("cluster".to_string(), record.cluster_id.clone());
        metadata.insert("overall".to_string(), record.overall.to_string());
        metadata.insert("probes".to_string(), record.outcomes.len().to_string());
        LoggingSystem::performance_log(
            "cluster_check",
            elapsed_ms(start),
            record.overall != Severity::Critical,
            Some(&metadata),
        );

        info!(
            "集群 {} 检测完成: {}, 错误 {} 项, 警告 {} 项",
            record.cluster_name,
            record.overall,
            record.errors.len(),
            record.warnings.len()
        );
        record
    }

    /// 存储失败只记录日志，不影响本次记录的返回
    async fn persist(&self, record: &CheckRecord) {
        if let Err(e) = self.store.save(record).await {
            error!("保存集群 {} 的检测记录失败: {}", record.cluster_id, e);
        }
        if let Err(e) = self
            .store
            .set_cluster_status(&record.cluster_id, record.overall, record.checked_at)
            .await
        {
            error!("更新集群 {} 的状态失败: {}", record.cluster_id, e);
        }
    }

    /// 按集群已配置的插件检测
    pub async fn run_cluster_check(&self, cluster_id: &str) -> Result<CheckRecord, OrchestratorError> {
        let (target, addons) = self.resolve(cluster_id).await?;
        Ok(self.run_pass(target, addons, CheckMode::Addons).await)
    }

    /// 对单个集群执行内置日常检测
    pub async fn run_daily_check(
        &self,
        cluster_id: &str,
        schedule: ScheduleType,
    ) -> Result<CheckRecord, OrchestratorError> {
        let (target, _) = self.resolve(cluster_id).await?;
        let addons = daily_addons(&target.id);
        Ok(self
            .run_pass(target, addons, CheckMode::Daily { schedule })
            .await)
    }

    /// 对全部集群执行日常检测
    ///
    /// 跳过禁用了该时段的集群（手动检测总是执行），集群之间并行，受并发上限约束。
    pub async fn run_daily_check_all(&self, schedule: ScheduleType) -> Vec<CheckRecord> {
        let mut cluster_ids = Vec::new();
        for id in self.targets.cluster_ids().await {
            if schedule == ScheduleType::Manual
                || self.targets.daily_check_enabled(&id, schedule).await
            {
                cluster_ids.push(id);
            } else {
                info!("集群 {} 禁用了 {} 时段的日常检测，跳过", id, schedule);
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_clusters));
        let runs = cluster_ids.iter().map(|id| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                match self.run_daily_check(id, schedule).await {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!("日常检测跳过集群 {}: {}", id, e);
                        None
                    }
                }
            }
        });

        join_all(runs).await.into_iter().flatten().collect()
    }

    /// 只运行指定探针类型
    ///
    /// 优先使用集群中同类型的已配置插件（携带其设置），否则按注册信息合成插件；
    /// 未注册的类型被跳过。
    pub async fn run_by_names(
        &self,
        cluster_id: &str,
        names: &[String],
    ) -> Result<CheckRecord, OrchestratorError> {
        let (target, configured) = self.resolve(cluster_id).await?;
        let addons = self.select(&target, &configured, names);
        Ok(self
            .run_pass(
                target,
                addons,
                CheckMode::Selected {
                    names: names.to_vec(),
                },
            )
            .await)
    }

    /// 只运行某个类别下的探针
    pub async fn run_by_category(
        &self,
        cluster_id: &str,
        category: ProbeCategory,
    ) -> Result<CheckRecord, OrchestratorError> {
        let (target, configured) = self.resolve(cluster_id).await?;
        let kinds: Vec<String> = self
            .dispatcher
            .registry()
            .list_by_category(category)
            .into_iter()
            .map(str::to_string)
            .collect();
        let addons = self.select(&target, &configured, &kinds);
        Ok(self
            .run_pass(
                target,
                addons,
                CheckMode::Category {
                    category: category.to_string(),
                },
            )
            .await)
    }

    fn select(&self, target: &ClusterTarget, configured: &[AddonSpec], kinds: &[String]) -> Vec<AddonSpec> {
        let registry = self.dispatcher.registry();
        let mut addons = Vec::new();
        for kind in kinds {
            let matching: Vec<AddonSpec> = configured
                .iter()
                .filter(|a| &a.kind == kind)
                .cloned()
                .collect();
            if !matching.is_empty() {
                addons.extend(matching);
                continue;
            }
            match registry.resolve(kind) {
                Some(entry) => addons.push(
                    AddonSpec::new(&target.id, kind.as_str(), kind.as_str())
                        .with_icon(entry.descriptor.icon.clone()),
                ),
                None => warn!("未注册的探针类型 {}，跳过", kind),
            }
        }
        addons
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::health::outcome::CheckOutcome;
    use crate::health::probe::{Probe, ProbeDescriptor};
    use crate::health::registry::ProbeRegistry;
    use crate::store::MemoryRecordStore;

    struct FixedProbe(Severity);

    #[async_trait]
    impl Probe for FixedProbe {
        async fn check(&self, _cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
            Ok(CheckOutcome::new(self.0, format!("fixed {}", self.0)))
        }
    }

    struct SlowProbe;

    #[async_trait]
    impl Probe for SlowProbe {
        async fn check(&self, _cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(CheckOutcome::healthy("slow but fine"))
        }
    }

    fn registry() -> ProbeRegistry {
        let mut registry = ProbeRegistry::new();
        for (kind, category, severity) in [
            ("api-server", ProbeCategory::Core, Severity::Healthy),
            ("control-plane", ProbeCategory::Core, Severity::Healthy),
            ("etcd-leader", ProbeCategory::Core, Severity::Healthy),
            ("node-check", ProbeCategory::Core, Severity::Warning),
            ("system-pod", ProbeCategory::Core, Severity::Healthy),
            ("minio", ProbeCategory::Storage, Severity::Critical),
        ] {
            registry.register(ProbeDescriptor::new(kind, category, kind), move |_, _| {
                Box::new(FixedProbe(severity))
            });
        }
        registry
    }

    struct SlotSource {
        inner: StaticTargetSource,
    }

    #[async_trait]
    impl TargetSource for SlotSource {
        async fn cluster_ids(&self) -> Vec<String> {
            self.inner.cluster_ids().await
        }

        async fn load(&self, cluster_id: &str) -> Option<(ClusterTarget, Vec<AddonSpec>)> {
            self.inner.load(cluster_id).await
        }

        async fn daily_check_enabled(&self, cluster_id: &str, schedule: ScheduleType) -> bool {
            !(cluster_id == "b" && schedule == ScheduleType::Evening)
        }
    }

    fn orchestrator(store: Arc<MemoryRecordStore>) -> HealthOrchestrator {
        let source = StaticTargetSource::new()
            .with_cluster(
                ClusterTarget::new("a", "Alpha", "http://127.0.0.1:1"),
                vec![
                    AddonSpec::new("a", "MinIO", "minio"),
                    AddonSpec::new("a", "Primary API", "api-server"),
                ],
            )
            .with_cluster(ClusterTarget::new("b", "Beta", "http://127.0.0.1:1"), vec![]);
        HealthOrchestrator::new(
            Dispatcher::new(Arc::new(registry())),
            Arc::new(SlotSource { inner: source }),
            store,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_cluster_is_the_only_error() {
        let orchestrator = orchestrator(Arc::new(MemoryRecordStore::new()));
        let err = orchestrator.run_cluster_check("missing").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ClusterNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_daily_check_uses_builtin_set_and_updates_status() {
        let store = Arc::new(MemoryRecordStore::new());
        let orchestrator = orchestrator(Arc::clone(&store));

        let record = orchestrator
            .run_daily_check("a", ScheduleType::Morning)
            .await
            .unwrap();
        assert_eq!(record.outcomes.len(), 6);
        assert!(record.outcome("MinIO").is_none());
        assert_eq!(record.overall, Severity::Warning);

        let status = store.cluster_status("a").await.unwrap().unwrap();
        assert_eq!(status.status, Severity::Warning);
        assert_eq!(store.latest("a").await.unwrap().unwrap().id, record.id);
    }

    #[tokio::test]
    async fn test_daily_check_all_skips_disabled_slots() {
        let orchestrator = orchestrator(Arc::new(MemoryRecordStore::new()));

        let evening = orchestrator.run_daily_check_all(ScheduleType::Evening).await;
        let ids: Vec<_> = evening.iter().map(|r| r.cluster_id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);

        let manual = orchestrator.run_daily_check_all(ScheduleType::Manual).await;
        assert_eq!(manual.len(), 2);
    }

    #[tokio::test]
    async fn test_run_by_names_prefers_configured_addons() {
        let orchestrator = orchestrator(Arc::new(MemoryRecordStore::new()));
        let names = vec![
            "api-server".to_string(),
            "node-check".to_string(),
            "does-not-exist".to_string(),
        ];

        let record = orchestrator.run_by_names("a", &names).await.unwrap();
        let outcome_names: Vec<_> = record.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(outcome_names, vec!["Primary API", "node-check"]);
    }

    #[tokio::test]
    async fn test_run_by_category() {
        let orchestrator = orchestrator(Arc::new(MemoryRecordStore::new()));
        let record = orchestrator
            .run_by_category("a", ProbeCategory::Storage)
            .await
            .unwrap();
        assert_eq!(record.outcomes.len(), 1);
        assert_eq!(record.overall, Severity::Critical);
        assert_eq!(record.errors, vec!["[MinIO] fixed critical"]);
    }

    #[tokio::test]
    async fn test_record_duration_covers_dispatch_and_assembly() {
        let mut registry = ProbeRegistry::new();
        registry.register(ProbeDescriptor::new("slow", ProbeCategory::Core, "slow"), |_, _| {
            Box::new(SlowProbe)
        });
        let orchestrator = HealthOrchestrator::new(
            Dispatcher::new(Arc::new(registry)),
            Arc::new(StaticTargetSource::new()),
            Arc::new(MemoryRecordStore::new()),
        )
        .unwrap();

        let target = ClusterTarget::new("a", "Alpha", "http://127.0.0.1:1");
        let addons = vec![AddonSpec::new("a", "Slow", "slow")];
        let start = Instant::now();
        let record = orchestrator.run_pass(target, addons, CheckMode::Addons).await;

        assert!(record.duration >= Duration::from_millis(50), "{:?}", record.duration);
        assert!(record.duration <= start.elapsed());
    }
}

//! 探针注册表
//!
//! 把探针类型键映射到探针构造器。注册表由调用方显式创建并注入调度器，
//! 包装进 `Arc` 之后只读，可在多个任务间并发查询。

use crate::health::probe::{Probe, ProbeCategory, ProbeDescriptor};
use crate::health::target::{AddonSpec, ClusterTarget};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// 探针构造器
pub type ProbeFactory = Arc<dyn Fn(&ClusterTarget, &AddonSpec) -> Box<dyn Probe> + Send + Sync>;

/// 注册表条目
#[derive(Clone)]
pub struct ProbeEntry {
    /// 元信息
    pub descriptor: ProbeDescriptor,
    factory: ProbeFactory,
}

impl ProbeEntry {
    /// 为 `(集群, 插件)` 创建探针实例
    pub fn instantiate(&self, target: &ClusterTarget, addon: &AddonSpec) -> Box<dyn Probe> {
        (self.factory)(target, addon)
    }
}

impl std::fmt::Debug for ProbeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeEntry")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// 探针注册表
#[derive(Debug, Clone, Default)]
pub struct ProbeRegistry {
    entries: BTreeMap<String, ProbeEntry>,
}

impl ProbeRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建包含全部内置探针的注册表
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        crate::probes::register_builtin(&mut registry);
        registry
    }

    /// 注册探针构造器
    ///
    /// 同一类型重复注册时后者覆盖前者，不视为错误。
    ///
    /// # 参数
    /// * `descriptor` - 探针元信息，`kind` 作为键
    /// * `factory` - 构造器
    pub fn register<F>(&mut self, descriptor: ProbeDescriptor, factory: F)
    where
        F: Fn(&ClusterTarget, &AddonSpec) -> Box<dyn Probe> + Send + Sync + 'static,
    {
        let kind = descriptor.kind.clone();
        let entry = ProbeEntry {
            descriptor,
            factory: Arc::new(factory),
        };
        if self.entries.insert(kind.clone(), entry).is_some() {
            debug!("探针类型 {} 已被覆盖注册", kind);
        }
    }

    /// 按类型查找探针
    pub fn resolve(&self, kind: &str) -> Option<&ProbeEntry> {
        self.entries.get(kind)
    }

    /// 是否注册了某个类型
    pub fn contains(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    /// 列出全部已注册探针的元信息，按类型键排序
    pub fn list(&self) -> Vec<&ProbeDescriptor> {
        self.entries.values().map(|e| &e.descriptor).collect()
    }

    /// 列出某个类别下的探针类型
    pub fn list_by_category(&self, category: ProbeCategory) -> Vec<&str> {
        self.entries
            .values()
            .filter(|e| e.descriptor.category == category)
            .map(|e| e.descriptor.kind.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::health::cluster::ClusterHandle;
    use crate::health::outcome::CheckOutcome;
    use async_trait::async_trait;

    struct StaticProbe(&'static str);

    #[async_trait]
    impl Probe for StaticProbe {
        async fn check(&self, _cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
            Ok(CheckOutcome::healthy(self.0))
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ProbeRegistry::new();
        assert!(registry.is_empty());

        registry.register(
            ProbeDescriptor::new("fake", ProbeCategory::Storage, "Fake"),
            |_, _| Box::new(StaticProbe("first")),
        );
        assert!(registry.contains("fake"));
        assert!(registry.resolve("missing").is_none());
        assert_eq!(registry.list_by_category(ProbeCategory::Storage), vec!["fake"]);
        assert!(registry.list_by_category(ProbeCategory::Core).is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_keeps_latest_registration() {
        let mut registry = ProbeRegistry::new();
        registry.register(
            ProbeDescriptor::new("fake", ProbeCategory::Core, "Fake v1"),
            |_, _| Box::new(StaticProbe("first")),
        );
        registry.register(
            ProbeDescriptor::new("fake", ProbeCategory::Core, "Fake v2"),
            |_, _| Box::new(StaticProbe("second")),
        );
        assert_eq!(registry.len(), 1);

        let target = ClusterTarget::new("c", "c", "https://c:6443");
        let addon = AddonSpec::new("c", "Fake", "fake");
        let entry = registry.resolve("fake").unwrap();
        assert_eq!(entry.descriptor.label, "Fake v2");

        let handle = ClusterHandle::new(target.clone(), reqwest::Client::new());
        let outcome = entry.instantiate(&target, &addon).check(&handle).await.unwrap();
        assert_eq!(outcome.message, "second");
    }

    #[test]
    fn test_defaults_cover_builtin_kinds() {
        let registry = ProbeRegistry::with_defaults();
        for kind in [
            "api-server",
            "etcd-leader",
            "node-check",
            "control-plane",
            "system-pod",
            "minio",
            "argocd",
            "jenkins",
            "nexus",
            "keycloak",
        ] {
            assert!(registry.contains(kind), "missing {kind}");
        }
        assert!(registry
            .list_by_category(ProbeCategory::Core)
            .contains(&"etcd-leader"));
        assert!(registry
            .list_by_category(ProbeCategory::Cicd)
            .contains(&"jenkins"));
    }
}

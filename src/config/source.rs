//! 基于配置文件的集群目标来源

use crate::config::types::Config;
use crate::health::orchestrator::TargetSource;
use crate::health::record::ScheduleType;
use crate::health::target::{AddonSpec, ClusterTarget};
use async_trait::async_trait;
use std::sync::Arc;

/// 从已加载的配置中提供集群目标
///
/// 配置在一次运行期间不可变，编排器只读取
#[derive(Debug, Clone)]
pub struct ConfigTargetSource {
    config: Arc<Config>,
}

impl ConfigTargetSource {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[async_trait]
impl TargetSource for ConfigTargetSource {
    async fn cluster_ids(&self) -> Vec<String> {
        self.config.clusters.iter().map(|c| c.id.clone()).collect()
    }

    async fn load(&self, cluster_id: &str) -> Option<(ClusterTarget, Vec<AddonSpec>)> {
        self.config
            .cluster(cluster_id)
            .map(|c| (c.to_target(), c.addon_specs()))
    }

    async fn daily_check_enabled(&self, cluster_id: &str, schedule: ScheduleType) -> bool {
        self.config
            .cluster(cluster_id)
            .is_some_and(|c| c.daily_check.allows(schedule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{AddonEntry, ClusterEntry, DailyCheckSettings, GlobalConfig};

    fn config() -> Config {
        let cluster = |id: &str, noon: bool| ClusterEntry {
            id: id.to_string(),
            name: id.to_uppercase(),
            api_endpoint: "https://10.0.0.1:6443".to_string(),
            kubeconfig_path: None,
            config: Default::default(),
            daily_check: DailyCheckSettings {
                noon,
                ..Default::default()
            },
            addons: vec![AddonEntry {
                name: "Jenkins".to_string(),
                kind: "jenkins".to_string(),
                icon: None,
                description: None,
                fallback_script: None,
                config: None,
            }],
        };
        Config {
            global: GlobalConfig::default(),
            clusters: vec![cluster("a", true), cluster("b", false)],
        }
    }

    #[tokio::test]
    async fn test_targets_follow_config_order() {
        let source = ConfigTargetSource::new(Arc::new(config()));
        assert_eq!(source.cluster_ids().await, vec!["a", "b"]);

        let (target, addons) = source.load("b").await.unwrap();
        assert_eq!(target.name, "B");
        assert_eq!(addons[0].cluster_id, "b");
        assert!(source.load("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_daily_slots_per_cluster() {
        let source = ConfigTargetSource::new(Arc::new(config()));
        assert!(source.daily_check_enabled("a", ScheduleType::Noon).await);
        assert!(!source.daily_check_enabled("b", ScheduleType::Noon).await);
        assert!(source.daily_check_enabled("b", ScheduleType::Manual).await);
        assert!(!source.daily_check_enabled("missing", ScheduleType::Manual).await);
    }
}

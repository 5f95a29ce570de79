//! 检测记录
//!
//! 一次编排过程对一个集群产出的不可变结果

use crate::health::aggregator::aggregate_outcomes;
use crate::health::dispatcher::AddonOutcome;
use crate::health::outcome::{duration_serde, CheckOutcome, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// 节点探针的类型键，用于提取节点计数
pub const NODE_PROBE_KIND: &str = "node-check";

/// 日常检测时段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Morning,
    Noon,
    Evening,
    Manual,
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScheduleType::Morning => "morning",
            ScheduleType::Noon => "noon",
            ScheduleType::Evening => "evening",
            ScheduleType::Manual => "manual",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ScheduleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "morning" => Ok(ScheduleType::Morning),
            "noon" => Ok(ScheduleType::Noon),
            "evening" => Ok(ScheduleType::Evening),
            "manual" => Ok(ScheduleType::Manual),
            other => Err(format!("unknown schedule type: {other}")),
        }
    }
}

/// 编排模式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CheckMode {
    /// 按已配置插件检测
    Addons,
    /// 内置日常检测集合
    Daily { schedule: ScheduleType },
    /// 按探针类型选择
    Selected { names: Vec<String> },
    /// 按类别选择
    Category { category: String },
}

/// 一次编排过程的检测记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    /// 记录ID
    pub id: Uuid,
    /// 集群标识
    pub cluster_id: String,
    /// 集群名称
    pub cluster_name: String,
    /// 编排模式
    pub mode: CheckMode,
    /// 各插件结果，保持插件顺序
    pub outcomes: Vec<AddonOutcome>,
    /// 聚合后的整体状态
    pub overall: Severity,
    /// critical 结果的消息，格式 `[名称] 消息`
    pub errors: Vec<String>,
    /// warning 与 unknown 结果的消息
    pub warnings: Vec<String>,
    /// 节点总数（节点探针执行时）
    pub total_nodes: Option<u64>,
    /// 就绪节点数（节点探针执行时）
    pub ready_nodes: Option<u64>,
    /// 检测时间
    pub checked_at: DateTime<Utc>,
    /// 执行耗时
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl CheckRecord {
    /// 由各插件结果组装记录
    ///
    /// # 参数
    /// * `cluster_id` - 集群标识
    /// * `cluster_name` - 集群名称
    /// * `mode` - 编排模式
    /// * `outcomes` - 各插件结果
    /// * `duration` - 调度、聚合与消息收集的耗时
    pub fn assemble(
        cluster_id: impl Into<String>,
        cluster_name: impl Into<String>,
        mode: CheckMode,
        outcomes: Vec<AddonOutcome>,
        duration: Duration,
    ) -> Self {
        let overall = aggregate_outcomes(outcomes.iter().map(|o| &o.outcome));

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        for item in &outcomes {
            let line = format!("[{}] {}", item.name, item.outcome.message);
            match item.outcome.severity {
                Severity::Critical => errors.push(line),
                Severity::Warning | Severity::Unknown => warnings.push(line),
                Severity::Healthy => {}
            }
        }

        let node_outcome = outcomes
            .iter()
            .find(|o| o.kind == NODE_PROBE_KIND)
            .map(|o| &o.outcome);

        Self {
            id: Uuid::new_v4(),
            cluster_id: cluster_id.into(),
            cluster_name: cluster_name.into(),
            mode,
            total_nodes: node_outcome.and_then(|o| o.detail_u64("total")),
            ready_nodes: node_outcome.and_then(|o| o.detail_u64("ready")),
            outcomes,
            overall,
            errors,
            warnings,
            checked_at: Utc::now(),
            duration,
        }
    }

    /// 按插件名称查找结果
    pub fn outcome(&self, name: &str) -> Option<&CheckOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.name == name)
            .map(|o| &o.outcome)
    }

    /// 各严重级别的数量
    pub fn count(&self, severity: Severity) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome.severity == severity)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, kind: &str, outcome: CheckOutcome) -> AddonOutcome {
        AddonOutcome {
            name: name.to_string(),
            kind: kind.to_string(),
            outcome,
        }
    }

    #[test]
    fn test_assemble_collects_messages_in_order() {
        let outcomes = vec![
            item("etcd", "etcd-leader", CheckOutcome::critical("etcd down")),
            item("Nodes", "node-check", {
                CheckOutcome::warning("Nodes 2/3 Ready, 0 pressure issues")
                    .with_detail("total", 3)
                    .with_detail("ready", 2)
            }),
            item("Mystery", "custom", CheckOutcome::new(Severity::Unknown, "no data")),
            item("API", "api-server", CheckOutcome::healthy("API Server is healthy")),
        ];

        let record = CheckRecord::assemble(
            "dev",
            "Dev",
            CheckMode::Addons,
            outcomes,
            Duration::from_millis(15),
        );

        assert_eq!(record.overall, Severity::Critical);
        assert_eq!(record.errors, vec!["[etcd] etcd down"]);
        assert_eq!(
            record.warnings,
            vec![
                "[Nodes] Nodes 2/3 Ready, 0 pressure issues",
                "[Mystery] no data"
            ]
        );
        assert_eq!(record.total_nodes, Some(3));
        assert_eq!(record.ready_nodes, Some(2));
        assert_eq!(record.count(Severity::Healthy), 1);
        assert!(record.outcome("API").is_some());
    }

    #[test]
    fn test_record_without_node_probe_has_no_counts() {
        let record = CheckRecord::assemble(
            "dev",
            "Dev",
            CheckMode::Daily {
                schedule: ScheduleType::Morning,
            },
            vec![],
            Duration::ZERO,
        );
        assert_eq!(record.overall, Severity::Healthy);
        assert!(record.total_nodes.is_none());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["mode"]["mode"], "daily");
        assert_eq!(json["mode"]["schedule"], "morning");
    }

    #[test]
    fn test_schedule_type_parse() {
        assert_eq!("Noon".parse::<ScheduleType>(), Ok(ScheduleType::Noon));
        assert!("midnight".parse::<ScheduleType>().is_err());
    }
}

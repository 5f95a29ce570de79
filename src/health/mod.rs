//! 健康检测核心模块
//!
//! 探针注册表、调度器、严重级别聚合和编排器

pub mod aggregator;
pub mod cluster;
pub mod dispatcher;
pub mod orchestrator;
pub mod outcome;
pub mod probe;
pub mod record;
pub mod registry;
pub mod target;

// 重新导出主要类型
pub use aggregator::{aggregate, aggregate_outcomes};
pub use cluster::ClusterHandle;
pub use dispatcher::{AddonOutcome, Dispatcher};
pub use orchestrator::{HealthOrchestrator, StaticTargetSource, TargetSource};
pub use outcome::{CheckOutcome, Details, Severity};
pub use probe::{Probe, ProbeCategory, ProbeDescriptor};
pub use record::{CheckMode, CheckRecord, ScheduleType};
pub use registry::{ProbeFactory, ProbeRegistry};
pub use target::{AddonSpec, ClusterTarget, EffectiveSettings};

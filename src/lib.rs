//! Cluster Vitals - Kubernetes 集群与插件健康检测工具
//!
//! 按集群注册的插件运行可插拔的探针，支持：
//! - 控制面、etcd、节点和系统组件检测
//! - MinIO、ArgoCD、Jenkins、Nexus、Keycloak 等插件探针
//! - 未注册插件的脚本与 HTTP 回退检测
//! - 严重级别聚合与检测记录持久化
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod probes;
pub mod store;

// 重新导出主要类型
pub use config::{Config, GlobalConfig};
pub use error::{ClusterVitalsError, ProbeError};
pub use health::{
    CheckOutcome, CheckRecord, Dispatcher, HealthOrchestrator, Probe, ProbeRegistry, Severity,
};
pub use store::{JsonlRecordStore, MemoryRecordStore, RecordStore};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

//! 配置管理模块
//!
//! 提供配置文件解析、验证以及作为集群目标来源的适配

pub mod loader;
pub mod source;
pub mod types;

// 重新导出主要类型
pub use loader::{get_default_config_path, ConfigLoader, TomlConfigLoader};
pub use source::ConfigTargetSource;
pub use types::{validate_config, AddonEntry, ClusterEntry, Config, DailyCheckSettings, GlobalConfig};

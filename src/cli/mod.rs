//! 命令行接口模块
//!
//! 定义命令行参数和各子命令的处理逻辑

pub mod args;
pub mod commands;

pub use args::{Args, Commands, LogLevel, OutputFormat};
pub use commands::{build_orchestrator, command_for, load_config, Command};

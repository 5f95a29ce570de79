//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// Cluster Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum ClusterVitalsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 探针相关错误
    #[error("探针错误: {0}")]
    Probe(#[from] ProbeError),

    /// 编排相关错误
    #[error("编排错误: {0}")]
    Orchestrator(#[from] OrchestratorError),

    /// 存储相关错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 探针执行错误
///
/// 这些错误永远不会越过调度器边界，调度器会把它们转换成 critical 结果。
/// 显示文本会进入检测结果的 message，因此使用英文。
#[derive(Error, Debug)]
pub enum ProbeError {
    /// HTTP请求错误
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Kubernetes API 错误
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Kubernetes 客户端配置错误
    #[error("Kubernetes client config error: {0}")]
    KubeConfig(String),

    /// 子进程启动或执行失败
    #[error("command `{program}` failed: {message}")]
    Command { program: String, message: String },

    /// 外部工具输出解析失败
    #[error("parse error: {0}")]
    Parse(String),

    /// 超时
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// 其他不可用情况
    #[error("{0}")]
    Unavailable(String),
}

impl ProbeError {
    /// 是否为超时类错误
    pub fn is_timeout(&self) -> bool {
        match self {
            ProbeError::Timeout(_) => true,
            ProbeError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// 错误类别名称，写入结果详情
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Http(e) if e.is_connect() => "ConnectError",
            ProbeError::Http(_) => "HttpError",
            ProbeError::Kube(_) => "KubeError",
            ProbeError::KubeConfig(_) => "KubeConfigError",
            ProbeError::Command { .. } => "CommandError",
            ProbeError::Parse(_) => "ParseError",
            ProbeError::Timeout(_) => "Timeout",
            ProbeError::Unavailable(_) => "Unavailable",
        }
    }
}

/// 编排错误类型
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// 集群目标不存在
    #[error("集群不存在: {0}")]
    ClusterNotFound(String),
}

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    /// 存储IO错误
    #[error("存储IO失败: {0}")]
    Io(#[from] std::io::Error),

    /// 记录序列化错误
    #[error("记录序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ClusterVitalsError>;

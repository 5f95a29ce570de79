//! 集群连接句柄
//!
//! 每次编排过程独占一个句柄：HTTP 客户端共享连接池，
//! Kubernetes 客户端在第一次使用时创建并在本次过程内复用

use crate::error::ProbeError;
use crate::health::target::ClusterTarget;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// 创建探针使用的 HTTP 客户端
///
/// 集群 API 通常使用自签名证书，因此不校验证书。
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ProbeError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(true)
        .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
        .build()?;
    Ok(client)
}

/// 单个集群在一次编排过程中的连接句柄
pub struct ClusterHandle {
    target: ClusterTarget,
    http: reqwest::Client,
    kube: OnceCell<Client>,
}

impl ClusterHandle {
    pub fn new(target: ClusterTarget, http: reqwest::Client) -> Self {
        Self {
            target,
            http,
            kube: OnceCell::new(),
        }
    }

    /// 使用已有的 Kubernetes 客户端创建句柄
    pub fn with_kube_client(target: ClusterTarget, http: reqwest::Client, client: Client) -> Self {
        Self {
            target,
            http,
            kube: OnceCell::new_with(Some(client)),
        }
    }

    pub fn target(&self) -> &ClusterTarget {
        &self.target
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// 获取（必要时创建）Kubernetes 客户端
    pub async fn kube_client(&self) -> Result<Client, ProbeError> {
        let client = self
            .kube
            .get_or_try_init(|| async { Self::connect(&self.target).await })
            .await?;
        Ok(client.clone())
    }

    async fn connect(target: &ClusterTarget) -> Result<Client, ProbeError> {
        let config = match kubeconfig_source(target) {
            Some(path) => {
                debug!("使用 kubeconfig 连接集群 {}: {}", target.name, path.display());
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    ProbeError::KubeConfig(format!("failed to read {}: {}", path.display(), e))
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| ProbeError::KubeConfig(e.to_string()))?
            }
            None => {
                debug!("推断集群 {} 的 Kubernetes 配置", target.name);
                Config::infer()
                    .await
                    .map_err(|e| ProbeError::KubeConfig(e.to_string()))?
            }
        };

        Ok(Client::try_from(config)?)
    }
}

/// 选择集群使用的 kubeconfig 文件
///
/// 配置了路径但文件不存在时记录警告，并退回到推断配置。
fn kubeconfig_source(target: &ClusterTarget) -> Option<&Path> {
    let path = target.kubeconfig_path.as_deref()?;
    if path.exists() {
        Some(path)
    } else {
        warn!(
            "集群 {} 的 kubeconfig 不存在: {}，改用推断配置",
            target.name,
            path.display()
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_builds() {
        assert!(build_http_client(Duration::from_secs(5)).is_ok());
    }

    #[tokio::test]
    async fn test_missing_kubeconfig_reports_config_error() {
        let mut target = ClusterTarget::new("dev", "Dev", "https://127.0.0.1:6443");
        target.kubeconfig_path = Some("/nonexistent/kubeconfig".into());

        let handle = ClusterHandle::new(target, reqwest::Client::new());
        // 没有可用配置时只返回错误，不会 panic
        if let Err(e) = handle.kube_client().await {
            assert!(matches!(e, ProbeError::KubeConfig(_) | ProbeError::Kube(_)));
        }
    }

    #[test]
    fn test_kubeconfig_source_falls_back_when_file_is_missing() {
        let mut target = ClusterTarget::new("dev", "Dev", "https://127.0.0.1:6443");
        assert!(kubeconfig_source(&target).is_none());

        target.kubeconfig_path = Some("/nonexistent/kubeconfig".into());
        assert!(kubeconfig_source(&target).is_none());

        let file = tempfile::NamedTempFile::new().unwrap();
        target.kubeconfig_path = Some(file.path().to_path_buf());
        assert_eq!(kubeconfig_source(&target), Some(file.path()));
    }
}

//! MinIO 探针
//!
//! 通过 MinIO 客户端 `mc admin info --json` 获取服务器、磁盘和容量信息。
//! 配置了 `minio_endpoint` 时先执行 `mc alias set`。

use crate::error::ProbeError;
use crate::health::cluster::ClusterHandle;
use crate::health::outcome::{elapsed_ms, truncate, CheckOutcome, DETAIL_TEXT_LIMIT};
use crate::health::probe::{Probe, ProbeCategory, ProbeDescriptor};
use crate::health::target::{AddonSpec, ClusterTarget, EffectiveSettings};
use crate::probes::human_readable_size;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::process::Output;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// 默认 mc alias
pub const DEFAULT_ALIAS: &str = "myminio";

const ALIAS_TIMEOUT: Duration = Duration::from_secs(10);
const INFO_TIMEOUT: Duration = Duration::from_secs(30);

/// 容量信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub total_human: String,
    pub used_human: String,
    pub percent: f64,
}

/// `mc admin info` 的解析结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinioInfo {
    /// online、degraded
    pub state: String,
    pub version: String,
    pub uptime: Value,
    pub servers_count: usize,
    pub disks_total: usize,
    pub disks_online: usize,
    pub usage: Option<StorageUsage>,
    pub buckets: u64,
    pub objects: u64,
}

/// 解析 `mc admin info --json` 输出
pub fn parse_admin_info(raw: &str) -> Result<MinioInfo, ProbeError> {
    let data: Value = serde_json::from_str(raw.trim())
        .map_err(|e| ProbeError::Parse(format!("JSON parse error: {e}")))?;
    let info = data.get("info").cloned().unwrap_or(Value::Null);
    let servers = info
        .get("servers")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut state = "online";
    let (mut disks_total, mut disks_online) = (0, 0);
    let (mut total_space, mut used_space) = (0u64, 0u64);

    for server in &servers {
        if server.get("state").and_then(Value::as_str) != Some("online") {
            state = "degraded";
        }
        for drive in server.get("drives").and_then(Value::as_array).into_iter().flatten() {
            disks_total += 1;
            if drive.get("state").and_then(Value::as_str) == Some("ok") {
                disks_online += 1;
            }
            total_space += drive.get("totalspace").and_then(Value::as_u64).unwrap_or(0);
            used_space += drive.get("usedspace").and_then(Value::as_u64).unwrap_or(0);
        }
    }

    let usage = (total_space > 0).then(|| StorageUsage {
        total_bytes: total_space,
        used_bytes: used_space,
        total_human: human_readable_size(total_space),
        used_human: human_readable_size(used_space),
        percent: (used_space as f64 / total_space as f64 * 10000.0).round() / 100.0,
    });

    Ok(MinioInfo {
        state: state.to_string(),
        version: info
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        uptime: info.get("uptime").cloned().unwrap_or(Value::from("unknown")),
        servers_count: servers.len(),
        disks_total,
        disks_online,
        usage,
        buckets: info.pointer("/buckets/count").and_then(Value::as_u64).unwrap_or(0),
        objects: info.pointer("/objects/count").and_then(Value::as_u64).unwrap_or(0),
    })
}

/// MinIO 分类规则
///
/// online 且磁盘全部在线 ⇒ healthy；磁盘部分离线或其他非 offline 状态 ⇒ warning；
/// offline 或命令失败 ⇒ critical。
pub fn classify_minio(info: Result<&MinioInfo, &str>) -> CheckOutcome {
    let info = match info {
        Ok(info) => info,
        Err(error) => {
            let error = truncate(error, DETAIL_TEXT_LIMIT);
            return CheckOutcome::critical(format!("Server info failed: {error}"))
                .with_detail("server_info", json!({ "error": error }));
        }
    };

    let mut messages = Vec::new();
    let outcome = match info.state.as_str() {
        "online" => {
            messages.push("MinIO server online".to_string());
            let degraded = info.disks_total > 0 && info.disks_online < info.disks_total;
            if degraded {
                messages.push(format!("Disks: {}/{} online", info.disks_online, info.disks_total));
            } else if info.disks_total > 0 {
                messages.push(format!("All {} disks online", info.disks_total));
            }
            if let Some(usage) = &info.usage {
                messages.push(format!("Storage: {}/{}", usage.used_human, usage.total_human));
            }
            if degraded {
                CheckOutcome::warning(messages.join("; "))
            } else {
                CheckOutcome::healthy(messages.join("; "))
            }
        }
        "offline" => CheckOutcome::critical("MinIO server offline"),
        other => CheckOutcome::warning(format!("MinIO state: {other}")),
    };

    outcome.with_detail(
        "server_info",
        serde_json::to_value(info).unwrap_or_default(),
    )
}

/// 从失败的 mc 输出中提取错误信息，JSON 错误优先
fn mc_error(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let raw = if stdout.trim().is_empty() { &stderr } else { &stdout };

    serde_json::from_str::<Value>(raw.trim())
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| stderr.trim().to_string())
}

/// MinIO 探针
pub struct MinioProbe {
    binary: String,
    alias: String,
    endpoint: Option<String>,
    access_key: String,
    secret_key: String,
}

impl MinioProbe {
    pub const KIND: &'static str = "minio";

    pub fn descriptor() -> ProbeDescriptor {
        ProbeDescriptor::new(Self::KIND, ProbeCategory::Storage, "MinIO")
            .with_description("MinIO S3 Object Storage")
            .with_icon("🪣")
    }

    pub fn new(target: &ClusterTarget, addon: &AddonSpec) -> Self {
        let settings = EffectiveSettings::resolve(target, addon);
        let text = |key: &str| settings.str(key).unwrap_or_default().to_string();
        Self {
            binary: settings.str("mc_binary").unwrap_or("mc").to_string(),
            alias: settings.str("minio_alias").unwrap_or(DEFAULT_ALIAS).to_string(),
            endpoint: settings.str("minio_endpoint").map(str::to_string),
            access_key: text("minio_access_key"),
            secret_key: text("minio_secret_key"),
        }
    }

    async fn run_mc(&self, args: &[&str], limit: Duration) -> Result<Output, ProbeError> {
        debug!("执行 mc 命令: {:?}", args.first());
        let child = Command::new(&self.binary).args(args).kill_on_drop(true).output();
        match tokio::time::timeout(limit, child).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ProbeError::Unavailable("mc client not found".to_string()))
            }
            Ok(Err(e)) => Err(ProbeError::Command {
                program: self.binary.clone(),
                message: e.to_string(),
            }),
            Err(_) => Err(ProbeError::Timeout(limit)),
        }
    }

    async fn setup_alias(&self, endpoint: &str) -> Result<(), String> {
        let args = [
            "alias",
            "set",
            self.alias.as_str(),
            endpoint,
            self.access_key.as_str(),
            self.secret_key.as_str(),
            "--api",
            "S3v4",
        ];
        match self.run_mc(&args, ALIAS_TIMEOUT).await {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => Err(String::from_utf8_lossy(&output.stderr).trim().to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn admin_info(&self) -> Result<MinioInfo, String> {
        let output = self
            .run_mc(&["admin", "info", self.alias.as_str(), "--json"], INFO_TIMEOUT)
            .await
            .map_err(|e| e.to_string())?;
        if !output.status.success() {
            return Err(mc_error(&output));
        }
        parse_admin_info(&String::from_utf8_lossy(&output.stdout)).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Probe for MinioProbe {
    async fn check(&self, _cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
        let start = Instant::now();

        if let Some(endpoint) = &self.endpoint {
            if let Err(error) = self.setup_alias(endpoint).await {
                let error = truncate(&error, DETAIL_TEXT_LIMIT);
                return Ok(CheckOutcome::critical(format!("Failed to setup mc alias: {error}"))
                    .with_detail("success", false)
                    .with_detail("error", error)
                    .with_response_time_ms(elapsed_ms(start)));
            }
        }

        let info = self.admin_info().await;
        Ok(classify_minio(info.as_ref().map_err(String::as_str)).with_response_time_ms(elapsed_ms(start)))
    }

    fn timeout(&self) -> Option<Duration> {
        Some(ALIAS_TIMEOUT + INFO_TIMEOUT + Duration::from_secs(5))
    }
}

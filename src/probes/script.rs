//! 回退脚本探针
//!
//! `*.yml`/`*.yaml` 通过 ansible-playbook 执行，其他路径直接执行，
//! 参数为集群名称和 API 地址

use crate::error::ProbeError;
use crate::health::cluster::ClusterHandle;
use crate::health::outcome::{truncate, CheckOutcome, DETAIL_TEXT_LIMIT, MESSAGE_TEXT_LIMIT};
use crate::health::probe::Probe;
use crate::health::target::{AddonSpec, ClusterTarget, EffectiveSettings};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// 根据退出状态和输出分类
///
/// 退出码 0 ⇒ healthy，消息为标准输出最后一行；非 0 ⇒ warning，附带截断的标准错误。
pub fn classify_script(addon: &str, success: bool, exit_code: Option<i32>, stdout: &str, stderr: &str) -> CheckOutcome {
    let last_line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    let summary = if last_line.contains("PLAY RECAP") {
        "Check completed"
    } else {
        last_line
    };

    let outcome = if success {
        let message = if summary.is_empty() {
            format!("{addon} check passed")
        } else {
            truncate(summary, MESSAGE_TEXT_LIMIT)
        };
        CheckOutcome::healthy(message)
    } else {
        CheckOutcome::warning(format!(
            "{addon} failed: {}",
            truncate(stderr.trim(), MESSAGE_TEXT_LIMIT)
        ))
    };

    let outcome = match exit_code {
        Some(code) => outcome.with_detail("exit_code", code),
        None => outcome,
    };
    if summary.is_empty() {
        outcome
    } else {
        outcome.with_detail("result", truncate(summary, DETAIL_TEXT_LIMIT))
    }
}

fn is_playbook(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml")
    )
}

/// 回退脚本探针
pub struct ScriptProbe {
    addon_name: String,
    script: PathBuf,
    cluster_name: String,
    api_endpoint: String,
    inventory: Option<String>,
}

impl ScriptProbe {
    pub fn new(target: &ClusterTarget, addon: &AddonSpec, script: &Path) -> Self {
        let settings = EffectiveSettings::resolve(target, addon);
        Self {
            addon_name: addon.name.clone(),
            script: script.to_path_buf(),
            cluster_name: target.name.clone(),
            api_endpoint: target.api_endpoint.clone(),
            inventory: settings.str("inventory").map(str::to_string),
        }
    }

    /// 构造要执行的命令
    pub fn command(&self) -> (String, Vec<String>) {
        if is_playbook(&self.script) {
            let mut args = vec![self.script.display().to_string()];
            if let Some(inventory) = &self.inventory {
                args.push("-i".to_string());
                args.push(inventory.clone());
            }
            args.extend([
                "-e".to_string(),
                format!("target_cluster={}", self.cluster_name),
                "-e".to_string(),
                format!("api_endpoint={}", self.api_endpoint),
            ]);
            ("ansible-playbook".to_string(), args)
        } else {
            (
                self.script.display().to_string(),
                vec![self.cluster_name.clone(), self.api_endpoint.clone()],
            )
        }
    }
}

#[async_trait]
impl Probe for ScriptProbe {
    async fn check(&self, _cluster: &ClusterHandle) -> Result<CheckOutcome, ProbeError> {
        let (program, args) = self.command();
        debug!("执行回退脚本: {} {:?}", program, args);

        let output = Command::new(&program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProbeError::Command {
                program: program.clone(),
                message: e.to_string(),
            })?;

        Ok(classify_script(
            &self.addon_name,
            output.status.success(),
            output.status.code(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        ))
    }
}

//! 检测结果数据结构
//!
//! 定义严重级别和单次探针执行的归一化结果

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// 嵌入详情的原始诊断文本上限（字符）
pub const DETAIL_TEXT_LIMIT: usize = 300;

/// 嵌入消息的错误文本上限（字符）
pub const MESSAGE_TEXT_LIMIT: usize = 200;

/// 结果详情：开放的键值表，未知字段不影响消费者
pub type Details = HashMap<String, Value>;

/// 严重级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 正常
    Healthy,
    /// 警告
    Warning,
    /// 严重
    Critical,
    /// 未知
    Unknown,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Healthy => write!(f, "healthy"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
            Severity::Unknown => write!(f, "unknown"),
        }
    }
}

impl Severity {
    /// 判断状态是否为健康
    pub fn is_healthy(&self) -> bool {
        matches!(self, Severity::Healthy)
    }

    /// 聚合排序权重：critical > unknown > warning > healthy
    ///
    /// unknown 在聚合时按 warning 处理，权重只用于挑选最差的单项。
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Healthy => 0,
            Severity::Warning => 1,
            Severity::Unknown => 2,
            Severity::Critical => 3,
        }
    }
}

/// 单次探针执行的归一化结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// 严重级别
    pub severity: Severity,
    /// 简短说明
    pub message: String,
    /// 响应时间（毫秒）
    pub response_time_ms: Option<u64>,
    /// 探针特定的诊断数据；仅当探针在产出任何数据前崩溃时为空
    pub details: Option<Details>,
}

impl CheckOutcome {
    /// 创建新的检测结果，详情为空表
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            response_time_ms: None,
            details: Some(HashMap::new()),
        }
    }

    pub fn healthy(message: impl Into<String>) -> Self {
        Self::new(Severity::Healthy, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(Severity::Critical, message)
    }

    /// 探针崩溃、没有任何数据时的结果，严重级别固定为 critical
    pub fn crashed(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Critical,
            message: message.into(),
            response_time_ms: None,
            details: None,
        }
    }

    /// 设置响应时间
    pub fn with_response_time(mut self, response_time: Duration) -> Self {
        self.response_time_ms = Some(response_time.as_millis() as u64);
        self
    }

    /// 设置响应时间（毫秒）
    pub fn with_response_time_ms(mut self, millis: u64) -> Self {
        self.response_time_ms = Some(millis);
        self
    }

    /// 添加详情字段
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// 合并一组详情字段
    pub fn with_details(mut self, details: Details) -> Self {
        self.details.get_or_insert_with(HashMap::new).extend(details);
        self
    }

    /// 读取详情字段
    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.as_ref().and_then(|d| d.get(key))
    }

    pub fn detail_u64(&self, key: &str) -> Option<u64> {
        self.detail(key).and_then(Value::as_u64)
    }

    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.detail(key).and_then(Value::as_str)
    }

    pub fn detail_bool(&self, key: &str) -> Option<bool> {
        self.detail(key).and_then(Value::as_bool)
    }
}

/// 按字符截断文本，超出部分以省略号结尾
pub fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(limit).collect();
    truncated.push('…');
    truncated
}

/// 计算耗时（毫秒）
pub fn elapsed_ms(start: std::time::Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Duration序列化模块
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

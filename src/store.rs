//! 检测记录存储
//!
//! 编排器只依赖 `RecordStore` 接口：写入记录、更新集群当前状态，
//! 以及为报表提供只读查询

use crate::error::StoreError;
use crate::health::outcome::Severity;
use crate::health::record::CheckRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// 集群当前状态指针
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// 集群标识
    pub cluster_id: String,
    /// 最近一次检测的整体状态
    pub status: Severity,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

/// 检测记录存储接口
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 保存一条检测记录
    async fn save(&self, record: &CheckRecord) -> Result<(), StoreError>;

    /// 更新集群当前状态
    async fn set_cluster_status(
        &self,
        cluster_id: &str,
        status: Severity,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// 读取集群当前状态
    async fn cluster_status(&self, cluster_id: &str) -> Result<Option<ClusterStatus>, StoreError>;

    /// 读取集群最近一条记录
    async fn latest(&self, cluster_id: &str) -> Result<Option<CheckRecord>, StoreError>;

    /// 按时间范围列出集群记录（闭区间，按检测时间升序）
    async fn list_range(
        &self,
        cluster_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<CheckRecord>, StoreError>;
}

fn in_range(at: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    from.map_or(true, |from| at >= from) && to.map_or(true, |to| at <= to)
}

/// 内存存储，用于测试和一次性运行
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<String, Vec<CheckRecord>>>,
    statuses: RwLock<HashMap<String, ClusterStatus>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn save(&self, record: &CheckRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .entry(record.cluster_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn set_cluster_status(
        &self,
        cluster_id: &str,
        status: Severity,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.statuses.write().await.insert(
            cluster_id.to_string(),
            ClusterStatus {
                cluster_id: cluster_id.to_string(),
                status,
                updated_at: at,
            },
        );
        Ok(())
    }

    async fn cluster_status(&self, cluster_id: &str) -> Result<Option<ClusterStatus>, StoreError> {
        Ok(self.statuses.read().await.get(cluster_id).cloned())
    }

    async fn latest(&self, cluster_id: &str) -> Result<Option<CheckRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .get(cluster_id)
            .and_then(|records| records.iter().max_by_key(|r| r.checked_at).cloned()))
    }

    async fn list_range(
        &self,
        cluster_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<CheckRecord>, StoreError> {
        let mut records: Vec<CheckRecord> = self
            .records
            .read()
            .await
            .get(cluster_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| in_range(r.checked_at, from, to))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by_key(|r| r.checked_at);
        Ok(records)
    }
}

/// JSON Lines 文件存储
///
/// 每个集群一个 `<cluster_id>.jsonl` 文件，当前状态集中保存在 `status.json`。
#[derive(Debug)]
pub struct JsonlRecordStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRecordStore {
    /// 创建文件存储，目录不存在时自动创建
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        debug!("记录存储目录: {}", dir.display());
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 集群 ID 到文件名的映射是可逆的，不同 ID 不会落到同一个文件
    fn records_path(&self, cluster_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", encode_file_stem(cluster_id)))
    }

    fn status_path(&self) -> PathBuf {
        self.dir.join("status.json")
    }

    async fn read_records(&self, cluster_id: &str) -> Result<Vec<CheckRecord>, StoreError> {
        let path = self.records_path(cluster_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<CheckRecord>(line).map_err(StoreError::from))
            .filter(|record| record.as_ref().map_or(true, |r| r.cluster_id == cluster_id))
            .collect()
    }

    async fn read_statuses(&self) -> Result<HashMap<String, ClusterStatus>, StoreError> {
        match tokio::fs::read_to_string(self.status_path()).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// 字母、数字、`-` 和 `_` 原样保留，其余字节编码为 `%XX`
fn encode_file_stem(cluster_id: &str) -> String {
    let mut stem = String::with_capacity(cluster_id.len());
    for byte in cluster_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

#[async_trait]
impl RecordStore for JsonlRecordStore {
    async fn save(&self, record: &CheckRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.records_path(&record.cluster_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn set_cluster_status(
        &self,
        cluster_id: &str,
        status: Severity,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut statuses = self.read_statuses().await?;
        statuses.insert(
            cluster_id.to_string(),
            ClusterStatus {
                cluster_id: cluster_id.to_string(),
                status,
                updated_at: at,
            },
        );

        // 先写临时文件再替换
        let json = serde_json::to_string_pretty(&statuses)?;
        let tmp = self.dir.join("status.json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, self.status_path()).await?;
        Ok(())
    }

    async fn cluster_status(&self, cluster_id: &str) -> Result<Option<ClusterStatus>, StoreError> {
        Ok(self.read_statuses().await?.remove(cluster_id))
    }

    async fn latest(&self, cluster_id: &str) -> Result<Option<CheckRecord>, StoreError> {
        Ok(self
            .read_records(cluster_id)
            .await?
            .into_iter()
            .max_by_key(|r| r.checked_at))
    }

    async fn list_range(
        &self,
        cluster_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<CheckRecord>, StoreError> {
        let mut records: Vec<CheckRecord> = self
            .read_records(cluster_id)
            .await?
            .into_iter()
            .filter(|r| in_range(r.checked_at, from, to))
            .collect();
        records.sort_by_key(|r| r.checked_at);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::record::CheckMode;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;
    use tempfile::TempDir;

    fn record(cluster: &str, at: DateTime<Utc>) -> CheckRecord {
        let mut record =
            CheckRecord::assemble(cluster, cluster, CheckMode::Addons, vec![], Duration::ZERO);
        record.checked_at = at;
        record
    }

    async fn exercise(store: &dyn RecordStore) {
        let now = Utc::now();
        let older = record("prod", now - ChronoDuration::hours(2));
        let newer = record("prod", now);
        store.save(&newer).await.unwrap();
        store.save(&older).await.unwrap();
        store.save(&record("dev", now)).await.unwrap();

        assert_eq!(store.latest("prod").await.unwrap().unwrap().id, newer.id);
        assert!(store.latest("missing").await.unwrap().is_none());

        let all = store.list_range("prod", None, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, older.id);

        let recent = store
            .list_range("prod", Some(now - ChronoDuration::hours(1)), None)
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);

        store
            .set_cluster_status("prod", Severity::Warning, now)
            .await
            .unwrap();
        store
            .set_cluster_status("prod", Severity::Critical, now)
            .await
            .unwrap();
        let status = store.cluster_status("prod").await.unwrap().unwrap();
        assert_eq!(status.status, Severity::Critical);
        assert!(store.cluster_status("dev").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store() {
        exercise(&MemoryRecordStore::new()).await;
    }

    #[tokio::test]
    async fn test_jsonl_store() {
        let dir = TempDir::new().unwrap();
        let store = JsonlRecordStore::open(dir.path().join("records")).await.unwrap();
        exercise(&store).await;

        assert!(store.dir().join("prod.jsonl").exists());
        assert!(store.dir().join("status.json").exists());
    }

    #[tokio::test]
    async fn test_jsonl_store_encodes_file_names() {
        let dir = TempDir::new().unwrap();
        let store = JsonlRecordStore::open(dir.path()).await.unwrap();
        store.save(&record("team/a b", Utc::now())).await.unwrap();

        assert!(dir.path().join("team%2Fa%20b.jsonl").exists());
        assert_eq!(store.list_range("team/a b", None, None).await.unwrap().len(), 1);
        assert_eq!(encode_file_stem("../etc"), "%2E%2E%2Fetc");
    }

    #[tokio::test]
    async fn test_jsonl_store_keeps_similar_cluster_ids_apart() {
        let dir = TempDir::new().unwrap();
        let store = JsonlRecordStore::open(dir.path()).await.unwrap();
        let now = Utc::now();

        let slash = record("team/a", now);
        store.save(&slash).await.unwrap();
        assert!(store.latest("team_a").await.unwrap().is_none());
        assert!(store.latest("team a").await.unwrap().is_none());

        let underscore = record("team_a", now - ChronoDuration::minutes(5));
        let spaced = record("team a", now - ChronoDuration::minutes(10));
        store.save(&underscore).await.unwrap();
        store.save(&spaced).await.unwrap();

        for (cluster, expected) in [("team/a", &slash), ("team_a", &underscore), ("team a", &spaced)] {
            assert_eq!(store.latest(cluster).await.unwrap().unwrap().id, expected.id);
            let all = store.list_range(cluster, None, None).await.unwrap();
            assert_eq!(all.len(), 1, "{cluster}");
            assert_eq!(all[0].cluster_id, cluster);
        }
    }

    #[tokio::test]
    async fn test_jsonl_store_skips_foreign_records_in_file() {
        let dir = TempDir::new().unwrap();
        let store = JsonlRecordStore::open(dir.path()).await.unwrap();
        let foreign = serde_json::to_string(&record("other", Utc::now())).unwrap();
        tokio::fs::write(dir.path().join("prod.jsonl"), format!("{foreign}\n"))
            .await
            .unwrap();

        assert!(store.latest("prod").await.unwrap().is_none());
    }
}

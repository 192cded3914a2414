//! 文件存储后端
//!
//! 装饰任意 Storage：每次写入先追加一条日志记录，再转发给被包装的存储。
//! 追加失败会在触碰内层存储之前中止调用，因此日志不会落后于内存视图；
//! 反方向的偏差（日志已写、进程在内存写入前崩溃）由启动回放修复。

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::errors::{Result, ShortenerError};
use crate::storage::models::{BatchItem, JournalRecord, OwnedUrl, derive_id};
use crate::storage::{Storage, StorageTransaction};

pub struct FileStorage {
    inner: Arc<dyn Storage>,
    path: PathBuf,
    /// 追加句柄，单一生产者；内层存储的锁已经串行化了写入方
    journal: Mutex<File>,
}

impl FileStorage {
    pub fn new(inner: Arc<dyn Storage>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                ShortenerError::file_operation(format!("open journal {}: {}", path.display(), e))
            })?;

        Ok(Self {
            inner,
            path,
            journal: Mutex::new(journal),
        })
    }

    fn append(&self, record: &JournalRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut journal = self.journal.lock();
        journal.write_all(line.as_bytes()).map_err(|e| {
            ShortenerError::file_operation(format!("append journal {}: {}", self.path.display(), e))
        })?;
        journal.flush().map_err(|e| {
            ShortenerError::file_operation(format!("flush journal {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }

    // 回放时冲突是预期的：同一标识会被重复遇到
    fn ignore_conflict(res: Result<Uuid>) -> Result<()> {
        match res {
            Ok(_) => Ok(()),
            Err(e) if e.is_conflict() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn save(&self, tx: Option<&StorageTransaction>, id: Uuid, url: &Url) -> Result<Uuid> {
        self.append(&JournalRecord {
            id,
            short_url: id.to_string(),
            original_url: url.to_string(),
        })?;

        self.inner.save(tx, id, url).await
    }

    async fn save_user(
        &self,
        tx: Option<&StorageTransaction>,
        user_id: Uuid,
        id: Uuid,
        url: &Url,
    ) -> Result<Uuid> {
        self.append(&JournalRecord {
            id: user_id,
            short_url: id.to_string(),
            original_url: url.to_string(),
        })?;

        self.inner.save_user(tx, user_id, id, url).await
    }

    async fn save_batch(&self, batch: &[BatchItem]) -> Result<()> {
        if batch.is_empty() {
            return Err(ShortenerError::batch_empty(
                "save batch in file storage: batch is empty",
            ));
        }

        for item in batch {
            let url = Url::parse(&item.original_url).map_err(|_| {
                ShortenerError::url_not_valid(format!(
                    "save batch in file storage: {}",
                    item.original_url
                ))
            })?;
            let id = derive_id(&url);

            self.append(&JournalRecord {
                id,
                short_url: id.to_string(),
                original_url: url.to_string(),
            })?;
            Self::ignore_conflict(self.inner.save(None, id, &url).await)?;
        }
        Ok(())
    }

    async fn save_batch_user(&self, user_id: Uuid, batch: &[BatchItem]) -> Result<()> {
        if batch.is_empty() {
            return Err(ShortenerError::batch_empty(
                "save batch in file storage: batch is empty",
            ));
        }

        for item in batch {
            let url = Url::parse(&item.original_url).map_err(|_| {
                ShortenerError::url_not_valid(format!(
                    "save batch in file storage: {}",
                    item.original_url
                ))
            })?;
            let id = derive_id(&url);

            self.append(&JournalRecord {
                id: user_id,
                short_url: id.to_string(),
                original_url: url.to_string(),
            })?;
            Self::ignore_conflict(self.inner.save_user(None, user_id, id, &url).await)?;
        }
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Url> {
        self.inner.get_by_id(id).await
    }

    async fn get_all_by_user_id(&self, user_id: Uuid) -> Result<Vec<OwnedUrl>> {
        self.inner.get_all_by_user_id(user_id).await
    }

    async fn delete_batch_by_user_id(&self, user_id: Uuid, ids: &[Uuid]) -> Result<()> {
        self.inner.delete_batch_by_user_id(user_id, ids).await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    /// 按顺序回放日志，重建被包装存储的状态
    ///
    /// 记录的 uuid 字段等于 short_url 时是匿名保存，否则 uuid 是所有者。
    /// 除文件结尾外的回放失败对启动是致命的。
    async fn load(&self) -> Result<()> {
        let file = File::open(&self.path).map_err(|e| {
            ShortenerError::file_operation(format!("open journal {}: {}", self.path.display(), e))
        })?;

        let mut replayed = 0usize;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| {
                ShortenerError::file_operation(format!(
                    "read journal {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let record: JournalRecord = serde_json::from_str(&line).map_err(|e| {
                ShortenerError::serialization(format!("deserialize journal record: {}", e))
            })?;
            let id = Uuid::parse_str(&record.short_url).map_err(|e| {
                ShortenerError::serialization(format!("journal record short_url: {}", e))
            })?;
            let url = Url::parse(&record.original_url).map_err(|_| {
                ShortenerError::url_not_valid(format!(
                    "replay journal record: {}",
                    record.original_url
                ))
            })?;

            if record.id == id {
                Self::ignore_conflict(self.inner.save(None, id, &url).await)?;
            } else {
                Self::ignore_conflict(self.inner.save_user(None, record.id, id, &url).await)?;
            }
            replayed += 1;
        }

        info!("Replayed {} journal records from {}", replayed, self.path.display());
        Ok(())
    }
}

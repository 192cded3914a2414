use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::DatabaseTransaction;
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::{Result, ShortenerError};

pub mod backends;
pub mod models;

pub use models::{BatchItem, BatchShortened, DeleteEvent, JournalRecord, OwnedUrl, derive_id};

/// 关系型后端的事务句柄
///
/// 非事务后端的 `begin_tx` 返回 `Ok(None)`，调用方据此直接落盘而不是报错
pub struct StorageTransaction {
    txn: DatabaseTransaction,
}

impl StorageTransaction {
    pub(crate) fn new(txn: DatabaseTransaction) -> Self {
        Self { txn }
    }

    pub(crate) fn conn(&self) -> &DatabaseTransaction {
        &self.txn
    }

    pub async fn commit(self) -> Result<()> {
        self.txn
            .commit()
            .await
            .map_err(|e| ShortenerError::database_operation(format!("commit transaction: {}", e)))
    }

    pub async fn rollback(self) -> Result<()> {
        self.txn
            .rollback()
            .await
            .map_err(|e| ShortenerError::database_operation(format!("rollback transaction: {}", e)))
    }
}

/// 存储契约，三个后端实现同一语义
///
/// - `save` / `save_user` 是 upsert：标识已被映射时仍然写入，同时返回
///   `Conflict` 提示调用方该短链接早已存在
/// - `get_by_id` 区分从未写入（`NotFound`）与已墓碑（`DeleteAccepted`）
/// - `delete_batch_by_user_id` 做软删除，只影响属于该用户的标识
#[async_trait]
pub trait Storage: Send + Sync {
    /// 开始事务，无事务语义的后端返回 `Ok(None)`
    async fn begin_tx(&self) -> Result<Option<StorageTransaction>> {
        Ok(None)
    }

    async fn save(&self, tx: Option<&StorageTransaction>, id: Uuid, url: &Url) -> Result<Uuid>;

    /// 同 `save`，并登记到用户的二级索引；冲突按 (user_id, id) 对判定
    async fn save_user(
        &self,
        tx: Option<&StorageTransaction>,
        user_id: Uuid,
        id: Uuid,
        url: &Url,
    ) -> Result<Uuid>;

    async fn save_batch(&self, batch: &[BatchItem]) -> Result<()>;

    async fn save_batch_user(&self, user_id: Uuid, batch: &[BatchItem]) -> Result<()>;

    async fn get_by_id(&self, id: Uuid) -> Result<Url>;

    /// 返回该用户的全部条目，存活与已墓碑的都在内；未知用户返回 `NotFound`
    async fn get_all_by_user_id(&self, user_id: Uuid) -> Result<Vec<OwnedUrl>>;

    /// 为属于该用户的标识打墓碑；不属于该用户的标识被静默跳过
    async fn delete_batch_by_user_id(&self, user_id: Uuid, ids: &[Uuid]) -> Result<()>;

    async fn ping(&self) -> Result<()>;

    /// 启动时从持久介质重建状态，非文件后端为空操作
    async fn load(&self) -> Result<()> {
        Ok(())
    }
}

pub struct StorageFactory;

impl StorageFactory {
    /// 按配置装配存储后端
    ///
    /// 数据库 DSN 优先；否则内存后端，配置了日志文件时再裹上文件后端并回放
    pub async fn create(config: &Config) -> Result<Arc<dyn Storage>> {
        if !config.storage.database_url.is_empty() {
            let storage = backends::database::DatabaseStorage::new(
                &config.storage.database_url,
                &config.server.base_url,
                config.worker.termination_timeout(),
            )
            .await?;
            return Ok(Arc::new(storage) as Arc<dyn Storage>);
        }

        let memory = Arc::new(backends::memory::MemoryStorage::new(
            &config.server.base_url,
        ));

        if !config.storage.file_storage_path.is_empty() {
            let storage =
                backends::file::FileStorage::new(memory, &config.storage.file_storage_path)?;
            storage.load().await?;
            return Ok(Arc::new(storage) as Arc<dyn Storage>);
        }

        Ok(memory as Arc<dyn Storage>)
    }
}

//! 内存存储后端
//!
//! 主映射与用户二级索引由同一把锁保护，读者不会观察到两者不一致的中间态。
//! 这是默认的快速后端，吞吐优先的场景交给关系型后端。

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;
use uuid::Uuid;

use crate::errors::{Result, ShortenerError};
use crate::storage::models::{BatchItem, OwnedUrl, derive_id};
use crate::storage::{Storage, StorageTransaction};

/// 统一的墓碑表示：条目保留，deleted 置位
///
/// 用户桶里的条目同样置位而不是移除，重复保存同一 (user, id) 仍能判出冲突
#[derive(Debug, Clone)]
struct StoredUrl {
    url: Url,
    deleted: bool,
}

impl StoredUrl {
    fn live(url: &Url) -> Self {
        Self {
            url: url.clone(),
            deleted: false,
        }
    }
}

#[derive(Default)]
struct MemState {
    /// 主映射：标识 -> URL
    urls: HashMap<Uuid, StoredUrl>,
    /// 二级索引：用户 -> (标识 -> URL)，其中每个条目也必须在主映射中
    users: HashMap<Uuid, HashMap<Uuid, StoredUrl>>,
}

pub struct MemoryStorage {
    base_url: String,
    state: Mutex<MemState>,
}

impl MemoryStorage {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            state: Mutex::new(MemState::default()),
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save(&self, _tx: Option<&StorageTransaction>, id: Uuid, url: &Url) -> Result<Uuid> {
        let mut state = self.state.lock();

        // 冲突是建议性的：写入照常进行，已墓碑的条目被复活
        let existed = state.urls.insert(id, StoredUrl::live(url)).is_some();
        if existed {
            return Err(ShortenerError::conflict(format!(
                "save in memory storage: id {} already mapped",
                id
            )));
        }
        Ok(id)
    }

    async fn save_user(
        &self,
        _tx: Option<&StorageTransaction>,
        user_id: Uuid,
        id: Uuid,
        url: &Url,
    ) -> Result<Uuid> {
        let mut state = self.state.lock();

        state.urls.insert(id, StoredUrl::live(url));
        let bucket = state.users.entry(user_id).or_default();
        let existed = bucket.insert(id, StoredUrl::live(url)).is_some();
        if existed {
            return Err(ShortenerError::conflict(format!(
                "save in memory storage: id {} already mapped for user {}",
                id, user_id
            )));
        }
        Ok(id)
    }

    async fn save_batch(&self, batch: &[BatchItem]) -> Result<()> {
        let mut state = self.state.lock();

        if batch.is_empty() {
            return Err(ShortenerError::batch_empty(
                "save batch in memory storage: batch is empty",
            ));
        }

        for item in batch {
            let url = Url::parse(&item.original_url).map_err(|_| {
                ShortenerError::url_not_valid(format!(
                    "save batch in memory storage: {}",
                    item.original_url
                ))
            })?;
            state.urls.insert(derive_id(&url), StoredUrl::live(&url));
        }
        Ok(())
    }

    async fn save_batch_user(&self, user_id: Uuid, batch: &[BatchItem]) -> Result<()> {
        let mut state = self.state.lock();

        if batch.is_empty() {
            return Err(ShortenerError::batch_empty(
                "save batch in memory storage: batch is empty",
            ));
        }

        for item in batch {
            let url = Url::parse(&item.original_url).map_err(|_| {
                ShortenerError::url_not_valid(format!(
                    "save batch in memory storage: {}",
                    item.original_url
                ))
            })?;
            let id = derive_id(&url);
            state.urls.insert(id, StoredUrl::live(&url));
            state
                .users
                .entry(user_id)
                .or_default()
                .insert(id, StoredUrl::live(&url));
        }
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Url> {
        let state = self.state.lock();

        match state.urls.get(&id) {
            None => Err(ShortenerError::not_found(format!(
                "get in memory storage: id {} not found",
                id
            ))),
            Some(entry) if entry.deleted => Err(ShortenerError::delete_accepted(format!(
                "get in memory storage: id {} is deleted",
                id
            ))),
            Some(entry) => Ok(entry.url.clone()),
        }
    }

    async fn get_all_by_user_id(&self, user_id: Uuid) -> Result<Vec<OwnedUrl>> {
        let state = self.state.lock();

        let bucket = state.users.get(&user_id).ok_or_else(|| {
            ShortenerError::not_found(format!(
                "get all in memory storage: user {} not found",
                user_id
            ))
        })?;

        let urls = bucket
            .iter()
            .map(|(id, entry)| OwnedUrl {
                short_url: format!("{}{}", self.base_url, id),
                original_url: entry.url.to_string(),
            })
            .collect();
        Ok(urls)
    }

    async fn delete_batch_by_user_id(&self, user_id: Uuid, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Err(ShortenerError::batch_empty(
                "delete batch in memory storage: batch is empty",
            ));
        }

        let mut state = self.state.lock();
        let MemState { urls, users } = &mut *state;

        let bucket = users.get_mut(&user_id).ok_or_else(|| {
            ShortenerError::not_found(format!(
                "delete batch in memory storage: user {} not found",
                user_id
            ))
        })?;

        for id in ids {
            // 不属于该用户的标识不做任何事，跨用户删除被排除在外
            if let Some(entry) = bucket.get_mut(id) {
                entry.deleted = true;
                if let Some(primary) = urls.get_mut(id) {
                    primary.deleted = true;
                }
            }
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

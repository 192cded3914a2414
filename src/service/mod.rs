//! 业务服务层
//!
//! 包装存储契约：推导标识、携带可选的调用方身份、在关系型后端上
//! 把单条保存裹进事务。HTTP 处理器只与这里和删除工作池打交道。

use std::sync::Arc;

use url::Url;
use uuid::Uuid;

use crate::errors::{Result, ShortenerError};
use crate::storage::models::{BatchItem, BatchShortened, OwnedUrl};
use crate::storage::{Storage, derive_id};
use crate::utils::url_validator::validate_url;

pub struct Service {
    storage: Arc<dyn Storage>,
    base_url: String,
}

impl Service {
    pub fn new(storage: Arc<dyn Storage>, base_url: impl Into<String>) -> Self {
        Self {
            storage,
            base_url: base_url.into(),
        }
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        self.storage.clone()
    }

    /// 把标识渲染成完整短链接
    pub fn shorten(&self, id: Uuid) -> String {
        format!("{}{}", self.base_url, id)
    }

    /// 验证原始字符串后保存，处理器层的入口
    pub async fn shorten_url(&self, user_id: Option<Uuid>, raw: &str) -> Result<Uuid> {
        let url = validate_url(raw)?;
        self.save(user_id, &url).await
    }

    /// 保存 URL，标识由规范化 URL 推导
    ///
    /// 关系型后端下整个保存在一个事务里；`Conflict` 是建议性的，
    /// 写入已经生效，所以冲突也提交而不是回滚
    pub async fn save(&self, user_id: Option<Uuid>, url: &Url) -> Result<Uuid> {
        let id = derive_id(url);

        let tx = self.storage.begin_tx().await?;
        match tx {
            None => match user_id {
                Some(user) => self.storage.save_user(None, user, id, url).await,
                None => self.storage.save(None, id, url).await,
            },
            Some(tx) => {
                let res = match user_id {
                    Some(user) => self.storage.save_user(Some(&tx), user, id, url).await,
                    None => self.storage.save(Some(&tx), id, url).await,
                };

                match res {
                    Ok(id) => {
                        tx.commit().await?;
                        Ok(id)
                    }
                    Err(e) if e.is_conflict() => {
                        tx.commit().await?;
                        Err(e)
                    }
                    Err(e) => {
                        let _ = tx.rollback().await;
                        Err(e)
                    }
                }
            }
        }
    }

    /// 批量保存，带身份时走用户变体
    pub async fn save_batch(&self, user_id: Option<Uuid>, batch: &[BatchItem]) -> Result<()> {
        match user_id {
            Some(user) => self.storage.save_batch_user(user, batch).await,
            None => self.storage.save_batch(batch).await,
        }
    }

    /// 把批量请求映射成响应项，correlation_id 原样带回
    pub fn batch_response(&self, batch: &[BatchItem]) -> Result<Vec<BatchShortened>> {
        batch
            .iter()
            .map(|item| {
                let url = Url::parse(&item.original_url).map_err(|_| {
                    ShortenerError::url_not_valid(format!(
                        "batch response mapping: {}",
                        item.original_url
                    ))
                })?;
                Ok(BatchShortened {
                    correlation_id: item.correlation_id,
                    short_url: self.shorten(derive_id(&url)),
                })
            })
            .collect()
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Url> {
        self.storage.get_by_id(id).await
    }

    /// 列出当前用户的全部链接；匿名调用方无权限
    pub async fn get_all_by_user_id(&self, user_id: Option<Uuid>) -> Result<Vec<OwnedUrl>> {
        let Some(user) = user_id else {
            return Err(ShortenerError::unauthorized(
                "get all urls: user unauthorized",
            ));
        };
        self.storage.get_all_by_user_id(user).await
    }

    /// 按用户批量软删除；匿名调用方无权限
    pub async fn delete_batch_by_user_id(&self, user_id: Option<Uuid>, ids: &[Uuid]) -> Result<()> {
        let Some(user) = user_id else {
            return Err(ShortenerError::unauthorized(
                "delete batch: user unauthorized",
            ));
        };
        self.storage.delete_batch_by_user_id(user, ids).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.storage.ping().await
    }
}

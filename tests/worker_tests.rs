use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;
use uuid::Uuid;

use shortener::errors::{Result, ShortenerError};
use shortener::storage::backends::memory::MemoryStorage;
use shortener::storage::{
    BatchItem, DeleteEvent, OwnedUrl, Storage, StorageTransaction, derive_id,
};
use shortener::worker::DeleteWorker;

/// 计数假存储，记录每次批量删除的调用
struct CountingStorage {
    delete_calls: AtomicUsize,
    deleted_ids: Mutex<Vec<(Uuid, Vec<Uuid>)>>,
    fail_deletes: bool,
}

impl CountingStorage {
    fn new() -> Self {
        Self {
            delete_calls: AtomicUsize::new(0),
            deleted_ids: Mutex::new(Vec::new()),
            fail_deletes: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail_deletes: true,
            ..Self::new()
        }
    }

    fn calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for CountingStorage {
    async fn save(&self, _tx: Option<&StorageTransaction>, id: Uuid, _url: &Url) -> Result<Uuid> {
        Ok(id)
    }

    async fn save_user(
        &self,
        _tx: Option<&StorageTransaction>,
        _user_id: Uuid,
        id: Uuid,
        _url: &Url,
    ) -> Result<Uuid> {
        Ok(id)
    }

    async fn save_batch(&self, _batch: &[BatchItem]) -> Result<()> {
        Ok(())
    }

    async fn save_batch_user(&self, _user_id: Uuid, _batch: &[BatchItem]) -> Result<()> {
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Url> {
        Err(ShortenerError::not_found(format!("id {} not found", id)))
    }

    async fn get_all_by_user_id(&self, _user_id: Uuid) -> Result<Vec<OwnedUrl>> {
        Ok(Vec::new())
    }

    async fn delete_batch_by_user_id(&self, user_id: Uuid, ids: &[Uuid]) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.deleted_ids.lock().push((user_id, ids.to_vec()));

        if self.fail_deletes {
            return Err(ShortenerError::not_found(format!(
                "user {} not found",
                user_id
            )));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

fn event(user: Uuid) -> DeleteEvent {
    DeleteEvent {
        user_id: Some(user),
        ids: vec![Uuid::new_v4()],
    }
}

#[tokio::test]
async fn test_graceful_drain_processes_all_enqueued_events() {
    let storage = Arc::new(CountingStorage::new());
    let worker = DeleteWorker::new(4, storage.clone() as Arc<dyn Storage>);

    const EVENTS: usize = 50;
    for _ in 0..EVENTS {
        worker.send_delete_batch_request(event(Uuid::new_v4())).await;
    }

    // close 之前入队的事件全部送达存储
    worker.close().await;
    assert_eq!(storage.calls(), EVENTS);
}

#[tokio::test]
async fn test_single_worker_drains_in_order() {
    let storage = Arc::new(CountingStorage::new());
    let worker = DeleteWorker::new(1, storage.clone() as Arc<dyn Storage>);

    let user = Uuid::new_v4();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    worker
        .send_delete_batch_request(DeleteEvent {
            user_id: Some(user),
            ids: vec![first],
        })
        .await;
    worker
        .send_delete_batch_request(DeleteEvent {
            user_id: Some(user),
            ids: vec![second],
        })
        .await;
    worker.close().await;

    // 单 worker 下出队顺序即应用顺序
    let deleted = storage.deleted_ids.lock().clone();
    assert_eq!(deleted.len(), 2);
    assert_eq!(deleted[0].1, vec![first]);
    assert_eq!(deleted[1].1, vec![second]);
}

#[tokio::test]
async fn test_ownerless_events_never_reach_storage() {
    let storage = Arc::new(CountingStorage::new());
    let worker = DeleteWorker::new(2, storage.clone() as Arc<dyn Storage>);

    for _ in 0..10 {
        worker
            .send_delete_batch_request(DeleteEvent {
                user_id: None,
                ids: vec![Uuid::new_v4()],
            })
            .await;
    }
    worker.close().await;

    assert_eq!(storage.calls(), 0);
}

#[tokio::test]
async fn test_failed_deletes_are_discarded_not_retried() {
    let storage = Arc::new(CountingStorage::failing());
    let worker = DeleteWorker::new(2, storage.clone() as Arc<dyn Storage>);

    for _ in 0..5 {
        worker.send_delete_batch_request(event(Uuid::new_v4())).await;
    }
    worker.close().await;

    // 每个事件只尝试一次，失败即丢弃
    assert_eq!(storage.calls(), 5);
}

#[tokio::test]
async fn test_delete_for_unknown_owner_leaves_mapping_live() {
    // 为从未保存过的用户入队删除，映射必须保持存活
    let storage = Arc::new(MemoryStorage::new("http://localhost:8080/"));
    let url = Url::parse("https://example.com/a").unwrap();
    let id = derive_id(&url);
    storage.save(None, id, &url).await.unwrap();

    let worker = DeleteWorker::new(2, storage.clone() as Arc<dyn Storage>);
    worker
        .send_delete_batch_request(DeleteEvent {
            user_id: Some(Uuid::new_v4()),
            ids: vec![id],
        })
        .await;
    worker.close().await;

    assert_eq!(storage.get_by_id(id).await.unwrap(), url);
}

#[tokio::test]
async fn test_close_with_empty_queue_returns() {
    let storage = Arc::new(CountingStorage::new());
    let worker = DeleteWorker::new(8, storage.clone() as Arc<dyn Storage>);
    worker.close().await;
    assert_eq!(storage.calls(), 0);
}

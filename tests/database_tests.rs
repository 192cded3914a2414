//! 关系型后端集成测试，跑在进程内 SQLite 上

use std::sync::Arc;
use std::time::Duration;

use url::Url;
use uuid::Uuid;

use shortener::service::Service;
use shortener::storage::backends::database::DatabaseStorage;
use shortener::storage::{BatchItem, Storage, derive_id};

const BASE_URL: &str = "http://localhost:8080/";

async fn database() -> DatabaseStorage {
    DatabaseStorage::new("sqlite::memory:", BASE_URL, Duration::from_secs(30))
        .await
        .unwrap()
}

fn parse(s: &str) -> Url {
    Url::parse(s).unwrap()
}

#[tokio::test]
async fn test_save_and_get() {
    let storage = database().await;
    let url = parse("https://example.com/a");
    let id = derive_id(&url);

    storage.save(None, id, &url).await.unwrap();
    assert_eq!(storage.get_by_id(id).await.unwrap(), url);
}

#[tokio::test]
async fn test_get_unknown_id_is_not_found() {
    let storage = database().await;
    let err = storage.get_by_id(Uuid::new_v4()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_resave_conflict_is_advisory() {
    let storage = database().await;
    let url = parse("https://example.com/a");
    let id = derive_id(&url);

    storage.save(None, id, &url).await.unwrap();
    let err = storage.save(None, id, &url).await.unwrap_err();
    assert!(err.is_conflict());

    // 冲突之后映射仍然在库并且可读
    assert_eq!(storage.get_by_id(id).await.unwrap(), url);
}

#[tokio::test]
async fn test_tombstone_distinction() {
    let storage = database().await;
    let user = Uuid::new_v4();
    let url = parse("https://example.com/a");
    let id = derive_id(&url);

    storage.save_user(None, user, id, &url).await.unwrap();
    storage.delete_batch_by_user_id(user, &[id]).await.unwrap();

    let err = storage.get_by_id(id).await.unwrap_err();
    assert!(err.is_delete_accepted());
}

#[tokio::test]
async fn test_delete_scoped_to_owner() {
    let storage = database().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let url_a = parse("https://example.com/alice");
    let url_b = parse("https://example.com/bob");
    let id_a = derive_id(&url_a);
    let id_b = derive_id(&url_b);

    storage.save_user(None, alice, id_a, &url_a).await.unwrap();
    storage.save_user(None, bob, id_b, &url_b).await.unwrap();

    storage
        .delete_batch_by_user_id(alice, &[id_a, id_b])
        .await
        .unwrap();

    assert!(storage.get_by_id(id_a).await.unwrap_err().is_delete_accepted());
    assert_eq!(storage.get_by_id(id_b).await.unwrap(), url_b);
}

#[tokio::test]
async fn test_delete_unknown_owner_is_not_found() {
    let storage = database().await;
    let err = storage
        .delete_batch_by_user_id(Uuid::new_v4(), &[Uuid::new_v4()])
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_batch_upsert_and_list() {
    let storage = database().await;
    let user = Uuid::new_v4();

    let batch: Vec<BatchItem> = (0..5)
        .map(|i| BatchItem {
            correlation_id: Uuid::new_v4(),
            original_url: format!("https://example.com/page/{}", i),
        })
        .collect();

    storage.save_batch_user(user, &batch).await.unwrap();

    let urls = storage.get_all_by_user_id(user).await.unwrap();
    assert_eq!(urls.len(), 5);

    for item in &batch {
        let id = derive_id(&parse(&item.original_url));
        assert!(storage.get_by_id(id).await.is_ok());
    }
}

#[tokio::test]
async fn test_batch_resubmit_is_idempotent() {
    let storage = database().await;

    let batch = vec![BatchItem {
        correlation_id: Uuid::new_v4(),
        original_url: "https://example.com/a".to_string(),
    }];

    storage.save_batch(&batch).await.unwrap();
    // 已存在的标识 DO NOTHING，重复提交不报错
    storage.save_batch(&batch).await.unwrap();

    let id = derive_id(&parse("https://example.com/a"));
    assert!(storage.get_by_id(id).await.is_ok());
}

#[tokio::test]
async fn test_empty_batch_rejected() {
    let storage = database().await;
    assert!(storage.save_batch(&[]).await.unwrap_err().is_batch_empty());
    assert!(
        storage
            .save_batch_user(Uuid::new_v4(), &[])
            .await
            .unwrap_err()
            .is_batch_empty()
    );
}

#[tokio::test]
async fn test_batch_with_invalid_url_aborts() {
    let storage = database().await;

    let batch = vec![
        BatchItem {
            correlation_id: Uuid::new_v4(),
            original_url: "https://example.com/ok".to_string(),
        },
        BatchItem {
            correlation_id: Uuid::new_v4(),
            original_url: "not a url".to_string(),
        },
    ];

    let err = storage.save_batch(&batch).await.unwrap_err();
    assert!(err.is_url_not_valid());
}

#[tokio::test]
async fn test_get_all_unknown_user_is_not_found() {
    let storage = database().await;
    let err = storage.get_all_by_user_id(Uuid::new_v4()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_list_includes_tombstoned_entries() {
    let storage = database().await;
    let user = Uuid::new_v4();

    let url_a = parse("https://example.com/a");
    let url_b = parse("https://example.com/b");
    let id_a = derive_id(&url_a);
    let id_b = derive_id(&url_b);

    storage.save_user(None, user, id_a, &url_a).await.unwrap();
    storage.save_user(None, user, id_b, &url_b).await.unwrap();
    storage.delete_batch_by_user_id(user, &[id_a]).await.unwrap();

    // 列表返回存储中的条目，墓碑也在内
    let urls = storage.get_all_by_user_id(user).await.unwrap();
    assert_eq!(urls.len(), 2);
}

#[tokio::test]
async fn test_ping() {
    let storage = database().await;
    assert!(storage.ping().await.is_ok());
}

#[tokio::test]
async fn test_begin_tx_is_some() {
    let storage = database().await;
    let tx = storage.begin_tx().await.unwrap();
    assert!(tx.is_some());
    tx.unwrap().rollback().await.unwrap();
}

#[tokio::test]
async fn test_service_save_commits_transaction() {
    let storage = Arc::new(database().await) as Arc<dyn Storage>;
    let service = Service::new(storage.clone(), BASE_URL);
    let user = Uuid::new_v4();

    let url = parse("https://example.com/tx");
    let id = service.save(Some(user), &url).await.unwrap();

    // 事务提交后可以从池连接读到
    assert_eq!(storage.get_by_id(id).await.unwrap(), url);

    // 冲突路径同样提交，映射保持可读
    let err = service.save(Some(user), &url).await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(storage.get_by_id(id).await.unwrap(), url);
}

#[tokio::test]
async fn test_save_revives_tombstoned_mapping() {
    let storage = database().await;
    let user = Uuid::new_v4();
    let url = parse("https://example.com/a");
    let id = derive_id(&url);

    storage.save_user(None, user, id, &url).await.unwrap();
    storage.delete_batch_by_user_id(user, &[id]).await.unwrap();

    let err = storage.save_user(None, user, id, &url).await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(storage.get_by_id(id).await.unwrap(), url);
}

use tempfile::TempDir;
use url::Url;
use uuid::Uuid;

use shortener::config::Config;
use shortener::storage::{Storage, StorageFactory, derive_id};

#[tokio::test]
async fn test_default_config_builds_memory_backend() {
    let config = Config::default();
    let storage = StorageFactory::create(&config).await.unwrap();

    assert!(storage.ping().await.is_ok());
    assert!(storage.begin_tx().await.unwrap().is_none());
}

#[tokio::test]
async fn test_file_path_builds_journaled_backend() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("urls.journal");

    let mut config = Config::default();
    config.storage.file_storage_path = path.to_string_lossy().into_owned();

    let url = Url::parse("https://example.com/a").unwrap();
    let id = derive_id(&url);

    {
        let storage = StorageFactory::create(&config).await.unwrap();
        storage.save(None, id, &url).await.unwrap();
    }

    // 工厂在装配时回放日志，重启后映射仍然可读
    let storage = StorageFactory::create(&config).await.unwrap();
    assert_eq!(storage.get_by_id(id).await.unwrap(), url);
}

#[tokio::test]
async fn test_database_url_builds_relational_backend() {
    let mut config = Config::default();
    config.storage.database_url = "sqlite::memory:".to_string();

    let storage = StorageFactory::create(&config).await.unwrap();
    assert!(storage.ping().await.is_ok());
    // 关系型后端有真实事务
    let tx = storage.begin_tx().await.unwrap().unwrap();
    tx.rollback().await.unwrap();

    let url = Url::parse("https://example.com/a").unwrap();
    storage.save(None, derive_id(&url), &url).await.unwrap();
    assert_eq!(storage.get_by_id(derive_id(&url)).await.unwrap(), url);
}

#[tokio::test]
async fn test_unknown_user_delete_keeps_mapping() {
    let config = Config::default();
    let storage = StorageFactory::create(&config).await.unwrap();

    let url = Url::parse("https://example.com/a").unwrap();
    let id = derive_id(&url);
    storage.save(None, id, &url).await.unwrap();

    let err = storage
        .delete_batch_by_user_id(Uuid::new_v4(), &[id])
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(storage.get_by_id(id).await.unwrap(), url);
}

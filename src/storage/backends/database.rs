//! 关系型存储后端
//!
//! 基于 SeaORM，支持 SQLite、MySQL/MariaDB 和 PostgreSQL。
//! 单条保存用 ON CONFLICT upsert，批量保存合成一条 insert_many 语句，
//! N 个条目一次往返。墓碑是 is_deleted 布尔列。

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, TransactionTrait,
};
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use migration::entities::url as url_entity;
use migration::{Migrator, MigratorTrait};

use crate::errors::{Result, ShortenerError};
use crate::storage::models::{BatchItem, OwnedUrl, derive_id};
use crate::storage::{Storage, StorageTransaction};

pub struct DatabaseStorage {
    db: DatabaseConnection,
    base_url: String,
    /// 单次查询的超时上限，慢库不能把请求挂死
    op_timeout: Duration,
}

impl DatabaseStorage {
    pub async fn new(database_url: &str, base_url: &str, op_timeout: Duration) -> Result<Self> {
        if database_url.is_empty() {
            return Err(ShortenerError::database_config(
                "DATABASE_URL 未设置".to_string(),
            ));
        }

        // 根据不同数据库类型配置连接选项
        let db = if Self::is_sqlite(database_url) {
            Self::connect_sqlite(database_url).await?
        } else {
            Self::connect_generic(database_url).await?
        };

        let storage = DatabaseStorage {
            db,
            base_url: base_url.to_string(),
            op_timeout,
        };

        // 运行迁移
        storage.run_migrations().await?;

        warn!("Database storage initialized.");
        Ok(storage)
    }

    fn is_sqlite(database_url: &str) -> bool {
        database_url.starts_with("sqlite:")
            || database_url.ends_with(".db")
            || database_url.ends_with(".sqlite")
    }

    /// 连接 SQLite 数据库（带自动创建和性能优化）
    async fn connect_sqlite(database_url: &str) -> Result<DatabaseConnection> {
        use sea_orm::SqlxSqliteConnector;
        use sea_orm::sqlx::sqlite::{
            SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
        };
        use std::str::FromStr;

        let opt = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| ShortenerError::database_config(format!("SQLite URL 解析失败: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        // :memory: 的每个连接都是独立数据库，必须收敛到单连接
        let pool_size = if database_url.contains(":memory:") { 1 } else { 16 };

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .connect_with(opt)
            .await
            .map_err(|e| {
                ShortenerError::database_connection(format!("无法连接到 SQLite 数据库: {}", e))
            })?;

        Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
    }

    /// 连接通用数据库（MySQL/PostgreSQL）
    async fn connect_generic(database_url: &str) -> Result<DatabaseConnection> {
        let mut opt = ConnectOptions::new(database_url.to_owned());
        opt.max_connections(100)
            .min_connections(5)
            .connect_timeout(Duration::from_secs(8))
            .acquire_timeout(Duration::from_secs(8))
            .sqlx_logging(false);

        Database::connect(opt)
            .await
            .map_err(|e| ShortenerError::database_connection(format!("无法连接到数据库: {}", e)))
    }

    async fn run_migrations(&self) -> Result<()> {
        Migrator::up(&self.db, None)
            .await
            .map_err(|e| ShortenerError::database_operation(format!("迁移失败: {}", e)))?;

        info!("Database migrations completed");
        Ok(())
    }

    /// 把查询限制在 op_timeout 之内
    async fn with_timeout<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sea_orm::DbErr>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(res) => {
                res.map_err(|e| ShortenerError::database_operation(format!("{}: {}", op, e)))
            }
            Err(_) => Err(ShortenerError::database_operation(format!(
                "{}: timed out after {:?}",
                op, self.op_timeout
            ))),
        }
    }

    async fn save_on<C: ConnectionTrait>(&self, conn: &C, id: Uuid, url: &Url) -> Result<Uuid> {
        let existing = self
            .with_timeout(
                "save in database storage",
                url_entity::Entity::find_by_id(id).one(conn),
            )
            .await?;

        let model = url_entity::ActiveModel {
            short_url: Set(id),
            user_id: NotSet,
            original_url: Set(url.to_string()),
            is_deleted: Set(false),
        };

        let insert = url_entity::Entity::insert(model).on_conflict(
            OnConflict::column(url_entity::Column::ShortUrl)
                .update_columns([
                    url_entity::Column::OriginalUrl,
                    url_entity::Column::IsDeleted,
                ])
                .to_owned(),
        );
        self.with_timeout("save in database storage", insert.exec_without_returning(conn))
            .await?;

        // 冲突是建议性的：上面的 upsert 已经落库
        if existing.is_some() {
            return Err(ShortenerError::conflict(format!(
                "save in database storage: id {} already mapped",
                id
            )));
        }
        Ok(id)
    }

    async fn save_user_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        id: Uuid,
        url: &Url,
    ) -> Result<Uuid> {
        // 冲突按 (user_id, id) 对判定，不是按全局映射
        let existing = self
            .with_timeout(
                "save in database storage",
                url_entity::Entity::find()
                    .filter(url_entity::Column::ShortUrl.eq(id))
                    .filter(url_entity::Column::UserId.eq(user_id))
                    .one(conn),
            )
            .await?;

        let model = url_entity::ActiveModel {
            short_url: Set(id),
            user_id: Set(Some(user_id)),
            original_url: Set(url.to_string()),
            is_deleted: Set(false),
        };

        let insert = url_entity::Entity::insert(model).on_conflict(
            OnConflict::column(url_entity::Column::ShortUrl)
                .update_columns([
                    url_entity::Column::UserId,
                    url_entity::Column::OriginalUrl,
                    url_entity::Column::IsDeleted,
                ])
                .to_owned(),
        );
        self.with_timeout("save in database storage", insert.exec_without_returning(conn))
            .await?;

        if existing.is_some() {
            return Err(ShortenerError::conflict(format!(
                "save in database storage: id {} already mapped for user {}",
                id, user_id
            )));
        }
        Ok(id)
    }

    fn batch_models(
        batch: &[BatchItem],
        user_id: Option<Uuid>,
    ) -> Result<Vec<url_entity::ActiveModel>> {
        let mut models = Vec::with_capacity(batch.len());
        for item in batch {
            let url = Url::parse(&item.original_url).map_err(|_| {
                ShortenerError::url_not_valid(format!(
                    "save batch in database storage: {}",
                    item.original_url
                ))
            })?;

            models.push(url_entity::ActiveModel {
                short_url: Set(derive_id(&url)),
                user_id: Set(user_id),
                original_url: Set(url.to_string()),
                is_deleted: Set(false),
            });
        }
        Ok(models)
    }
}

#[async_trait]
impl Storage for DatabaseStorage {
    async fn begin_tx(&self) -> Result<Option<StorageTransaction>> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| ShortenerError::database_operation(format!("begin transaction: {}", e)))?;
        Ok(Some(StorageTransaction::new(txn)))
    }

    async fn save(&self, tx: Option<&StorageTransaction>, id: Uuid, url: &Url) -> Result<Uuid> {
        match tx {
            Some(tx) => self.save_on(tx.conn(), id, url).await,
            None => self.save_on(&self.db, id, url).await,
        }
    }

    async fn save_user(
        &self,
        tx: Option<&StorageTransaction>,
        user_id: Uuid,
        id: Uuid,
        url: &Url,
    ) -> Result<Uuid> {
        match tx {
            Some(tx) => self.save_user_on(tx.conn(), user_id, id, url).await,
            None => self.save_user_on(&self.db, user_id, id, url).await,
        }
    }

    async fn save_batch(&self, batch: &[BatchItem]) -> Result<()> {
        if batch.is_empty() {
            return Err(ShortenerError::batch_empty(
                "save batch in database storage: batch is empty",
            ));
        }

        let models = Self::batch_models(batch, None)?;

        // 一条语句一次往返，已存在的标识不动
        let insert = url_entity::Entity::insert_many(models).on_conflict(
            OnConflict::column(url_entity::Column::ShortUrl)
                .do_nothing()
                .to_owned(),
        );
        self.with_timeout(
            "save batch in database storage",
            insert.exec_without_returning(&self.db),
        )
        .await?;
        Ok(())
    }

    async fn save_batch_user(&self, user_id: Uuid, batch: &[BatchItem]) -> Result<()> {
        if batch.is_empty() {
            return Err(ShortenerError::batch_empty(
                "save batch in database storage: batch is empty",
            ));
        }

        let models = Self::batch_models(batch, Some(user_id))?;

        let insert = url_entity::Entity::insert_many(models).on_conflict(
            OnConflict::column(url_entity::Column::ShortUrl)
                .do_nothing()
                .to_owned(),
        );
        self.with_timeout(
            "save batch in database storage",
            insert.exec_without_returning(&self.db),
        )
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Url> {
        let model = self
            .with_timeout(
                "get in database storage",
                url_entity::Entity::find_by_id(id).one(&self.db),
            )
            .await?;

        let Some(model) = model else {
            return Err(ShortenerError::not_found(format!(
                "get in database storage: id {} not found",
                id
            )));
        };

        if model.is_deleted {
            return Err(ShortenerError::delete_accepted(format!(
                "get in database storage: id {} is deleted",
                id
            )));
        }

        Url::parse(&model.original_url).map_err(|_| {
            ShortenerError::url_not_valid(format!(
                "get in database storage: stored url {} is not valid",
                model.original_url
            ))
        })
    }

    async fn get_all_by_user_id(&self, user_id: Uuid) -> Result<Vec<OwnedUrl>> {
        let models = self
            .with_timeout(
                "get all in database storage",
                url_entity::Entity::find()
                    .filter(url_entity::Column::UserId.eq(user_id))
                    .all(&self.db),
            )
            .await?;

        if models.is_empty() {
            return Err(ShortenerError::not_found(format!(
                "get all in database storage: user {} not found",
                user_id
            )));
        }

        Ok(models
            .into_iter()
            .map(|m| OwnedUrl {
                short_url: format!("{}{}", self.base_url, m.short_url),
                original_url: m.original_url,
            })
            .collect())
    }

    async fn delete_batch_by_user_id(&self, user_id: Uuid, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Err(ShortenerError::batch_empty(
                "delete batch in database storage: batch is empty",
            ));
        }

        let owned = self
            .with_timeout(
                "delete batch in database storage",
                url_entity::Entity::find()
                    .filter(url_entity::Column::UserId.eq(user_id))
                    .count(&self.db),
            )
            .await?;
        if owned == 0 {
            return Err(ShortenerError::not_found(format!(
                "delete batch in database storage: user {} not found",
                user_id
            )));
        }

        // user_id 谓词把墓碑限制在该用户自己的标识上
        let update = url_entity::Entity::update_many()
            .col_expr(url_entity::Column::IsDeleted, Expr::value(true))
            .filter(url_entity::Column::ShortUrl.is_in(ids.iter().copied()))
            .filter(url_entity::Column::UserId.eq(user_id));
        self.with_timeout("delete batch in database storage", update.exec(&self.db))
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.with_timeout("ping database storage", self.db.ping())
            .await
    }
}

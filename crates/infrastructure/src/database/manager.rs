use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use arbiter_core::{config::DatabaseConfig, ArbiterError, ArbiterResult, BookingRepository};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::{debug, info};

use super::postgres::PostgresBookingRepository;
use super::schema;
use super::sqlite::SqliteBookingRepository;

/// SQLite 写锁等待时间，超时后以 `StoreUnavailable` 返回给调用方
const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database type detection
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseType {
    PostgreSQL,
    SQLite,
}

impl DatabaseType {
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            DatabaseType::PostgreSQL
        } else {
            DatabaseType::SQLite
        }
    }
}

/// Database connection pool enum
pub enum DatabasePool {
    PostgreSQL(sqlx::PgPool),
    SQLite(sqlx::SqlitePool),
}

impl DatabasePool {
    /// 根据配置创建连接池，自动识别数据库类型
    pub async fn connect(config: &DatabaseConfig) -> ArbiterResult<Self> {
        match DatabaseType::from_url(&config.url) {
            DatabaseType::PostgreSQL => {
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
                    .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
                    .connect(&config.url)
                    .await?;
                Ok(DatabasePool::PostgreSQL(pool))
            }
            DatabaseType::SQLite => {
                let in_memory = is_in_memory(&config.url);
                if !in_memory {
                    ensure_sqlite_parent_dir(&config.url)?;
                }

                let options = SqliteConnectOptions::from_str(&config.url)?
                    .create_if_missing(true)
                    .foreign_keys(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .busy_timeout(SQLITE_BUSY_TIMEOUT);

                // 内存库每个连接都是独立的数据库，只能使用单连接
                let mut pool_options = SqlitePoolOptions::new()
                    .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds));
                pool_options = if in_memory {
                    pool_options
                        .max_connections(1)
                        .min_connections(1)
                        .idle_timeout(None)
                        .max_lifetime(None)
                } else {
                    pool_options
                        .max_connections(config.max_connections)
                        .min_connections(config.min_connections)
                        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
                };

                let pool = pool_options.connect_with(options).await?;
                Ok(DatabasePool::SQLite(pool))
            }
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        match self {
            DatabasePool::PostgreSQL(_) => DatabaseType::PostgreSQL,
            DatabasePool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    pub async fn health_check(&self) -> ArbiterResult<()> {
        match self {
            DatabasePool::PostgreSQL(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            DatabasePool::SQLite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }
        Ok(())
    }

    pub async fn close(&self) {
        match self {
            DatabasePool::PostgreSQL(pool) => pool.close().await,
            DatabasePool::SQLite(pool) => pool.close().await,
        }
    }
}

/// Unified database manager
pub struct DatabaseManager {
    pool: DatabasePool,
}

impl DatabaseManager {
    /// 连接数据库并初始化表结构
    pub async fn connect(config: &DatabaseConfig) -> ArbiterResult<Self> {
        let pool = DatabasePool::connect(config).await?;
        let manager = Self { pool };
        manager.init_schema().await?;

        info!(
            "数据库连接成功: {:?}, 最大连接数 {}",
            manager.database_type(),
            config.max_connections
        );
        Ok(manager)
    }

    /// 使用URL和默认连接参数连接，主要用于测试
    pub async fn from_url(url: &str) -> ArbiterResult<Self> {
        let config = DatabaseConfig {
            url: url.to_string(),
            ..DatabaseConfig::default()
        };
        Self::connect(&config).await
    }

    pub async fn init_schema(&self) -> ArbiterResult<()> {
        let result = match &self.pool {
            DatabasePool::PostgreSQL(pool) => schema::migrate_postgres(pool).await,
            DatabasePool::SQLite(pool) => schema::migrate_sqlite(pool).await,
        };
        result.map_err(|e| ArbiterError::Internal(format!("{e:#}")))
    }

    pub fn database_type(&self) -> DatabaseType {
        self.pool.database_type()
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    pub async fn health_check(&self) -> ArbiterResult<()> {
        self.pool.health_check().await
    }

    pub async fn close(&self) {
        self.pool.close().await
    }

    /// Factory method for booking repository
    pub fn booking_repository(&self) -> Arc<dyn BookingRepository> {
        match &self.pool {
            DatabasePool::PostgreSQL(pool) => {
                Arc::new(PostgresBookingRepository::new(pool.clone()))
            }
            DatabasePool::SQLite(pool) => Arc::new(SqliteBookingRepository::new(pool.clone())),
        }
    }
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// 为SQLite数据库文件创建父目录
fn ensure_sqlite_parent_dir(url: &str) -> ArbiterResult<()> {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);

    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("创建SQLite数据目录: {}", parent.display());
            std::fs::create_dir_all(parent).map_err(|e| {
                ArbiterError::Configuration(format!(
                    "无法创建SQLite数据目录 {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}

//! 表结构初始化
//!
//! 启动时执行，全部语句幂等。

use anyhow::{Context, Result};
use sqlx::{PgPool, SqlitePool};
use tracing::info;

/// 运行SQLite表结构初始化
pub async fn migrate_sqlite(pool: &SqlitePool) -> Result<()> {
    info!("运行SQLite数据库迁移");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS booking_dispatches (
            booking_id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'OPEN',
            accepted_worker_id TEXT,
            candidate_count INTEGER NOT NULL,
            created_at DATETIME NOT NULL,
            resolved_at DATETIME
        )
        "#,
    )
    .execute(pool)
    .await
    .context("创建派发头表失败")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bookings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            booking_id TEXT NOT NULL,
            worker_id TEXT NOT NULL,
            customer_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            location TEXT NOT NULL,
            contact_number TEXT NOT NULL,
            description TEXT,
            superseded_by TEXT,
            created_at DATETIME NOT NULL,
            responded_at DATETIME,
            UNIQUE (booking_id, worker_id),
            FOREIGN KEY (booking_id) REFERENCES booking_dispatches (booking_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("创建候选记录表失败")?;

    create_indexes(pool).await?;

    info!("✅ 数据库迁移完成");
    Ok(())
}

async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_booking_dispatches_status ON booking_dispatches(status, created_at)",
    )
    .execute(pool)
    .await
    .context("创建派发状态索引失败")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_bookings_worker ON bookings(worker_id, status)")
        .execute(pool)
        .await
        .context("创建Worker索引失败")?;

    Ok(())
}

/// 运行PostgreSQL表结构初始化
pub async fn migrate_postgres(pool: &PgPool) -> Result<()> {
    info!("运行PostgreSQL数据库迁移");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS booking_dispatches (
            booking_id VARCHAR(64) PRIMARY KEY,
            customer_id VARCHAR(255) NOT NULL,
            status VARCHAR(16) NOT NULL DEFAULT 'OPEN',
            accepted_worker_id VARCHAR(255),
            candidate_count INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            resolved_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await
    .context("创建派发头表失败")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bookings (
            id BIGSERIAL PRIMARY KEY,
            booking_id VARCHAR(64) NOT NULL REFERENCES booking_dispatches (booking_id),
            worker_id VARCHAR(255) NOT NULL,
            customer_id VARCHAR(255) NOT NULL,
            status VARCHAR(16) NOT NULL DEFAULT 'PENDING',
            location TEXT NOT NULL,
            contact_number VARCHAR(64) NOT NULL,
            description TEXT,
            superseded_by VARCHAR(255),
            created_at TIMESTAMPTZ NOT NULL,
            responded_at TIMESTAMPTZ,
            UNIQUE (booking_id, worker_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("创建候选记录表失败")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_booking_dispatches_status ON booking_dispatches(status, created_at)",
    )
    .execute(pool)
    .await
    .context("创建派发状态索引失败")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_bookings_worker ON bookings(worker_id, status)")
        .execute(pool)
        .await
        .context("创建Worker索引失败")?;

    info!("✅ 数据库迁移完成");
    Ok(())
}

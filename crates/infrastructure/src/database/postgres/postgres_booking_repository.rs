use arbiter_core::{
    AcceptAttempt, ArbiterResult, Booking, BookingDispatch, BookingRepository, BookingStatus,
    ClosedDispatch, RejectAttempt,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use crate::{
    booking_context,
    error_handling::{RepositoryErrorHelpers, RepositoryOperation},
};

/// PostgreSQL预约单仓储
///
/// READ COMMITTED 下，对派发头的条件 UPDATE 会在行锁上排队，
/// 拿到锁后重新评估 `status = 'OPEN'`，因此同一预约单最多一个事务命中。
pub struct PostgresBookingRepository {
    pool: PgPool,
}

impl PostgresBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_booking(row: &sqlx::postgres::PgRow) -> ArbiterResult<Booking> {
        Ok(Booking {
            id: row.try_get("id")?,
            booking_id: row.try_get("booking_id")?,
            worker_id: row.try_get("worker_id")?,
            customer_id: row.try_get("customer_id")?,
            status: row.try_get("status")?,
            location: row.try_get("location")?,
            contact_number: row.try_get("contact_number")?,
            description: row.try_get("description")?,
            superseded_by: row.try_get("superseded_by")?,
            created_at: row.try_get("created_at")?,
            responded_at: row.try_get("responded_at")?,
        })
    }

    fn row_to_dispatch(row: &sqlx::postgres::PgRow) -> ArbiterResult<BookingDispatch> {
        Ok(BookingDispatch {
            booking_id: row.try_get("booking_id")?,
            customer_id: row.try_get("customer_id")?,
            status: row.try_get("status")?,
            accepted_worker_id: row.try_get("accepted_worker_id")?,
            candidate_count: row.try_get("candidate_count")?,
            created_at: row.try_get("created_at")?,
            resolved_at: row.try_get("resolved_at")?,
        })
    }
}

#[async_trait]
impl BookingRepository for PostgresBookingRepository {
    #[instrument(skip(self, dispatch, candidates), fields(
        booking_id = %dispatch.booking_id,
        candidate_count = candidates.len(),
    ))]
    async fn insert_dispatch(
        &self,
        dispatch: &BookingDispatch,
        candidates: &[Booking],
    ) -> ArbiterResult<()> {
        let context = booking_context!(
            RepositoryOperation::Create,
            booking_id = dispatch.booking_id.as_str()
        );
        let map_err = |e| RepositoryErrorHelpers::database_error(&context, e);

        let mut tx = self.pool.begin().await.map_err(map_err)?;

        sqlx::query(
            r#"
            INSERT INTO booking_dispatches (booking_id, customer_id, status, accepted_worker_id,
                                            candidate_count, created_at, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&dispatch.booking_id)
        .bind(&dispatch.customer_id)
        .bind(dispatch.status)
        .bind(&dispatch.accepted_worker_id)
        .bind(dispatch.candidate_count)
        .bind(dispatch.created_at)
        .bind(dispatch.resolved_at)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        for candidate in candidates {
            sqlx::query(
                r#"
                INSERT INTO bookings (booking_id, worker_id, customer_id, status, location,
                                      contact_number, description, superseded_by, created_at, responded_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(&candidate.booking_id)
            .bind(&candidate.worker_id)
            .bind(&candidate.customer_id)
            .bind(candidate.status)
            .bind(&candidate.location)
            .bind(&candidate.contact_number)
            .bind(&candidate.description)
            .bind(&candidate.superseded_by)
            .bind(candidate.created_at)
            .bind(candidate.responded_at)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
        }

        tx.commit().await.map_err(map_err)?;

        RepositoryErrorHelpers::log_operation_success(
            &context,
            Some(&format!("候选Worker数: {}", candidates.len())),
        );
        Ok(())
    }

    async fn get_dispatch(&self, booking_id: &str) -> ArbiterResult<Option<BookingDispatch>> {
        let row = sqlx::query(
            "SELECT booking_id, customer_id, status, accepted_worker_id, candidate_count,
                    created_at, resolved_at
             FROM booking_dispatches WHERE booking_id = $1",
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_dispatch(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_candidates(&self, booking_id: &str) -> ArbiterResult<Vec<Booking>> {
        let rows = sqlx::query(
            "SELECT id, booking_id, worker_id, customer_id, status, location, contact_number,
                    description, superseded_by, created_at, responded_at
             FROM bookings WHERE booking_id = $1 ORDER BY id ASC",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_booking).collect()
    }

    async fn get_candidate(
        &self,
        booking_id: &str,
        worker_id: &str,
    ) -> ArbiterResult<Option<Booking>> {
        let row = sqlx::query(
            "SELECT id, booking_id, worker_id, customer_id, status, location, contact_number,
                    description, superseded_by, created_at, responded_at
             FROM bookings WHERE booking_id = $1 AND worker_id = $2",
        )
        .bind(booking_id)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_booking(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_by_worker(
        &self,
        worker_id: &str,
        status: Option<BookingStatus>,
        limit: i64,
    ) -> ArbiterResult<Vec<Booking>> {
        let rows = sqlx::query(
            "SELECT id, booking_id, worker_id, customer_id, status, location, contact_number,
                    description, superseded_by, created_at, responded_at
             FROM bookings
             WHERE worker_id = $1 AND ($2::TEXT IS NULL OR status = $2::TEXT)
             ORDER BY created_at DESC, id DESC
             LIMIT $3",
        )
        .bind(worker_id)
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_booking).collect()
    }

    #[instrument(skip(self))]
    async fn try_accept(
        &self,
        booking_id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> ArbiterResult<AcceptAttempt> {
        let context = booking_context!(
            RepositoryOperation::Accept,
            booking_id = booking_id,
            worker_id = worker_id
        );
        let map_err = |e| RepositoryErrorHelpers::database_error(&context, e);

        let mut tx = self.pool.begin().await.map_err(map_err)?;

        // 派发头是唯一的竞争点
        let claimed = sqlx::query(
            r#"
            UPDATE booking_dispatches
            SET status = 'ACCEPTED', accepted_worker_id = $2, resolved_at = $3
            WHERE booking_id = $1 AND status = 'OPEN'
            "#,
        )
        .bind(booking_id)
        .bind(worker_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        if claimed.rows_affected() != 1 {
            tx.rollback().await.map_err(map_err)?;
            debug!("派发头已不是OPEN状态，抢单失败");
            return Ok(AcceptAttempt::Lost);
        }

        let own = sqlx::query(
            r#"
            UPDATE bookings
            SET status = 'ACCEPTED', responded_at = $3
            WHERE booking_id = $1 AND worker_id = $2 AND status = 'PENDING'
            "#,
        )
        .bind(booking_id)
        .bind(worker_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        if own.rows_affected() != 1 {
            tx.rollback().await.map_err(map_err)?;
            debug!("候选记录不存在或已非待处理状态，回滚");
            return Ok(AcceptAttempt::Lost);
        }

        let superseded = sqlx::query(
            r#"
            UPDATE bookings
            SET status = 'REJECTED', superseded_by = $2, responded_at = $3
            WHERE booking_id = $1 AND worker_id <> $2 AND status = 'PENDING'
            RETURNING worker_id
            "#,
        )
        .bind(booking_id)
        .bind(worker_id)
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_err)?;

        let superseded_worker_ids = superseded
            .iter()
            .map(|row| row.try_get::<String, _>("worker_id"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_err)?;

        tx.commit().await.map_err(map_err)?;

        RepositoryErrorHelpers::log_operation_success(
            &context,
            Some(&format!("连带拒绝 {} 个候选", superseded_worker_ids.len())),
        );
        Ok(AcceptAttempt::Won {
            superseded_worker_ids,
        })
    }

    #[instrument(skip(self))]
    async fn try_reject(
        &self,
        booking_id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> ArbiterResult<RejectAttempt> {
        let context = booking_context!(
            RepositoryOperation::Reject,
            booking_id = booking_id,
            worker_id = worker_id
        );
        let map_err = |e| RepositoryErrorHelpers::database_error(&context, e);

        let mut tx = self.pool.begin().await.map_err(map_err)?;

        // 锁住派发头，保证并发拒单时"最后一个拒绝"能看到其他拒绝的提交结果
        sqlx::query("SELECT status FROM booking_dispatches WHERE booking_id = $1 FOR UPDATE")
            .bind(booking_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_err)?;

        let own = sqlx::query(
            r#"
            UPDATE bookings
            SET status = 'REJECTED', responded_at = $3
            WHERE booking_id = $1 AND worker_id = $2 AND status = 'PENDING'
            "#,
        )
        .bind(booking_id)
        .bind(worker_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        if own.rows_affected() != 1 {
            tx.rollback().await.map_err(map_err)?;
            return Ok(RejectAttempt::Lost);
        }

        let remaining: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings WHERE booking_id = $1 AND status = 'PENDING'",
        )
        .bind(booking_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_err)?;

        let mut dispatch_declined = false;
        if remaining == 0 {
            let declined = sqlx::query(
                r#"
                UPDATE booking_dispatches
                SET status = 'DECLINED', resolved_at = $2
                WHERE booking_id = $1 AND status = 'OPEN'
                "#,
            )
            .bind(booking_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
            dispatch_declined = declined.rows_affected() == 1;
        }

        tx.commit().await.map_err(map_err)?;

        RepositoryErrorHelpers::log_operation_success(
            &context,
            Some(&format!("剩余待处理候选: {}", remaining)),
        );
        Ok(RejectAttempt::Rejected { dispatch_declined })
    }

    #[instrument(skip(self))]
    async fn expire_open(
        &self,
        booking_id: Option<&str>,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ArbiterResult<Vec<ClosedDispatch>> {
        let context = match booking_id {
            Some(id) => booking_context!(RepositoryOperation::Expire, booking_id = id),
            None => booking_context!(RepositoryOperation::Expire),
        };
        let map_err = |e| RepositoryErrorHelpers::database_error(&context, e);

        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let expired_rows = sqlx::query(
            r#"
            UPDATE booking_dispatches
            SET status = 'EXPIRED', resolved_at = $2
            WHERE status = 'OPEN' AND created_at <= $1 AND ($3::TEXT IS NULL OR booking_id = $3::TEXT)
            RETURNING booking_id
            "#,
        )
        .bind(cutoff)
        .bind(now)
        .bind(booking_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_err)?;

        let mut closed = Vec::with_capacity(expired_rows.len());
        for row in &expired_rows {
            let expired_id: String = row.try_get("booking_id").map_err(map_err)?;
            let workers = sqlx::query(
                r#"
                UPDATE bookings
                SET status = 'EXPIRED', responded_at = $2
                WHERE booking_id = $1 AND status = 'PENDING'
                RETURNING worker_id
                "#,
            )
            .bind(&expired_id)
            .bind(now)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_err)?;

            let worker_ids = workers
                .iter()
                .map(|row| row.try_get::<String, _>("worker_id"))
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_err)?;

            closed.push(ClosedDispatch {
                booking_id: expired_id,
                worker_ids,
            });
        }

        tx.commit().await.map_err(map_err)?;

        if !closed.is_empty() {
            RepositoryErrorHelpers::log_operation_success(
                &context,
                Some(&format!("过期预约单数: {}", closed.len())),
            );
        }
        Ok(closed)
    }

    #[instrument(skip(self))]
    async fn cancel_open(
        &self,
        booking_id: &str,
        now: DateTime<Utc>,
    ) -> ArbiterResult<Option<ClosedDispatch>> {
        let context = booking_context!(RepositoryOperation::Cancel, booking_id = booking_id);
        let map_err = |e| RepositoryErrorHelpers::database_error(&context, e);

        let mut tx = self.pool.begin().await.map_err(map_err)?;

        let cancelled = sqlx::query(
            r#"
            UPDATE booking_dispatches
            SET status = 'CANCELLED', resolved_at = $2
            WHERE booking_id = $1 AND status = 'OPEN'
            "#,
        )
        .bind(booking_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        if cancelled.rows_affected() != 1 {
            tx.rollback().await.map_err(map_err)?;
            return Ok(None);
        }

        let workers = sqlx::query(
            r#"
            UPDATE bookings
            SET status = 'CANCELLED', responded_at = $2
            WHERE booking_id = $1 AND status = 'PENDING'
            RETURNING worker_id
            "#,
        )
        .bind(booking_id)
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_err)?;

        let worker_ids = workers
            .iter()
            .map(|row| row.try_get::<String, _>("worker_id"))
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_err)?;

        tx.commit().await.map_err(map_err)?;

        RepositoryErrorHelpers::log_operation_success(&context, None);
        Ok(Some(ClosedDispatch {
            booking_id: booking_id.to_string(),
            worker_ids,
        }))
    }

    async fn health_check(&self) -> ArbiterResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

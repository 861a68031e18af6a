use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arbiter_core::{
    AcceptAttempt, ArbiterError, ArbiterResult, Booking, BookingDispatch, BookingRepository,
    BookingStatus, ClosedDispatch, DispatchStatus, RejectAttempt,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

/// 内存预约单仓储
///
/// 所有写操作在一把写锁内完成，效果等同于数据库事务串行化。
/// 适用于单元测试和无需持久化的嵌入场景。
#[derive(Debug, Clone, Default)]
pub struct InMemoryBookingRepository {
    state: Arc<RwLock<State>>,
    unavailable: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct State {
    dispatches: HashMap<String, BookingDispatch>,
    bookings: Vec<Booking>,
    next_id: i64,
}

impl State {
    fn pending_rows_mut<'a>(
        &'a mut self,
        booking_id: &'a str,
    ) -> impl Iterator<Item = &'a mut Booking> + 'a {
        self.bookings
            .iter_mut()
            .filter(move |b| b.booking_id == booking_id && b.is_pending())
    }

    fn close_pending(
        &mut self,
        booking_id: &str,
        status: BookingStatus,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        self.pending_rows_mut(booking_id)
            .map(|b| {
                b.status = status;
                b.responded_at = Some(now);
                b.worker_id.clone()
            })
            .collect()
    }
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟存储不可用，之后的所有操作返回 `StoreUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> ArbiterResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ArbiterError::StoreUnavailable(
                "内存仓储被设置为不可用".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn insert_dispatch(
        &self,
        dispatch: &BookingDispatch,
        candidates: &[Booking],
    ) -> ArbiterResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;

        if state.dispatches.contains_key(&dispatch.booking_id) {
            return Err(ArbiterError::InvalidRequest(format!(
                "预约单已存在: {}",
                dispatch.booking_id
            )));
        }

        state
            .dispatches
            .insert(dispatch.booking_id.clone(), dispatch.clone());
        for candidate in candidates {
            state.next_id += 1;
            let mut row = candidate.clone();
            row.id = state.next_id;
            state.bookings.push(row);
        }

        debug!(
            "内存仓储写入预约单 {}, 候选数 {}",
            dispatch.booking_id,
            candidates.len()
        );
        Ok(())
    }

    async fn get_dispatch(&self, booking_id: &str) -> ArbiterResult<Option<BookingDispatch>> {
        self.check_available()?;
        Ok(self.state.read().await.dispatches.get(booking_id).cloned())
    }

    async fn get_candidates(&self, booking_id: &str) -> ArbiterResult<Vec<Booking>> {
        self.check_available()?;
        Ok(self
            .state
            .read()
            .await
            .bookings
            .iter()
            .filter(|b| b.booking_id == booking_id)
            .cloned()
            .collect())
    }

    async fn get_candidate(
        &self,
        booking_id: &str,
        worker_id: &str,
    ) -> ArbiterResult<Option<Booking>> {
        self.check_available()?;
        Ok(self
            .state
            .read()
            .await
            .bookings
            .iter()
            .find(|b| b.booking_id == booking_id && b.worker_id == worker_id)
            .cloned())
    }

    async fn get_by_worker(
        &self,
        worker_id: &str,
        status: Option<BookingStatus>,
        limit: i64,
    ) -> ArbiterResult<Vec<Booking>> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut rows: Vec<Booking> = state
            .bookings
            .iter()
            .filter(|b| b.worker_id == worker_id)
            .filter(|b| status.map_or(true, |s| b.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn try_accept(
        &self,
        booking_id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> ArbiterResult<AcceptAttempt> {
        self.check_available()?;
        let mut state = self.state.write().await;

        let header_open = state
            .dispatches
            .get(booking_id)
            .is_some_and(|d| d.status.is_open());
        let own_pending = state
            .bookings
            .iter()
            .any(|b| b.booking_id == booking_id && b.worker_id == worker_id && b.is_pending());
        if !header_open || !own_pending {
            return Ok(AcceptAttempt::Lost);
        }

        if let Some(dispatch) = state.dispatches.get_mut(booking_id) {
            dispatch.status = DispatchStatus::Accepted;
            dispatch.accepted_worker_id = Some(worker_id.to_string());
            dispatch.resolved_at = Some(now);
        }

        let mut superseded_worker_ids = Vec::new();
        for row in state.pending_rows_mut(booking_id) {
            row.responded_at = Some(now);
            if row.worker_id == worker_id {
                row.status = BookingStatus::Accepted;
            } else {
                row.status = BookingStatus::Rejected;
                row.superseded_by = Some(worker_id.to_string());
                superseded_worker_ids.push(row.worker_id.clone());
            }
        }

        Ok(AcceptAttempt::Won {
            superseded_worker_ids,
        })
    }

    async fn try_reject(
        &self,
        booking_id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> ArbiterResult<RejectAttempt> {
        self.check_available()?;
        let mut state = self.state.write().await;

        let Some(row) = state
            .pending_rows_mut(booking_id)
            .find(|b| b.worker_id == worker_id)
        else {
            return Ok(RejectAttempt::Lost);
        };
        row.status = BookingStatus::Rejected;
        row.responded_at = Some(now);

        let remaining = state.pending_rows_mut(booking_id).count();
        let mut dispatch_declined = false;
        if remaining == 0 {
            if let Some(dispatch) = state
                .dispatches
                .get_mut(booking_id)
                .filter(|d| d.status.is_open())
            {
                dispatch.status = DispatchStatus::Declined;
                dispatch.resolved_at = Some(now);
                dispatch_declined = true;
            }
        }

        Ok(RejectAttempt::Rejected { dispatch_declined })
    }

    async fn expire_open(
        &self,
        booking_id: Option<&str>,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ArbiterResult<Vec<ClosedDispatch>> {
        self.check_available()?;
        let mut state = self.state.write().await;

        let mut expired_ids: Vec<String> = state
            .dispatches
            .values_mut()
            .filter(|d| d.status.is_open() && d.created_at <= cutoff)
            .filter(|d| booking_id.map_or(true, |id| d.booking_id == id))
            .map(|d| {
                d.status = DispatchStatus::Expired;
                d.resolved_at = Some(now);
                d.booking_id.clone()
            })
            .collect();
        expired_ids.sort();

        Ok(expired_ids
            .into_iter()
            .map(|id| {
                let worker_ids = state.close_pending(&id, BookingStatus::Expired, now);
                ClosedDispatch {
                    booking_id: id,
                    worker_ids,
                }
            })
            .collect())
    }

    async fn cancel_open(
        &self,
        booking_id: &str,
        now: DateTime<Utc>,
    ) -> ArbiterResult<Option<ClosedDispatch>> {
        self.check_available()?;
        let mut state = self.state.write().await;

        match state.dispatches.get_mut(booking_id) {
            Some(dispatch) if dispatch.status.is_open() => {
                dispatch.status = DispatchStatus::Cancelled;
                dispatch.resolved_at = Some(now);
            }
            _ => return Ok(None),
        }

        let worker_ids = state.close_pending(booking_id, BookingStatus::Cancelled, now);
        Ok(Some(ClosedDispatch {
            booking_id: booking_id.to_string(),
            worker_ids,
        }))
    }

    async fn health_check(&self) -> ArbiterResult<()> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::BookingTemplate;

    fn template() -> BookingTemplate {
        BookingTemplate {
            customer_id: "c-1".to_string(),
            location: "7 Quay Rd".to_string(),
            contact_number: "+15550101".to_string(),
            description: None,
        }
    }

    async fn seed(repo: &InMemoryBookingRepository, booking_id: &str, workers: &[&str]) {
        let now = Utc::now();
        let dispatch = BookingDispatch::open(booking_id, "c-1", workers.len(), now);
        let rows: Vec<Booking> = workers
            .iter()
            .map(|w| Booking::pending(booking_id, w, &template(), now))
            .collect();
        repo.insert_dispatch(&dispatch, &rows).await.unwrap();
    }

    #[tokio::test]
    async fn test_accept_supersedes_siblings() {
        let repo = InMemoryBookingRepository::new();
        seed(&repo, "b-1", &["w-1", "w-2", "w-3"]).await;

        let attempt = repo.try_accept("b-1", "w-2", Utc::now()).await.unwrap();
        assert_eq!(
            attempt,
            AcceptAttempt::Won {
                superseded_worker_ids: vec!["w-1".to_string(), "w-3".to_string()]
            }
        );

        let again = repo.try_accept("b-1", "w-1", Utc::now()).await.unwrap();
        assert_eq!(again, AcceptAttempt::Lost);

        let w1 = repo.get_candidate("b-1", "w-1").await.unwrap().unwrap();
        assert!(w1.is_superseded());
        assert_eq!(w1.superseded_by.as_deref(), Some("w-2"));
    }

    #[tokio::test]
    async fn test_last_reject_declines_dispatch() {
        let repo = InMemoryBookingRepository::new();
        seed(&repo, "b-1", &["w-1", "w-2"]).await;

        let first = repo.try_reject("b-1", "w-1", Utc::now()).await.unwrap();
        assert_eq!(first, RejectAttempt::Rejected { dispatch_declined: false });

        let second = repo.try_reject("b-1", "w-2", Utc::now()).await.unwrap();
        assert_eq!(second, RejectAttempt::Rejected { dispatch_declined: true });

        let dispatch = repo.get_dispatch("b-1").await.unwrap().unwrap();
        assert_eq!(dispatch.status, DispatchStatus::Declined);
    }

    #[tokio::test]
    async fn test_unavailable_store_is_retryable() {
        let repo = InMemoryBookingRepository::new();
        repo.set_unavailable(true);
        let err = repo.get_dispatch("b-1").await.unwrap_err();
        assert!(err.is_retryable());

        repo.set_unavailable(false);
        assert!(repo.health_check().await.is_ok());
    }
}

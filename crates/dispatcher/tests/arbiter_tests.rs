use std::sync::Arc;
use std::time::Duration;

use arbiter_core::{
    ArbiterError, ArbiterResult, BookingRepository, BookingStatus, BookingTemplate, Decision,
    DispatchNotifier, DispatchStatus, NotificationPayload, RespondOutcome,
};
use arbiter_dispatcher::{AssignmentArbiter, AssignmentArbiterConfig};
use arbiter_infrastructure::{DatabaseManager, InMemoryBookingRepository, NoopNotifier};
use async_trait::async_trait;
use chrono::Utc;
use mockall::mock;
use tokio::sync::mpsc;

mock! {
    pub Notifier {}

    #[async_trait]
    impl DispatchNotifier for Notifier {
        async fn notify(
            &self,
            worker_id: &str,
            booking_id: &str,
            payload: &NotificationPayload,
        ) -> ArbiterResult<()>;

        fn name(&self) -> &'static str;
    }
}

fn template() -> BookingTemplate {
    BookingTemplate {
        customer_id: "c-42".to_string(),
        location: "18 Orchard Way".to_string(),
        contact_number: "+15550177".to_string(),
        description: Some("fix fence".to_string()),
    }
}

fn workers(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

fn in_memory_arbiter() -> (Arc<AssignmentArbiter>, InMemoryBookingRepository) {
    let repo = InMemoryBookingRepository::new();
    let arbiter = AssignmentArbiter::new(
        Arc::new(repo.clone()),
        Arc::new(NoopNotifier),
        AssignmentArbiterConfig::default(),
    );
    (Arc::new(arbiter), repo)
}

async fn status_of(arbiter: &AssignmentArbiter, booking_id: &str, worker_id: &str) -> BookingStatus {
    arbiter
        .get_booking(booking_id)
        .await
        .unwrap()
        .candidate(worker_id)
        .unwrap()
        .status
}

#[tokio::test]
async fn test_dispatch_creates_pending_rows() {
    let (arbiter, _) = in_memory_arbiter();
    let dispatch = arbiter
        .dispatch(template(), workers(&["w-1", "w-2", "w-3"]))
        .await
        .unwrap();

    assert_eq!(dispatch.candidate_count, 3);
    let details = arbiter.get_booking(&dispatch.booking_id).await.unwrap();
    assert_eq!(details.dispatch.status, DispatchStatus::Open);
    assert_eq!(details.pending_count(), 3);
    assert!(details
        .candidates
        .iter()
        .all(|b| b.booking_id == dispatch.booking_id && b.customer_id == "c-42"));
}

#[tokio::test]
async fn test_dispatch_dedupes_candidates() {
    let (arbiter, _) = in_memory_arbiter();
    let dispatch = arbiter
        .dispatch(template(), workers(&["w-1", "w-1", "w-2"]))
        .await
        .unwrap();
    assert_eq!(dispatch.candidate_count, 2);
}

#[tokio::test]
async fn test_dispatch_without_candidates_fails() {
    let (arbiter, _) = in_memory_arbiter();
    let err = arbiter.dispatch(template(), vec![]).await.unwrap_err();
    assert!(matches!(err, ArbiterError::InvalidRequest(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_accepts_single_winner() {
    let (arbiter, _) = in_memory_arbiter();
    let dispatch = arbiter
        .dispatch(template(), workers(&["w-1", "w-2", "w-3"]))
        .await
        .unwrap();
    let id = dispatch.booking_id.clone();

    let a = {
        let arbiter = arbiter.clone();
        let id = id.clone();
        tokio::spawn(async move { arbiter.respond(&id, "w-1", Decision::Accept).await })
    };
    let b = {
        let arbiter = arbiter.clone();
        let id = id.clone();
        tokio::spawn(async move { arbiter.respond(&id, "w-2", Decision::Accept).await })
    };
    let outcomes = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];

    let winners = outcomes
        .iter()
        .filter(|o| matches!(o, RespondOutcome::Accepted { .. }))
        .count();
    assert_eq!(winners, 1);
    assert!(outcomes.iter().any(|o| matches!(
        o,
        RespondOutcome::AlreadyResolved {
            status: BookingStatus::Rejected,
            ..
        }
    )));

    let details = arbiter.get_booking(&id).await.unwrap();
    assert_eq!(details.accepted_count(), 1);
    assert_eq!(details.pending_count(), 0);
    assert_eq!(status_of(&arbiter, &id, "w-3").await, BookingStatus::Rejected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_responders_at_most_one_accepted() {
    let (arbiter, _) = in_memory_arbiter();
    let ids: Vec<String> = (0..20).map(|i| format!("w-{i}")).collect();
    let dispatch = arbiter.dispatch(template(), ids.clone()).await.unwrap();

    let mut handles = Vec::new();
    for (i, worker_id) in ids.into_iter().enumerate() {
        let arbiter = arbiter.clone();
        let booking_id = dispatch.booking_id.clone();
        let decision = if i % 3 == 0 {
            Decision::Reject
        } else {
            Decision::Accept
        };
        handles.push(tokio::spawn(async move {
            arbiter.respond(&booking_id, &worker_id, decision).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let details = arbiter.get_booking(&dispatch.booking_id).await.unwrap();
    assert_eq!(details.accepted_count(), 1);
    assert_eq!(details.pending_count(), 0);
    assert_eq!(details.dispatch.status, DispatchStatus::Accepted);
}

#[tokio::test]
async fn test_accept_supersedes_all_pending_siblings() {
    let (arbiter, _) = in_memory_arbiter();
    let dispatch = arbiter
        .dispatch(template(), workers(&["w-1", "w-2", "w-3"]))
        .await
        .unwrap();

    let outcome = arbiter
        .respond(&dispatch.booking_id, "w-2", Decision::Accept)
        .await
        .unwrap();
    let RespondOutcome::Accepted {
        superseded_worker_ids,
    } = outcome
    else {
        panic!("expected accept to win");
    };
    assert_eq!(superseded_worker_ids, workers(&["w-1", "w-3"]));

    let details = arbiter.get_booking(&dispatch.booking_id).await.unwrap();
    assert!(details.candidates.iter().all(|b| !b.is_pending()));
    assert_eq!(details.dispatch.accepted_worker_id.as_deref(), Some("w-2"));
}

#[tokio::test]
async fn test_repeated_accept_is_already_resolved() {
    let (arbiter, _) = in_memory_arbiter();
    let dispatch = arbiter
        .dispatch(template(), workers(&["w-1", "w-2"]))
        .await
        .unwrap();
    let id = &dispatch.booking_id;

    arbiter.respond(id, "w-1", Decision::Accept).await.unwrap();
    let before = arbiter.get_booking(id).await.unwrap();

    let second = arbiter.respond(id, "w-1", Decision::Accept).await.unwrap();
    assert_eq!(
        second,
        RespondOutcome::AlreadyResolved {
            status: BookingStatus::Accepted,
            accepted_worker_id: Some("w-1".to_string()),
        }
    );

    let after = arbiter.get_booking(id).await.unwrap();
    assert_eq!(before.candidates, after.candidates);
}

#[tokio::test]
async fn test_reject_then_accept_keeps_self_rejection() {
    let (arbiter, _) = in_memory_arbiter();
    let dispatch = arbiter
        .dispatch(template(), workers(&["w-1", "w-2", "w-3"]))
        .await
        .unwrap();
    let id = &dispatch.booking_id;

    let rejected = arbiter.respond(id, "w-1", Decision::Reject).await.unwrap();
    assert_eq!(rejected, RespondOutcome::Rejected);

    let accepted = arbiter.respond(id, "w-2", Decision::Accept).await.unwrap();
    assert_eq!(
        accepted,
        RespondOutcome::Accepted {
            superseded_worker_ids: workers(&["w-3"])
        }
    );

    let details = arbiter.get_booking(id).await.unwrap();
    let w1 = details.candidate("w-1").unwrap();
    assert_eq!(w1.status, BookingStatus::Rejected);
    assert!(w1.superseded_by.is_none());
    assert_eq!(status_of(&arbiter, id, "w-2").await, BookingStatus::Accepted);
    assert!(details.candidate("w-3").unwrap().is_superseded());

    // 本人已拒绝后再接单属于非法流转
    let err = arbiter.respond(id, "w-1", Decision::Accept).await.unwrap_err();
    assert!(matches!(
        err,
        ArbiterError::InvalidTransition {
            current: BookingStatus::Rejected,
            ..
        }
    ));
}

#[tokio::test]
async fn test_all_rejections_decline_booking() {
    let (arbiter, _) = in_memory_arbiter();
    let dispatch = arbiter
        .dispatch(template(), workers(&["w-1", "w-2"]))
        .await
        .unwrap();
    let id = &dispatch.booking_id;

    arbiter.respond(id, "w-1", Decision::Reject).await.unwrap();
    arbiter.respond(id, "w-2", Decision::Reject).await.unwrap();

    let details = arbiter.get_booking(id).await.unwrap();
    assert_eq!(details.dispatch.status, DispatchStatus::Declined);
}

#[tokio::test]
async fn test_expire_after_ttl_then_respond_is_invalid() {
    let repo = InMemoryBookingRepository::new();
    let arbiter = AssignmentArbiter::new(
        Arc::new(repo),
        Arc::new(NoopNotifier),
        AssignmentArbiterConfig {
            booking_ttl: chrono::Duration::seconds(60),
            ..AssignmentArbiterConfig::default()
        },
    );
    let dispatch = arbiter
        .dispatch(template(), workers(&["w-1", "w-2", "w-3"]))
        .await
        .unwrap();
    let id = &dispatch.booking_id;

    // TTL 未到，不生效
    let early = arbiter.expire(id, Utc::now()).await.unwrap();
    assert!(early.is_empty());

    let later = Utc::now() + chrono::Duration::seconds(61);
    let report = arbiter.expire(id, later).await.unwrap();
    assert_eq!(report.booking_count(), 1);
    assert_eq!(report.row_count(), 3);

    let details = arbiter.get_booking(id).await.unwrap();
    assert_eq!(details.dispatch.status, DispatchStatus::Expired);
    assert!(details
        .candidates
        .iter()
        .all(|b| b.status == BookingStatus::Expired));

    // 幂等
    assert!(arbiter.expire(id, later).await.unwrap().is_empty());

    for decision in [Decision::Accept, Decision::Reject] {
        let err = arbiter.respond(id, "w-1", decision).await.unwrap_err();
        assert!(matches!(
            err,
            ArbiterError::InvalidTransition {
                current: BookingStatus::Expired,
                ..
            }
        ));
    }
}

#[tokio::test]
async fn test_expire_overdue_sweeps_only_old_bookings() {
    let (arbiter, _) = in_memory_arbiter();
    let first = arbiter.dispatch(template(), workers(&["w-1"])).await.unwrap();

    let later = Utc::now() + chrono::Duration::seconds(301);
    let report = arbiter.expire_overdue(later).await.unwrap();
    assert_eq!(report.booking_count(), 1);
    assert_eq!(report.expired[0].booking_id, first.booking_id);

    let second = arbiter.dispatch(template(), workers(&["w-1"])).await.unwrap();
    let report = arbiter.expire_overdue(Utc::now()).await.unwrap();
    assert!(report.is_empty());
    let details = arbiter.get_booking(&second.booking_id).await.unwrap();
    assert_eq!(details.dispatch.status, DispatchStatus::Open);
}

#[tokio::test]
async fn test_respond_unknown_booking_and_worker() {
    let (arbiter, _) = in_memory_arbiter();
    let err = arbiter
        .respond("missing", "w-1", Decision::Accept)
        .await
        .unwrap_err();
    assert!(matches!(err, ArbiterError::BookingNotFound { .. }));

    let dispatch = arbiter.dispatch(template(), workers(&["w-1"])).await.unwrap();
    let err = arbiter
        .respond(&dispatch.booking_id, "w-9", Decision::Reject)
        .await
        .unwrap_err();
    assert!(matches!(err, ArbiterError::CandidateNotFound { .. }));
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_cancel_open_and_resolved_booking() {
    let (arbiter, _) = in_memory_arbiter();
    let open = arbiter
        .dispatch(template(), workers(&["w-1", "w-2"]))
        .await
        .unwrap();
    let closed = arbiter.cancel(&open.booking_id, Utc::now()).await.unwrap();
    assert_eq!(closed.worker_ids, workers(&["w-1", "w-2"]));

    let err = arbiter
        .respond(&open.booking_id, "w-1", Decision::Accept)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ArbiterError::InvalidTransition {
            current: BookingStatus::Cancelled,
            ..
        }
    ));

    let err = arbiter.cancel(&open.booking_id, Utc::now()).await.unwrap_err();
    assert!(matches!(err, ArbiterError::BookingClosed { .. }));

    let err = arbiter.cancel("missing", Utc::now()).await.unwrap_err();
    assert!(matches!(err, ArbiterError::BookingNotFound { .. }));
}

#[tokio::test]
async fn test_worker_inbox_filters_by_status() {
    let (arbiter, _) = in_memory_arbiter();
    let first = arbiter
        .dispatch(template(), workers(&["w-1", "w-2"]))
        .await
        .unwrap();
    arbiter.dispatch(template(), workers(&["w-1"])).await.unwrap();
    arbiter
        .respond(&first.booking_id, "w-2", Decision::Accept)
        .await
        .unwrap();

    let inbox = arbiter.worker_inbox("w-1", None).await.unwrap();
    assert_eq!(inbox.len(), 2);

    let pending = arbiter
        .worker_inbox("w-1", Some(BookingStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_ne!(pending[0].booking_id, first.booking_id);
}

#[tokio::test]
async fn test_store_unavailable_is_retryable() {
    let (arbiter, repo) = in_memory_arbiter();
    let dispatch = arbiter.dispatch(template(), workers(&["w-1"])).await.unwrap();

    repo.set_unavailable(true);
    let err = arbiter
        .respond(&dispatch.booking_id, "w-1", Decision::Accept)
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    repo.set_unavailable(false);
    let outcome = arbiter
        .respond(&dispatch.booking_id, "w-1", Decision::Accept)
        .await
        .unwrap();
    assert!(matches!(outcome, RespondOutcome::Accepted { .. }));
}

#[tokio::test]
async fn test_notifier_called_once_per_candidate() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut notifier = MockNotifier::new();
    notifier.expect_name().return_const("mock");
    notifier
        .expect_notify()
        .times(3)
        .returning(move |worker_id, booking_id, payload| {
            assert_eq!(payload.booking_id, booking_id);
            let _ = tx.send(worker_id.to_string());
            Ok(())
        });

    let arbiter = AssignmentArbiter::new(
        Arc::new(InMemoryBookingRepository::new()),
        Arc::new(notifier),
        AssignmentArbiterConfig::default(),
    );
    arbiter
        .dispatch(template(), workers(&["w-1", "w-2", "w-3"]))
        .await
        .unwrap();

    let mut notified = Vec::new();
    for _ in 0..3 {
        let worker_id = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        notified.push(worker_id);
    }
    notified.sort();
    assert_eq!(notified, workers(&["w-1", "w-2", "w-3"]));
}

#[tokio::test]
async fn test_notifier_failure_does_not_fail_dispatch() {
    let mut notifier = MockNotifier::new();
    notifier.expect_name().return_const("mock");
    notifier
        .expect_notify()
        .returning(|_, _, _| Err(ArbiterError::Notifier("gateway down".to_string())));

    let (repo, arbiter) = {
        let repo = InMemoryBookingRepository::new();
        let arbiter = AssignmentArbiter::new(
            Arc::new(repo.clone()),
            Arc::new(notifier),
            AssignmentArbiterConfig::default(),
        );
        (repo, arbiter)
    };

    let dispatch = arbiter
        .dispatch(template(), workers(&["w-1", "w-2"]))
        .await
        .unwrap();
    let candidates = repo.get_candidates(&dispatch.booking_id).await.unwrap();
    assert_eq!(candidates.len(), 2);

    let outcome = arbiter
        .respond(&dispatch.booking_id, "w-1", Decision::Accept)
        .await
        .unwrap();
    assert!(matches!(outcome, RespondOutcome::Accepted { .. }));
}

/// 永远不返回的通知通道
struct HangingNotifier;

#[async_trait]
impl DispatchNotifier for HangingNotifier {
    async fn notify(
        &self,
        _worker_id: &str,
        _booking_id: &str,
        _payload: &NotificationPayload,
    ) -> ArbiterResult<()> {
        std::future::pending::<()>().await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "hanging"
    }
}

#[tokio::test]
async fn test_slow_notifier_does_not_block_dispatch() {
    let arbiter = AssignmentArbiter::new(
        Arc::new(InMemoryBookingRepository::new()),
        Arc::new(HangingNotifier),
        AssignmentArbiterConfig {
            notify_timeout: Duration::from_millis(50),
            ..AssignmentArbiterConfig::default()
        },
    );

    let dispatch = tokio::time::timeout(
        Duration::from_secs(1),
        arbiter.dispatch(template(), workers(&["w-1"])),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(dispatch.candidate_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_backed_concurrent_accepts() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("arbiter.db").display());
    let manager = DatabaseManager::from_url(&url).await.unwrap();

    let arbiter = Arc::new(AssignmentArbiter::new(
        manager.booking_repository(),
        Arc::new(NoopNotifier),
        AssignmentArbiterConfig::default(),
    ));
    let ids: Vec<String> = (0..6).map(|i| format!("w-{i}")).collect();
    let dispatch = arbiter.dispatch(template(), ids.clone()).await.unwrap();

    let results = futures::future::join_all(ids.into_iter().map(|worker_id| {
        let arbiter = arbiter.clone();
        let booking_id = dispatch.booking_id.clone();
        tokio::spawn(async move {
            arbiter
                .respond(&booking_id, &worker_id, Decision::Accept)
                .await
        })
    }))
    .await;

    let outcomes: Vec<RespondOutcome> = results
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, RespondOutcome::Accepted { .. }))
            .count(),
        1
    );
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, RespondOutcome::AlreadyResolved { .. }))
            .count(),
        5
    );

    let details = arbiter.get_booking(&dispatch.booking_id).await.unwrap();
    assert_eq!(details.accepted_count(), 1);
    assert_eq!(details.pending_count(), 0);
    manager.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_mixed_accept_reject_expire_cancel_races() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("arbiter.db").display());
    let manager = DatabaseManager::from_url(&url).await.unwrap();

    // TTL 为零，过期与接单、拒单、取消同时争抢同一个派发头
    let arbiter = Arc::new(AssignmentArbiter::new(
        manager.booking_repository(),
        Arc::new(NoopNotifier),
        AssignmentArbiterConfig {
            booking_ttl: chrono::Duration::zero(),
            ..AssignmentArbiterConfig::default()
        },
    ));
    let ids: Vec<String> = (0..5).map(|i| format!("w-{i}")).collect();

    for round in 0..20 {
        let dispatch = arbiter.dispatch(template(), ids.clone()).await.unwrap();
        let booking_id = dispatch.booking_id;

        let mut responders = Vec::new();
        for worker_id in &ids {
            for decision in [Decision::Accept, Decision::Reject] {
                let arbiter = arbiter.clone();
                let booking_id = booking_id.clone();
                let worker_id = worker_id.clone();
                responders.push(tokio::spawn(async move {
                    arbiter.respond(&booking_id, &worker_id, decision).await
                }));
            }
        }
        let expirer = {
            let arbiter = arbiter.clone();
            let booking_id = booking_id.clone();
            tokio::spawn(async move { arbiter.expire(&booking_id, Utc::now()).await })
        };
        let canceller = {
            let arbiter = arbiter.clone();
            let booking_id = booking_id.clone();
            tokio::spawn(async move { arbiter.cancel(&booking_id, Utc::now()).await })
        };

        for joined in futures::future::join_all(responders).await {
            match joined.unwrap() {
                Ok(_) | Err(ArbiterError::InvalidTransition { .. }) => {}
                Err(other) => panic!("第{round}轮响应返回意外错误: {other:?}"),
            }
        }
        expirer.await.unwrap().unwrap();
        match canceller.await.unwrap() {
            Ok(_) | Err(ArbiterError::BookingClosed { .. }) => {}
            Err(other) => panic!("第{round}轮取消返回意外错误: {other:?}"),
        }

        let details = arbiter.get_booking(&booking_id).await.unwrap();
        let accepted = details.accepted_count();
        assert!(accepted <= 1, "第{round}轮出现多个接单者");
        assert_eq!(details.pending_count(), 0, "第{round}轮仍有待处理记录");
        assert_eq!(
            details.dispatch.status == DispatchStatus::Accepted,
            accepted == 1,
            "第{round}轮派发头状态与候选记录不一致: {:?}",
            details.dispatch.status
        );
        let winner = details
            .candidates
            .iter()
            .find(|b| b.status == BookingStatus::Accepted)
            .map(|b| b.worker_id.clone());
        assert_eq!(details.dispatch.accepted_worker_id, winner);
    }
    manager.close().await;
}

use std::sync::Arc;

use arbiter_core::{
    AcceptAttempt, Booking, BookingDispatch, BookingRepository, BookingStatus, BookingTemplate,
    DispatchStatus, RejectAttempt,
};
use arbiter_infrastructure::database::DatabaseManager;
use chrono::{Duration, Utc};
use futures::future::join_all;
use tempfile::TempDir;

struct TestDb {
    _dir: TempDir,
    manager: DatabaseManager,
    repo: Arc<dyn BookingRepository>,
}

async fn file_db() -> TestDb {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("arbiter.db").display());
    let manager = DatabaseManager::from_url(&url).await.unwrap();
    let repo = manager.booking_repository();
    TestDb {
        _dir: dir,
        manager,
        repo,
    }
}

fn template(customer_id: &str) -> BookingTemplate {
    BookingTemplate {
        customer_id: customer_id.to_string(),
        location: "221 Baker St".to_string(),
        contact_number: "+15550123".to_string(),
        description: Some("boiler service".to_string()),
    }
}

async fn seed(
    repo: &Arc<dyn BookingRepository>,
    booking_id: &str,
    workers: &[&str],
    created_at: chrono::DateTime<Utc>,
) {
    let dispatch = BookingDispatch::open(booking_id, "c-1", workers.len(), created_at);
    let rows: Vec<Booking> = workers
        .iter()
        .map(|w| Booking::pending(booking_id, w, &template("c-1"), created_at))
        .collect();
    repo.insert_dispatch(&dispatch, &rows).await.unwrap();
}

#[tokio::test]
async fn test_insert_and_read_back() {
    let db = file_db().await;
    let now = Utc::now();
    seed(&db.repo, "b-1", &["w-1", "w-2"], now).await;

    let dispatch = db.repo.get_dispatch("b-1").await.unwrap().unwrap();
    assert_eq!(dispatch.status, DispatchStatus::Open);
    assert_eq!(dispatch.candidate_count, 2);
    assert!(dispatch.accepted_worker_id.is_none());

    let candidates = db.repo.get_candidates("b-1").await.unwrap();
    assert_eq!(candidates.len(), 2);
    assert!(candidates.iter().all(|b| b.status == BookingStatus::Pending));
    assert_eq!(candidates[0].worker_id, "w-1");
    assert_eq!(candidates[0].description.as_deref(), Some("boiler service"));

    assert!(db.repo.get_candidate("b-1", "w-9").await.unwrap().is_none());
    db.manager.close().await;
}

#[tokio::test]
async fn test_duplicate_dispatch_is_rejected() {
    let db = file_db().await;
    let now = Utc::now();
    seed(&db.repo, "b-1", &["w-1"], now).await;

    let dispatch = BookingDispatch::open("b-1", "c-1", 1, now);
    let rows = vec![Booking::pending("b-1", "w-1", &template("c-1"), now)];
    assert!(db.repo.insert_dispatch(&dispatch, &rows).await.is_err());

    // 失败的插入不能留下部分数据
    assert_eq!(db.repo.get_candidates("b-1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_accept_resolves_all_siblings_atomically() {
    let db = file_db().await;
    seed(&db.repo, "b-1", &["w-1", "w-2", "w-3"], Utc::now()).await;

    let attempt = db.repo.try_accept("b-1", "w-2", Utc::now()).await.unwrap();
    let AcceptAttempt::Won {
        mut superseded_worker_ids,
    } = attempt
    else {
        panic!("expected accept to win");
    };
    superseded_worker_ids.sort();
    assert_eq!(superseded_worker_ids, vec!["w-1", "w-3"]);

    let dispatch = db.repo.get_dispatch("b-1").await.unwrap().unwrap();
    assert_eq!(dispatch.status, DispatchStatus::Accepted);
    assert_eq!(dispatch.accepted_worker_id.as_deref(), Some("w-2"));
    assert!(dispatch.resolved_at.is_some());

    let candidates = db.repo.get_candidates("b-1").await.unwrap();
    let accepted: Vec<_> = candidates
        .iter()
        .filter(|b| b.status == BookingStatus::Accepted)
        .collect();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].worker_id, "w-2");
    for loser in candidates.iter().filter(|b| b.worker_id != "w-2") {
        assert_eq!(loser.status, BookingStatus::Rejected);
        assert_eq!(loser.superseded_by.as_deref(), Some("w-2"));
    }

    // 第二次接单不产生任何写入
    let again = db.repo.try_accept("b-1", "w-1", Utc::now()).await.unwrap();
    assert_eq!(again, AcceptAttempt::Lost);
    let w1 = db.repo.get_candidate("b-1", "w-1").await.unwrap().unwrap();
    assert_eq!(w1.status, BookingStatus::Rejected);
}

#[tokio::test]
async fn test_accept_by_unknown_worker_leaves_dispatch_open() {
    let db = file_db().await;
    seed(&db.repo, "b-1", &["w-1"], Utc::now()).await;

    let attempt = db.repo.try_accept("b-1", "w-404", Utc::now()).await.unwrap();
    assert_eq!(attempt, AcceptAttempt::Lost);

    // 派发头的条件更新必须随事务回滚
    let dispatch = db.repo.get_dispatch("b-1").await.unwrap().unwrap();
    assert_eq!(dispatch.status, DispatchStatus::Open);
    assert!(dispatch.accepted_worker_id.is_none());
}

#[tokio::test]
async fn test_concurrent_accepts_have_single_winner() {
    let db = file_db().await;
    let workers: Vec<String> = (0..8).map(|i| format!("w-{i}")).collect();
    let worker_refs: Vec<&str> = workers.iter().map(String::as_str).collect();
    seed(&db.repo, "b-race", &worker_refs, Utc::now()).await;

    let attempts = join_all(workers.iter().cloned().map(|worker_id| {
        let repo = db.repo.clone();
        tokio::spawn(async move { repo.try_accept("b-race", &worker_id, Utc::now()).await })
    }))
    .await;

    let winners = attempts
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .filter(|attempt| matches!(attempt, AcceptAttempt::Won { .. }))
        .count();
    assert_eq!(winners, 1);

    let candidates = db.repo.get_candidates("b-race").await.unwrap();
    let accepted = candidates
        .iter()
        .filter(|b| b.status == BookingStatus::Accepted)
        .count();
    assert_eq!(accepted, 1);
    assert!(candidates.iter().all(|b| !b.is_pending()));
}

#[tokio::test]
async fn test_reject_then_decline_when_none_pending() {
    let db = file_db().await;
    seed(&db.repo, "b-1", &["w-1", "w-2"], Utc::now()).await;

    let first = db.repo.try_reject("b-1", "w-1", Utc::now()).await.unwrap();
    assert_eq!(first, RejectAttempt::Rejected { dispatch_declined: false });

    let repeat = db.repo.try_reject("b-1", "w-1", Utc::now()).await.unwrap();
    assert_eq!(repeat, RejectAttempt::Lost);

    let last = db.repo.try_reject("b-1", "w-2", Utc::now()).await.unwrap();
    assert_eq!(last, RejectAttempt::Rejected { dispatch_declined: true });

    let dispatch = db.repo.get_dispatch("b-1").await.unwrap().unwrap();
    assert_eq!(dispatch.status, DispatchStatus::Declined);
    assert!(dispatch.accepted_worker_id.is_none());
}

#[tokio::test]
async fn test_expire_open_respects_cutoff_and_is_idempotent() {
    let db = file_db().await;
    let now = Utc::now();
    seed(&db.repo, "b-old", &["w-1", "w-2"], now - Duration::minutes(10)).await;
    seed(&db.repo, "b-new", &["w-1"], now).await;

    let cutoff = now - Duration::minutes(5);
    let closed = db.repo.expire_open(None, cutoff, now).await.unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].booking_id, "b-old");
    assert_eq!(closed[0].worker_ids.len(), 2);

    let old = db.repo.get_dispatch("b-old").await.unwrap().unwrap();
    assert_eq!(old.status, DispatchStatus::Expired);
    let fresh = db.repo.get_dispatch("b-new").await.unwrap().unwrap();
    assert_eq!(fresh.status, DispatchStatus::Open);

    let again = db.repo.expire_open(None, cutoff, now).await.unwrap();
    assert!(again.is_empty());

    // 过期后接单失败
    let attempt = db.repo.try_accept("b-old", "w-1", now).await.unwrap();
    assert_eq!(attempt, AcceptAttempt::Lost);
    let row = db.repo.get_candidate("b-old", "w-1").await.unwrap().unwrap();
    assert_eq!(row.status, BookingStatus::Expired);
}

#[tokio::test]
async fn test_expire_single_booking_only() {
    let db = file_db().await;
    let past = Utc::now() - Duration::minutes(10);
    seed(&db.repo, "b-1", &["w-1"], past).await;
    seed(&db.repo, "b-2", &["w-1"], past).await;

    let now = Utc::now();
    let closed = db.repo.expire_open(Some("b-1"), now, now).await.unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].booking_id, "b-1");

    let other = db.repo.get_dispatch("b-2").await.unwrap().unwrap();
    assert_eq!(other.status, DispatchStatus::Open);
}

#[tokio::test]
async fn test_expire_leaves_accepted_booking_untouched() {
    let db = file_db().await;
    let past = Utc::now() - Duration::minutes(10);
    seed(&db.repo, "b-1", &["w-1", "w-2"], past).await;
    db.repo.try_accept("b-1", "w-1", Utc::now()).await.unwrap();

    let now = Utc::now();
    let closed = db.repo.expire_open(Some("b-1"), now, now).await.unwrap();
    assert!(closed.is_empty());

    let w1 = db.repo.get_candidate("b-1", "w-1").await.unwrap().unwrap();
    assert_eq!(w1.status, BookingStatus::Accepted);
}

#[tokio::test]
async fn test_cancel_open_and_resolved() {
    let db = file_db().await;
    seed(&db.repo, "b-1", &["w-1", "w-2"], Utc::now()).await;
    seed(&db.repo, "b-2", &["w-1"], Utc::now()).await;
    db.repo.try_accept("b-2", "w-1", Utc::now()).await.unwrap();

    let cancelled = db.repo.cancel_open("b-1", Utc::now()).await.unwrap().unwrap();
    assert_eq!(cancelled.worker_ids.len(), 2);
    let row = db.repo.get_candidate("b-1", "w-2").await.unwrap().unwrap();
    assert_eq!(row.status, BookingStatus::Cancelled);

    assert!(db.repo.cancel_open("b-2", Utc::now()).await.unwrap().is_none());
    assert!(db.repo.cancel_open("missing", Utc::now()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_by_worker_filters_and_orders() {
    let db = file_db().await;
    let now = Utc::now();
    seed(&db.repo, "b-1", &["w-1", "w-2"], now - Duration::minutes(2)).await;
    seed(&db.repo, "b-2", &["w-1"], now - Duration::minutes(1)).await;
    seed(&db.repo, "b-3", &["w-1"], now).await;
    db.repo.try_accept("b-1", "w-2", now).await.unwrap();

    let all = db.repo.get_by_worker("w-1", None, 10).await.unwrap();
    let ids: Vec<_> = all.iter().map(|b| b.booking_id.as_str()).collect();
    assert_eq!(ids, vec!["b-3", "b-2", "b-1"]);

    let pending = db
        .repo
        .get_by_worker("w-1", Some(BookingStatus::Pending), 10)
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);

    let limited = db.repo.get_by_worker("w-1", None, 1).await.unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].booking_id, "b-3");
}

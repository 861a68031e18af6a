//! 预约单仲裁服务
//!
//! 一次派发会把同一个预约单推送给多个候选Worker，仲裁服务保证最多一个Worker接单成功。
//! 所有互斥都交给存储层的条件更新完成，本服务在跨越存储I/O时不持有任何锁。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arbiter_core::{
    AcceptAttempt, AppConfig, ArbiterError, ArbiterResult, Booking, BookingDetails,
    BookingDispatch, BookingRepository, BookingStatus, BookingTemplate, ClosedDispatch, Decision,
    DispatchNotifier, ExpireReport, NotificationPayload, RejectAttempt, RespondOutcome,
};
use arbiter_infrastructure::ArbiterMetrics;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// 仲裁服务配置
#[derive(Debug, Clone)]
pub struct AssignmentArbiterConfig {
    /// 预约单保持开放的时长
    pub booking_ttl: chrono::Duration,
    /// 单次派发的候选上限
    pub max_candidates: usize,
    /// 单个通知的超时时间
    pub notify_timeout: Duration,
    /// Worker收件箱单次返回的最大条数
    pub inbox_limit: i64,
}

impl Default for AssignmentArbiterConfig {
    fn default() -> Self {
        Self {
            booking_ttl: chrono::Duration::seconds(300),
            max_candidates: 50,
            notify_timeout: Duration::from_secs(5),
            inbox_limit: 100,
        }
    }
}

impl AssignmentArbiterConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            booking_ttl: config.arbiter.booking_ttl(),
            max_candidates: config.arbiter.max_candidates,
            notify_timeout: Duration::from_secs(config.notifier.timeout_seconds),
            ..Self::default()
        }
    }
}

/// 预约单仲裁服务
pub struct AssignmentArbiter {
    repo: Arc<dyn BookingRepository>,
    notifier: Arc<dyn DispatchNotifier>,
    metrics: ArbiterMetrics,
    config: AssignmentArbiterConfig,
}

impl AssignmentArbiter {
    pub fn new(
        repo: Arc<dyn BookingRepository>,
        notifier: Arc<dyn DispatchNotifier>,
        config: AssignmentArbiterConfig,
    ) -> Self {
        Self {
            repo,
            notifier,
            metrics: ArbiterMetrics::new(),
            config,
        }
    }

    pub fn config(&self) -> &AssignmentArbiterConfig {
        &self.config
    }

    /// 存储健康检查
    pub async fn health_check(&self) -> ArbiterResult<()> {
        self.repo.health_check().await
    }

    /// 派发预约单：为每个候选Worker创建一条待处理记录，提交后异步通知
    #[instrument(skip(self, template, candidate_worker_ids), fields(
        customer_id = %template.customer_id,
        candidates = candidate_worker_ids.len(),
    ))]
    pub async fn dispatch(
        &self,
        template: BookingTemplate,
        candidate_worker_ids: Vec<String>,
    ) -> ArbiterResult<BookingDispatch> {
        let workers = self.normalize_candidates(candidate_worker_ids)?;
        if template.customer_id.trim().is_empty() {
            return Err(ArbiterError::InvalidRequest("客户ID不能为空".to_string()));
        }

        let now = Utc::now();
        let booking_id = Uuid::new_v4().to_string();
        let dispatch = BookingDispatch::open(&booking_id, &template.customer_id, workers.len(), now);
        let rows: Vec<Booking> = workers
            .iter()
            .map(|worker_id| Booking::pending(&booking_id, worker_id, &template, now))
            .collect();

        self.repo.insert_dispatch(&dispatch, &rows).await?;

        info!(
            "📋 预约单 {} 已派发给 {} 个候选Worker",
            booking_id,
            rows.len()
        );
        self.metrics.record_dispatch(rows.len());
        self.spawn_notifications(&rows);

        Ok(dispatch)
    }

    /// 去重（保留首次出现的顺序）并校验候选列表
    fn normalize_candidates(&self, candidate_worker_ids: Vec<String>) -> ArbiterResult<Vec<String>> {
        let mut seen = HashSet::new();
        let mut workers = Vec::with_capacity(candidate_worker_ids.len());
        for worker_id in candidate_worker_ids {
            let worker_id = worker_id.trim().to_string();
            if worker_id.is_empty() {
                return Err(ArbiterError::InvalidRequest(
                    "候选Worker ID不能为空".to_string(),
                ));
            }
            if seen.insert(worker_id.clone()) {
                workers.push(worker_id);
            }
        }

        if workers.is_empty() {
            return Err(ArbiterError::InvalidRequest(
                "至少需要一个候选Worker".to_string(),
            ));
        }
        if workers.len() > self.config.max_candidates {
            return Err(ArbiterError::InvalidRequest(format!(
                "候选Worker数量 {} 超过上限 {}",
                workers.len(),
                self.config.max_candidates
            )));
        }
        Ok(workers)
    }

    fn spawn_notifications(&self, rows: &[Booking]) {
        for row in rows {
            let notifier = Arc::clone(&self.notifier);
            let metrics = self.metrics.clone();
            let timeout = self.config.notify_timeout;
            let worker_id = row.worker_id.clone();
            let booking_id = row.booking_id.clone();
            let payload = NotificationPayload::from(row);

            tokio::spawn(async move {
                let channel = notifier.name();
                match tokio::time::timeout(
                    timeout,
                    notifier.notify(&worker_id, &booking_id, &payload),
                )
                .await
                {
                    Ok(Ok(())) => {
                        debug!("已通知Worker {} 预约单 {}", worker_id, booking_id);
                    }
                    Ok(Err(e)) => {
                        warn!(
                            channel = channel,
                            "通知Worker {} 预约单 {} 失败: {}", worker_id, booking_id, e
                        );
                        metrics.record_notifier_failure(channel);
                    }
                    Err(_) => {
                        warn!(
                            channel = channel,
                            "通知Worker {} 预约单 {} 超时 ({:?})", worker_id, booking_id, timeout
                        );
                        metrics.record_notifier_failure(channel);
                    }
                }
            });
        }
    }

    /// 处理Worker的接单/拒单答复
    ///
    /// 并发竞争失败返回 `RespondOutcome::AlreadyResolved`，不作为错误。
    #[instrument(skip(self))]
    pub async fn respond(
        &self,
        booking_id: &str,
        worker_id: &str,
        decision: Decision,
    ) -> ArbiterResult<RespondOutcome> {
        let started = Instant::now();
        let now = Utc::now();

        let result = match decision {
            Decision::Accept => self.accept(booking_id, worker_id, now).await,
            Decision::Reject => self.reject(booking_id, worker_id, now).await,
        };

        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(e) => error_label(e),
        };
        self.metrics.record_respond(label, started.elapsed());
        result
    }

    async fn accept(
        &self,
        booking_id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> ArbiterResult<RespondOutcome> {
        match self.repo.try_accept(booking_id, worker_id, now).await? {
            AcceptAttempt::Won {
                superseded_worker_ids,
            } => {
                info!(
                    "✅ Worker {} 接单成功: 预约单 {}, 连带拒绝 {} 个候选",
                    worker_id,
                    booking_id,
                    superseded_worker_ids.len()
                );
                Ok(RespondOutcome::Accepted {
                    superseded_worker_ids,
                })
            }
            AcceptAttempt::Lost => {
                self.classify_lost(booking_id, worker_id, Decision::Accept)
                    .await
            }
        }
    }

    async fn reject(
        &self,
        booking_id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> ArbiterResult<RespondOutcome> {
        match self.repo.try_reject(booking_id, worker_id, now).await? {
            RejectAttempt::Rejected { dispatch_declined } => {
                if dispatch_declined {
                    info!("预约单 {} 的所有候选Worker均已拒绝", booking_id);
                } else {
                    debug!("Worker {} 拒绝了预约单 {}", worker_id, booking_id);
                }
                Ok(RespondOutcome::Rejected)
            }
            RejectAttempt::Lost => {
                self.classify_lost(booking_id, worker_id, Decision::Reject)
                    .await
            }
        }
    }

    /// 条件更新未命中后，重新读取本行状态并归类
    async fn classify_lost(
        &self,
        booking_id: &str,
        worker_id: &str,
        decision: Decision,
    ) -> ArbiterResult<RespondOutcome> {
        let Some(row) = self.repo.get_candidate(booking_id, worker_id).await? else {
            if self.repo.get_dispatch(booking_id).await?.is_none() {
                return Err(ArbiterError::BookingNotFound {
                    booking_id: booking_id.to_string(),
                });
            }
            return Err(ArbiterError::CandidateNotFound {
                booking_id: booking_id.to_string(),
                worker_id: worker_id.to_string(),
            });
        };

        match row.status {
            BookingStatus::Accepted => {
                debug!("预约单 {} 已由Worker {} 本人接单", booking_id, worker_id);
                Ok(RespondOutcome::AlreadyResolved {
                    status: BookingStatus::Accepted,
                    accepted_worker_id: Some(row.worker_id),
                })
            }
            BookingStatus::Rejected if row.superseded_by.is_some() => {
                info!(
                    "Worker {} 抢单失败: 预约单 {} 已被 {:?} 接单",
                    worker_id, booking_id, row.superseded_by
                );
                Ok(RespondOutcome::AlreadyResolved {
                    status: BookingStatus::Rejected,
                    accepted_worker_id: row.superseded_by,
                })
            }
            BookingStatus::Pending => {
                // 条件更新未命中但本行仍待处理，只可能是读到了并发事务提交前的状态
                warn!("预约单 {} 的候选 {} 状态未决", booking_id, worker_id);
                Err(ArbiterError::StoreUnavailable(format!(
                    "预约单 {booking_id} 状态正在变化，请重试"
                )))
            }
            current => Err(ArbiterError::InvalidTransition {
                booking_id: booking_id.to_string(),
                worker_id: worker_id.to_string(),
                current,
                decision,
            }),
        }
    }

    /// 过期单个预约单：创建时间早于 `now - ttl` 且仍开放时生效，重复调用无副作用
    #[instrument(skip(self))]
    pub async fn expire(&self, booking_id: &str, now: DateTime<Utc>) -> ArbiterResult<ExpireReport> {
        let cutoff = now - self.config.booking_ttl;
        let expired = self.repo.expire_open(Some(booking_id), cutoff, now).await?;

        if expired.is_empty() && self.repo.get_dispatch(booking_id).await?.is_none() {
            return Err(ArbiterError::BookingNotFound {
                booking_id: booking_id.to_string(),
            });
        }

        Ok(self.finish_expiry(expired))
    }

    /// 过期全部超时的开放预约单，由后台扫描周期调用
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> ArbiterResult<ExpireReport> {
        let cutoff = now - self.config.booking_ttl;
        let expired = self.repo.expire_open(None, cutoff, now).await?;
        Ok(self.finish_expiry(expired))
    }

    fn finish_expiry(&self, expired: Vec<ClosedDispatch>) -> ExpireReport {
        let report = ExpireReport { expired };
        if !report.is_empty() {
            info!(
                "⏰ 过期 {} 个预约单, 共 {} 条候选记录",
                report.booking_count(),
                report.row_count()
            );
        }
        self.metrics
            .record_expired(report.booking_count(), report.row_count());
        report
    }

    /// 客户取消仍开放的预约单
    #[instrument(skip(self))]
    pub async fn cancel(&self, booking_id: &str, now: DateTime<Utc>) -> ArbiterResult<ClosedDispatch> {
        if let Some(closed) = self.repo.cancel_open(booking_id, now).await? {
            info!(
                "预约单 {} 已取消, 涉及 {} 个待处理候选",
                booking_id,
                closed.worker_ids.len()
            );
            self.metrics.record_cancelled();
            return Ok(closed);
        }

        match self.repo.get_dispatch(booking_id).await? {
            None => Err(ArbiterError::BookingNotFound {
                booking_id: booking_id.to_string(),
            }),
            Some(dispatch) => {
                debug!("预约单 {} 当前状态 {}，无法取消", booking_id, dispatch.status);
                Err(ArbiterError::BookingClosed {
                    booking_id: booking_id.to_string(),
                })
            }
        }
    }

    /// 查询预约单详情
    pub async fn get_booking(&self, booking_id: &str) -> ArbiterResult<BookingDetails> {
        let dispatch = self
            .repo
            .get_dispatch(booking_id)
            .await?
            .ok_or_else(|| ArbiterError::BookingNotFound {
                booking_id: booking_id.to_string(),
            })?;
        let candidates = self.repo.get_candidates(booking_id).await?;

        Ok(BookingDetails {
            dispatch,
            candidates,
        })
    }

    /// 查询Worker的候选记录，最新的在前
    pub async fn worker_inbox(
        &self,
        worker_id: &str,
        status: Option<BookingStatus>,
    ) -> ArbiterResult<Vec<Booking>> {
        self.repo
            .get_by_worker(worker_id, status, self.config.inbox_limit)
            .await
    }
}

fn error_label(err: &ArbiterError) -> &'static str {
    match err {
        ArbiterError::BookingNotFound { .. } | ArbiterError::CandidateNotFound { .. } => {
            "not_found"
        }
        ArbiterError::InvalidTransition { .. } => "invalid_transition",
        ArbiterError::StoreUnavailable(_) => "store_unavailable",
        _ => "error",
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::booking::{Booking, BookingStatus};

/// 仓储层抢单结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptAttempt {
    /// 条件更新命中，返回被连带拒绝的Worker
    Won { superseded_worker_ids: Vec<String> },
    /// 条件更新未命中，事务已回滚
    Lost,
}

/// 仓储层拒单结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectAttempt {
    Rejected {
        /// 该拒绝使预约单不再有任何待处理候选
        dispatch_declined: bool,
    },
    Lost,
}

/// `respond` 的业务结果
///
/// `AlreadyResolved` 是并发竞争下的预期结果而非错误。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RespondOutcome {
    Accepted {
        superseded_worker_ids: Vec<String>,
    },
    Rejected,
    AlreadyResolved {
        status: BookingStatus,
        accepted_worker_id: Option<String>,
    },
}

impl RespondOutcome {
    /// 该Worker候选记录的最终状态
    pub fn final_status(&self) -> BookingStatus {
        match self {
            RespondOutcome::Accepted { .. } => BookingStatus::Accepted,
            RespondOutcome::Rejected => BookingStatus::Rejected,
            RespondOutcome::AlreadyResolved { status, .. } => *status,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RespondOutcome::Accepted { .. } => "accepted",
            RespondOutcome::Rejected => "rejected",
            RespondOutcome::AlreadyResolved { .. } => "already_resolved",
        }
    }
}

/// 一个预约单过期（或取消）时受影响的候选
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedDispatch {
    pub booking_id: String,
    pub worker_ids: Vec<String>,
}

/// 过期处理报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireReport {
    pub expired: Vec<ClosedDispatch>,
}

impl ExpireReport {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty()
    }

    pub fn booking_count(&self) -> usize {
        self.expired.len()
    }

    pub fn row_count(&self) -> usize {
        self.expired.iter().map(|d| d.worker_ids.len()).sum()
    }
}

/// 发给Worker设备的通知内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub booking_id: String,
    pub customer_id: String,
    pub location: String,
    pub contact_number: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Booking> for NotificationPayload {
    fn from(booking: &Booking) -> Self {
        Self {
            booking_id: booking.booking_id.clone(),
            customer_id: booking.customer_id.clone(),
            location: booking.location.clone(),
            contact_number: booking.contact_number.clone(),
            description: booking.description.clone(),
            created_at: booking.created_at,
        }
    }
}

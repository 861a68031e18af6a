//! Repository error helpers with booking context
//!
//! 为仓储操作附加预约单上下文，统一记录结构化日志，并保持瞬时错误可重试的分类。

use arbiter_core::ArbiterError;
use chrono::{DateTime, Utc};
use sqlx::Error as SqlxError;
use std::fmt;
use tracing::{debug, error, warn};

/// Operation context for repository operations
#[derive(Debug, Clone)]
pub enum RepositoryOperation {
    Create,
    Read,
    Accept,
    Reject,
    Expire,
    Cancel,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryOperation::Create => write!(f, "创建"),
            RepositoryOperation::Read => write!(f, "查询"),
            RepositoryOperation::Accept => write!(f, "接单"),
            RepositoryOperation::Reject => write!(f, "拒单"),
            RepositoryOperation::Expire => write!(f, "过期处理"),
            RepositoryOperation::Cancel => write!(f, "取消"),
        }
    }
}

/// Context information for booking repository operations
#[derive(Debug, Clone)]
pub struct BookingOperationContext {
    pub operation: RepositoryOperation,
    pub booking_id: Option<String>,
    pub worker_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl BookingOperationContext {
    pub fn new(operation: RepositoryOperation) -> Self {
        Self {
            operation,
            booking_id: None,
            worker_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_booking_id(mut self, booking_id: impl Into<String>) -> Self {
        self.booking_id = Some(booking_id.into());
        self
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn entity_description(&self) -> String {
        match (&self.booking_id, &self.worker_id) {
            (Some(b), Some(w)) => format!("预约单 {} / Worker {}", b, w),
            (Some(b), None) => format!("预约单 {}", b),
            (None, Some(w)) => format!("Worker {} 的预约单", w),
            (None, None) => "预约单".to_string(),
        }
    }
}

pub struct RepositoryErrorHelpers;

impl RepositoryErrorHelpers {
    /// 记录带上下文的数据库错误并转换为 `ArbiterError`
    ///
    /// 瞬时错误保持为 `StoreUnavailable`，调用方据此决定是否重试。
    pub fn database_error(context: &BookingOperationContext, err: SqlxError) -> ArbiterError {
        let entity_desc = context.entity_description();
        let operation_desc = context.operation.to_string();

        if let SqlxError::Database(ref db_error) = err {
            if let Some(constraint) = db_error.constraint() {
                error!(
                    error = %err,
                    constraint = constraint,
                    "{}{}时发生数据库约束冲突",
                    operation_desc,
                    entity_desc
                );
                return ArbiterError::InvalidRequest(format!(
                    "{}{}时发生约束冲突: {}",
                    operation_desc, entity_desc, constraint
                ));
            }
            if db_error.is_unique_violation() {
                error!(error = %err, "{}{}时发生唯一约束冲突", operation_desc, entity_desc);
                return ArbiterError::InvalidRequest(format!(
                    "{}{}时发生唯一约束冲突",
                    operation_desc, entity_desc
                ));
            }
        }

        let mapped = ArbiterError::from(err);
        if mapped.is_retryable() {
            warn!(error = %mapped, "{}{}时存储暂不可用", operation_desc, entity_desc);
        } else {
            error!(error = %mapped, "{}{}时发生数据库错误", operation_desc, entity_desc);
        }
        mapped
    }

    pub fn log_operation_success(context: &BookingOperationContext, details: Option<&str>) {
        match details {
            Some(details) => debug!(
                "{}{}成功: {}",
                context.operation,
                context.entity_description(),
                details
            ),
            None => debug!("{}{}成功", context.operation, context.entity_description()),
        }
    }
}

/// 构造预约单仓储操作上下文
#[macro_export]
macro_rules! booking_context {
    ($op:expr) => {
        $crate::error_handling::BookingOperationContext::new($op)
    };
    ($op:expr, booking_id = $booking_id:expr) => {
        $crate::error_handling::BookingOperationContext::new($op).with_booking_id($booking_id)
    };
    ($op:expr, booking_id = $booking_id:expr, worker_id = $worker_id:expr) => {
        $crate::error_handling::BookingOperationContext::new($op)
            .with_booking_id($booking_id)
            .with_worker_id($worker_id)
    };
}

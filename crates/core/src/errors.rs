use thiserror::Error;

use crate::models::{BookingStatus, Decision};

/// 仲裁服务错误类型定义
///
/// `AlreadyResolved` 不在此列：并发竞争失败是正常结果，由
/// [`crate::models::RespondOutcome::AlreadyResolved`] 表达。
#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error("数据库错误: {0}")]
    Database(sqlx::Error),

    #[error("存储暂不可用: {0}")]
    StoreUnavailable(String),

    #[error("预约单未找到: {booking_id}")]
    BookingNotFound { booking_id: String },

    #[error("候选记录未找到: booking={booking_id}, worker={worker_id}")]
    CandidateNotFound {
        booking_id: String,
        worker_id: String,
    },

    #[error("非法状态流转: booking={booking_id}, worker={worker_id}, 当前状态 {current:?}, 操作 {decision:?}")]
    InvalidTransition {
        booking_id: String,
        worker_id: String,
        current: BookingStatus,
        decision: Decision,
    },

    #[error("预约单已结束，无法执行该操作: {booking_id}")]
    BookingClosed { booking_id: String },

    #[error("通知发送失败: {0}")]
    Notifier(String),

    #[error("无效的请求参数: {0}")]
    InvalidRequest(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl ArbiterError {
    /// 调用方是否可以重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, ArbiterError::StoreUnavailable(_))
    }

    /// 是否为资源不存在类错误
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ArbiterError::BookingNotFound { .. } | ArbiterError::CandidateNotFound { .. }
        )
    }
}

impl From<sqlx::Error> for ArbiterError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient(&err) {
            ArbiterError::StoreUnavailable(err.to_string())
        } else {
            ArbiterError::Database(err)
        }
    }
}

/// 判断数据库错误是否为瞬时错误
///
/// SQLite: 5 = SQLITE_BUSY, 6 = SQLITE_LOCKED（含扩展码）。
/// PostgreSQL: 40001 = serialization_failure, 40P01 = deadlock_detected, 57P01 = admin_shutdown。
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => {
                let code = code.as_ref();
                matches!(code, "40001" | "40P01" | "57P01")
                    || code
                        .parse::<i32>()
                        .map(|c| matches!(c & 0xff, 5 | 6))
                        .unwrap_or(false)
            }
            None => false,
        },
        _ => false,
    }
}

/// 统一的Result类型
pub type ArbiterResult<T> = std::result::Result<T, ArbiterError>;

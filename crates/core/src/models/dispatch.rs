use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::booking::{Booking, BookingStatus};

/// 派发头记录：每个 booking_id 一行，所有终结性决定都对它做条件更新
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingDispatch {
    pub booking_id: String,
    pub customer_id: String,
    pub status: DispatchStatus,
    pub accepted_worker_id: Option<String>,
    pub candidate_count: i32,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DispatchStatus {
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "ACCEPTED")]
    Accepted,
    #[serde(rename = "EXPIRED")]
    Expired,
    #[serde(rename = "CANCELLED")]
    Cancelled,
    /// 所有候选Worker均已拒绝
    #[serde(rename = "DECLINED")]
    Declined,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Open => "OPEN",
            DispatchStatus::Accepted => "ACCEPTED",
            DispatchStatus::Expired => "EXPIRED",
            DispatchStatus::Cancelled => "CANCELLED",
            DispatchStatus::Declined => "DECLINED",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, DispatchStatus::Open)
    }
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OPEN" => Ok(DispatchStatus::Open),
            "ACCEPTED" => Ok(DispatchStatus::Accepted),
            "EXPIRED" => Ok(DispatchStatus::Expired),
            "CANCELLED" => Ok(DispatchStatus::Cancelled),
            "DECLINED" => Ok(DispatchStatus::Declined),
            _ => Err(format!("Invalid dispatch status: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for DispatchStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <str as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for DispatchStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(s.parse::<DispatchStatus>()?)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for DispatchStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

impl sqlx::Type<sqlx::Postgres> for DispatchStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <str as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for DispatchStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(s.parse::<DispatchStatus>()?)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for DispatchStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

impl BookingDispatch {
    pub fn open(
        booking_id: &str,
        customer_id: &str,
        candidate_count: usize,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            booking_id: booking_id.to_string(),
            customer_id: customer_id.to_string(),
            status: DispatchStatus::Open,
            accepted_worker_id: None,
            candidate_count: candidate_count as i32,
            created_at,
            resolved_at: None,
        }
    }
}

/// 预约单详情：派发头 + 全部候选记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingDetails {
    pub dispatch: BookingDispatch,
    pub candidates: Vec<Booking>,
}

impl BookingDetails {
    pub fn accepted_count(&self) -> usize {
        self.candidates
            .iter()
            .filter(|b| b.status == BookingStatus::Accepted)
            .count()
    }

    pub fn pending_count(&self) -> usize {
        self.candidates.iter().filter(|b| b.is_pending()).count()
    }

    pub fn candidate(&self, worker_id: &str) -> Option<&Booking> {
        self.candidates.iter().find(|b| b.worker_id == worker_id)
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 候选记录（每个候选Worker一行，同一次派发共享 booking_id）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: i64,
    pub booking_id: String,
    pub worker_id: String,
    pub customer_id: String,
    pub status: BookingStatus,
    pub location: String,
    pub contact_number: String,
    pub description: Option<String>,
    /// 因其他Worker接单而被连带拒绝时，记录胜出的Worker
    pub superseded_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

/// 派发时由客户提交的预约内容，对仲裁逻辑不透明
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingTemplate {
    pub customer_id: String,
    pub location: String,
    pub contact_number: String,
    pub description: Option<String>,
}

/// 候选记录状态
///
/// 旧版测试脚本中以整数存储，解析时同样接受，映射关系见 [`BookingStatus::from_legacy_code`]。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BookingStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "ACCEPTED")]
    Accepted,
    #[serde(rename = "REJECTED")]
    Rejected,
    #[serde(rename = "EXPIRED")]
    Expired,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

/// Worker对候选记录的答复
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Accepted => "ACCEPTED",
            BookingStatus::Rejected => "REJECTED",
            BookingStatus::Expired => "EXPIRED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    /// 旧版整数状态码：0 待处理，1 已接单，3 已拒绝，4 已过期，5 已取消（2 保留未用）
    pub fn from_legacy_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(BookingStatus::Pending),
            1 => Some(BookingStatus::Accepted),
            3 => Some(BookingStatus::Rejected),
            4 => Some(BookingStatus::Expired),
            5 => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.trim().parse::<i32>() {
            return Self::from_legacy_code(code)
                .ok_or_else(|| format!("Invalid booking status code: {code}"));
        }
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(BookingStatus::Pending),
            "ACCEPTED" => Ok(BookingStatus::Accepted),
            "REJECTED" => Ok(BookingStatus::Rejected),
            "EXPIRED" => Ok(BookingStatus::Expired),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            _ => Err(format!("Invalid booking status: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for BookingStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <str as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for BookingStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(s.parse::<BookingStatus>()?)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for BookingStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

impl sqlx::Type<sqlx::Postgres> for BookingStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <str as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for BookingStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(s.parse::<BookingStatus>()?)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for BookingStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

impl Booking {
    /// 为某个候选Worker创建待处理记录
    pub fn pending(
        booking_id: &str,
        worker_id: &str,
        template: &BookingTemplate,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0, // 将由数据库生成
            booking_id: booking_id.to_string(),
            worker_id: worker_id.to_string(),
            customer_id: template.customer_id.clone(),
            status: BookingStatus::Pending,
            location: template.location.clone(),
            contact_number: template.contact_number.clone(),
            description: template.description.clone(),
            superseded_by: None,
            created_at,
            responded_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == BookingStatus::Pending
    }

    /// 是否因其他Worker接单而被连带拒绝
    pub fn is_superseded(&self) -> bool {
        self.status == BookingStatus::Rejected && self.superseded_by.is_some()
    }

    pub fn entity_description(&self) -> String {
        format!("预约单 {} / Worker {}", self.booking_id, self.worker_id)
    }
}

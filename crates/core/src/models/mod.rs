//! # 数据模型
//!
//! 定义预约派发与接单仲裁的核心数据结构。
//!
//! ## 核心模型
//!
//! ### Booking - 候选记录
//! 一次派发对每个候选Worker各生成一行，共享同一个 `booking_id`。
//! 记录只做状态流转，从不删除，作为审计轨迹保留。
//!
//! ### BookingDispatch - 派发头
//! 每个 `booking_id` 一行。接单、过期、取消都对它做
//! `WHERE status = 'OPEN'` 的条件更新，`rows_affected == 1` 即获得决定权。
//!
//! ## 状态流转
//!
//! ### 候选记录
//! ```text
//! Pending → Accepted
//!    ↓  ↘
//! Rejected  Expired / Cancelled
//! ```
//!
//! ### 派发头
//! ```text
//! Open → Accepted | Expired | Cancelled | Declined
//! ```
//!
//! ## 数据库映射
//!
//! ### booking_dispatches 表
//! - `booking_id` - 主键
//! - `status` - 派发状态
//! - `accepted_worker_id` - 胜出的Worker
//!
//! ### bookings 表
//! - `id` - 自增主键
//! - `booking_id` + `worker_id` - 唯一约束
//! - `status` - 候选状态
//! - `superseded_by` - 连带拒绝时的胜出Worker

pub mod booking;
pub mod dispatch;
pub mod outcome;

pub use booking::*;
pub use dispatch::*;
pub use outcome::*;

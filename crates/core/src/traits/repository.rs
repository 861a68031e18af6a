//! 数据仓储层接口定义
//!
//! 仲裁服务的全部正确性都建立在存储的原子条件更新之上，进程内不持有任何跨请求的锁。
//! 实现方需要保证：
//!
//! - `insert_dispatch` 在一个事务中写入派发头和全部候选记录
//! - `try_accept` / `try_reject` / `expire_open` / `cancel_open` 各自是一个事务，
//!   以 `UPDATE ... WHERE status = 'OPEN' | 'PENDING'` 的受影响行数判断是否命中
//! - 未命中时整体回滚，不产生任何部分写入
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use arbiter_core::traits::BookingRepository;
//!
//! async fn accept(repo: &dyn BookingRepository) -> ArbiterResult<()> {
//!     match repo.try_accept("b-1", "w-1", Utc::now()).await? {
//!         AcceptAttempt::Won { superseded_worker_ids } => {
//!             println!("接单成功, 连带拒绝 {:?}", superseded_worker_ids);
//!         }
//!         AcceptAttempt::Lost => println!("已被其他Worker抢先"),
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    AcceptAttempt, Booking, BookingDispatch, BookingStatus, ClosedDispatch, RejectAttempt,
};
use crate::ArbiterResult;

/// 预约单仓储接口
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// 在一个事务中写入派发头与全部候选记录
    async fn insert_dispatch(
        &self,
        dispatch: &BookingDispatch,
        candidates: &[Booking],
    ) -> ArbiterResult<()>;

    /// 查询派发头
    async fn get_dispatch(&self, booking_id: &str) -> ArbiterResult<Option<BookingDispatch>>;

    /// 查询某个预约单的全部候选记录，按创建顺序
    async fn get_candidates(&self, booking_id: &str) -> ArbiterResult<Vec<Booking>>;

    /// 查询单个候选记录
    async fn get_candidate(
        &self,
        booking_id: &str,
        worker_id: &str,
    ) -> ArbiterResult<Option<Booking>>;

    /// 查询Worker的候选记录，最新的在前
    async fn get_by_worker(
        &self,
        worker_id: &str,
        status: Option<BookingStatus>,
        limit: i64,
    ) -> ArbiterResult<Vec<Booking>>;

    /// 抢单：派发头 OPEN→ACCEPTED、本行 PENDING→ACCEPTED、其余待处理行 →REJECTED，
    /// 三步在同一事务内，任何一步未命中即回滚并返回 `Lost`
    async fn try_accept(
        &self,
        booking_id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> ArbiterResult<AcceptAttempt>;

    /// 拒单：本行 PENDING→REJECTED；若已无待处理候选则派发头 OPEN→DECLINED
    async fn try_reject(
        &self,
        booking_id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> ArbiterResult<RejectAttempt>;

    /// 将创建时间不晚于 `cutoff` 的 OPEN 派发置为 EXPIRED，其待处理候选置为 EXPIRED。
    /// `booking_id` 为 `None` 时处理全部超期派发
    async fn expire_open(
        &self,
        booking_id: Option<&str>,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ArbiterResult<Vec<ClosedDispatch>>;

    /// 客户取消：派发头 OPEN→CANCELLED，待处理候选 →CANCELLED；未命中返回 `None`
    async fn cancel_open(
        &self,
        booking_id: &str,
        now: DateTime<Utc>,
    ) -> ArbiterResult<Option<ClosedDispatch>>;

    /// 存储健康检查
    async fn health_check(&self) -> ArbiterResult<()>;
}

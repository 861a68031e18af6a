//! Assignment arbiter service
//!
//! 预约单派发、接单仲裁与过期处理。

pub mod arbiter;
pub mod expiry_sweeper;

pub use arbiter::{AssignmentArbiter, AssignmentArbiterConfig};
pub use expiry_sweeper::{ExpirySweeper, ExpirySweeperConfig};

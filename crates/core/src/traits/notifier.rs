use async_trait::async_trait;

use crate::models::NotificationPayload;
use crate::ArbiterResult;

/// 派单通知接口
///
/// 仲裁服务只在状态已提交后调用，返回的错误只记录日志，不影响派发或答复的结果。
#[async_trait]
pub trait DispatchNotifier: Send + Sync {
    async fn notify(
        &self,
        worker_id: &str,
        booking_id: &str,
        payload: &NotificationPayload,
    ) -> ArbiterResult<()>;

    /// 通知通道名称，用于日志
    fn name(&self) -> &'static str;
}

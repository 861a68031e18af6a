use arbiter_core::{ArbiterResult, DispatchNotifier, NotificationPayload};
use async_trait::async_trait;
use tracing::info;

/// 将派单通知写入日志，用于本地开发和没有推送网关的部署
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl DispatchNotifier for LogNotifier {
    async fn notify(
        &self,
        worker_id: &str,
        booking_id: &str,
        payload: &NotificationPayload,
    ) -> ArbiterResult<()> {
        info!(
            worker_id = worker_id,
            booking_id = booking_id,
            customer_id = %payload.customer_id,
            location = %payload.location,
            "📨 新预约单通知"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

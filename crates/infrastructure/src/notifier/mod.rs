//! 派单通知通道
//!
//! 仲裁服务只依赖 [`DispatchNotifier`] trait，这里提供日志、Webhook 与空实现。

pub mod log_notifier;
pub mod webhook_notifier;

use std::sync::Arc;
use std::time::Duration;

use arbiter_core::{
    config::{NotifierConfig, NotifierKind},
    ArbiterError, ArbiterResult, DispatchNotifier, NotificationPayload,
};
use async_trait::async_trait;

pub use log_notifier::LogNotifier;
pub use webhook_notifier::WebhookNotifier;

/// 不发送任何通知
#[derive(Debug, Default, Clone)]
pub struct NoopNotifier;

#[async_trait]
impl DispatchNotifier for NoopNotifier {
    async fn notify(
        &self,
        _worker_id: &str,
        _booking_id: &str,
        _payload: &NotificationPayload,
    ) -> ArbiterResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// 按配置创建通知通道
pub fn create_notifier(config: &NotifierConfig) -> ArbiterResult<Arc<dyn DispatchNotifier>> {
    match config.kind {
        NotifierKind::Log => Ok(Arc::new(LogNotifier)),
        NotifierKind::Noop => Ok(Arc::new(NoopNotifier)),
        NotifierKind::Webhook => {
            let url = config.webhook_url.clone().ok_or_else(|| {
                ArbiterError::Configuration("webhook通知需要配置webhook_url".to_string())
            })?;
            let notifier =
                WebhookNotifier::new(url, Duration::from_secs(config.timeout_seconds))?;
            Ok(Arc::new(notifier))
        }
    }
}

use std::time::Duration;

use arbiter_core::{ArbiterError, ArbiterResult, DispatchNotifier, NotificationPayload};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument};

/// 通过HTTP回调把派单推送给Worker设备网关
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    event: &'static str,
    worker_id: &'a str,
    booking_id: &'a str,
    booking: &'a NotificationPayload,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> ArbiterResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArbiterError::Configuration(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl DispatchNotifier for WebhookNotifier {
    #[instrument(skip(self, payload))]
    async fn notify(
        &self,
        worker_id: &str,
        booking_id: &str,
        payload: &NotificationPayload,
    ) -> ArbiterResult<()> {
        let body = WebhookBody {
            event: "booking.dispatched",
            worker_id,
            booking_id,
            booking: payload,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ArbiterError::Notifier(format!("请求推送网关失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArbiterError::Notifier(format!(
                "推送网关返回错误状态: {status}"
            )));
        }

        debug!("推送网关已接收通知");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

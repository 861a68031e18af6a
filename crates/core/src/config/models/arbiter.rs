use serde::{Deserialize, Serialize};

/// 仲裁服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbiterConfig {
    /// 预约单在无人接单时保持开放的时长（秒）
    pub booking_ttl_seconds: u64,
    /// 是否启用后台过期扫描
    pub expiry_sweep_enabled: bool,
    /// 过期扫描间隔（秒）
    pub expiry_sweep_interval_seconds: u64,
    /// 单次派发的候选Worker上限
    pub max_candidates: usize,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            booking_ttl_seconds: 300,
            expiry_sweep_enabled: true,
            expiry_sweep_interval_seconds: 30,
            max_candidates: 50,
        }
    }
}

impl ArbiterConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.booking_ttl_seconds == 0 {
            return Err(anyhow::anyhow!("预约单有效期必须大于0"));
        }

        if self.expiry_sweep_enabled && self.expiry_sweep_interval_seconds == 0 {
            return Err(anyhow::anyhow!("过期扫描间隔必须大于0"));
        }

        if self.max_candidates == 0 {
            return Err(anyhow::anyhow!("候选Worker上限必须大于0"));
        }

        Ok(())
    }

    pub fn booking_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.booking_ttl_seconds as i64)
    }
}

/// 通知通道类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    /// 仅写日志
    Log,
    /// HTTP回调推送网关
    Webhook,
    /// 不发送
    Noop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    pub kind: NotifierKind,
    pub webhook_url: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Log,
            webhook_url: None,
            timeout_seconds: 5,
        }
    }
}

impl NotifierConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.kind == NotifierKind::Webhook {
            match &self.webhook_url {
                Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
                Some(url) => {
                    return Err(anyhow::anyhow!("Webhook地址必须是HTTP(S)格式: {}", url));
                }
                None => return Err(anyhow::anyhow!("webhook通知需要配置webhook_url")),
            }
        }

        if self.timeout_seconds == 0 {
            return Err(anyhow::anyhow!("通知超时时间必须大于0"));
        }

        Ok(())
    }
}

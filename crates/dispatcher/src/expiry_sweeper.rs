use std::sync::Arc;
use std::time::Duration;

use arbiter_core::{AppConfig, ArbiterResult, ExpireReport};
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::arbiter::AssignmentArbiter;

/// 过期扫描配置
#[derive(Debug, Clone)]
pub struct ExpirySweeperConfig {
    /// 是否启用后台扫描
    pub enabled: bool,
    /// 扫描间隔
    pub interval: Duration,
}

impl Default for ExpirySweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30),
        }
    }
}

impl ExpirySweeperConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            enabled: config.arbiter.expiry_sweep_enabled,
            interval: Duration::from_secs(config.arbiter.expiry_sweep_interval_seconds),
        }
    }
}

/// 周期性过期超时未接单的预约单
pub struct ExpirySweeper {
    arbiter: Arc<AssignmentArbiter>,
    config: ExpirySweeperConfig,
}

impl ExpirySweeper {
    pub fn new(arbiter: Arc<AssignmentArbiter>, config: ExpirySweeperConfig) -> Self {
        Self { arbiter, config }
    }

    /// 执行一次扫描
    pub async fn sweep_once(&self) -> ArbiterResult<ExpireReport> {
        self.arbiter.expire_overdue(Utc::now()).await
    }

    /// 扫描循环，收到关闭信号后退出
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        if !self.config.enabled {
            info!("过期扫描未启用");
            return;
        }

        info!("启动过期扫描循环，间隔 {:?}", self.config.interval);
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report.is_empty() => debug!("本轮没有需要过期的预约单"),
                        Ok(report) => debug!("本轮过期 {} 个预约单", report.booking_count()),
                        Err(e) if e.is_retryable() => warn!("过期扫描时存储暂不可用: {}", e),
                        Err(e) => error!("过期扫描失败: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("收到关闭信号，退出过期扫描循环");
                    break;
                }
            }
        }
    }
}

//! Metrics collector for the booking arbiter

use std::time::Duration;

use anyhow::{Context, Result};
use metrics::{counter, histogram, Counter, Histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{debug, info};

/// 仲裁服务指标
#[derive(Clone)]
pub struct ArbiterMetrics {
    dispatch_total: Counter,
    candidates_total: Counter,
    expired_rows_total: Counter,
    notifier_failures_total: Counter,
    respond_duration: Histogram,
}

impl ArbiterMetrics {
    pub fn new() -> Self {
        Self {
            dispatch_total: counter!("arbiter_dispatch_total"),
            candidates_total: counter!("arbiter_dispatch_candidates_total"),
            expired_rows_total: counter!("arbiter_expired_rows_total"),
            notifier_failures_total: counter!("arbiter_notifier_failures_total"),
            respond_duration: histogram!("arbiter_respond_duration_seconds"),
        }
    }

    /// Record a dispatch with its candidate count
    pub fn record_dispatch(&self, candidate_count: usize) {
        self.dispatch_total.increment(1);
        self.candidates_total.increment(candidate_count as u64);
    }

    /// Record a respond call by outcome label
    pub fn record_respond(&self, outcome: &'static str, duration: Duration) {
        counter!("arbiter_respond_total", "outcome" => outcome).increment(1);
        self.respond_duration.record(duration.as_secs_f64());
        debug!(outcome = outcome, duration_ms = duration.as_millis() as u64, "记录答复指标");
    }

    pub fn record_expired(&self, booking_count: usize, row_count: usize) {
        if booking_count == 0 {
            return;
        }
        counter!("arbiter_expired_bookings_total").increment(booking_count as u64);
        self.expired_rows_total.increment(row_count as u64);
    }

    pub fn record_cancelled(&self) {
        counter!("arbiter_cancelled_total").increment(1);
    }

    pub fn record_notifier_failure(&self, channel: &'static str) {
        self.notifier_failures_total.increment(1);
        counter!("arbiter_notifier_failures_by_channel_total", "channel" => channel).increment(1);
    }
}

impl Default for ArbiterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 安装全局 Prometheus 记录器，返回用于渲染 `/metrics` 的句柄
///
/// 每个进程只能安装一次。
pub fn install_prometheus_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("安装Prometheus指标记录器失败")?;
    info!("Prometheus指标记录器已安装");
    Ok(handle)
}

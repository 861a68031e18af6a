//! 可观测性
//!
//! 指标通过 `metrics` 门面记录，由 Prometheus 导出器在 `/metrics` 暴露。

pub mod metrics_collector;

pub use metrics_collector::{install_prometheus_recorder, ArbiterMetrics};

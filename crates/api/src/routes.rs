use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use arbiter_dispatcher::AssignmentArbiter;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::handlers::{
    bookings::{cancel_booking, dispatch_booking, expire_booking, get_booking, respond_booking},
    health::health_check,
    metrics::prometheus_metrics,
    workers::worker_inbox,
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub arbiter: Arc<AssignmentArbiter>,
    pub metrics_handle: Option<PrometheusHandle>,
}

/// 创建API路由
pub fn create_routes(state: AppState, metrics_endpoint: &str) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        .route(metrics_endpoint, get(prometheus_metrics))
        // 预约单API
        .route("/api/bookings", post(dispatch_booking))
        .route("/api/bookings/{id}", get(get_booking))
        .route("/api/bookings/{id}/respond", post(respond_booking))
        .route("/api/bookings/{id}/cancel", post(cancel_booking))
        .route("/api/bookings/{id}/expire", post(expire_booking))
        // Worker收件箱
        .route("/api/workers/{worker_id}/bookings", get(worker_inbox))
        .with_state(state)
}

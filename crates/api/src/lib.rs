//! # Arbiter API
//!
//! 预约派发与接单仲裁的REST API，基于Axum构建。
//!
//! ## 端点
//!
//! - `POST /api/bookings` - 派发预约单给一组候选Worker
//! - `GET /api/bookings/{id}` - 预约单详情（派发头与全部候选记录）
//! - `POST /api/bookings/{id}/respond` - Worker接单或拒单
//! - `POST /api/bookings/{id}/cancel` - 取消仍开放的预约单
//! - `POST /api/bookings/{id}/expire` - 手动触发过期检查
//! - `GET /api/workers/{worker_id}/bookings?status=pending` - Worker收件箱
//! - `GET /health` - 健康检查
//! - `GET /metrics` - Prometheus 指标（启用时）
//!
//! ## 响应格式
//!
//! 成功响应统一包装为 `{success, data, message, timestamp}`，
//! 错误响应为 `{error: {message, type, code, suggestions, timestamp}}`。
//! 抢单失败属于正常业务结果，以 200 返回 `outcome = "already_resolved"`。
//!
//! ```bash
//! curl -X POST http://localhost:8080/api/bookings/$ID/respond \
//!   -H "Content-Type: application/json" \
//!   -d '{"worker_id": "w-1", "decision": "accept"}'
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod validation;

use std::sync::Arc;
use std::time::Duration;

use arbiter_core::config::{ApiConfig, ObservabilityConfig};
use arbiter_dispatcher::AssignmentArbiter;
use axum::{extract::DefaultBodyLimit, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;

pub use error::{ApiError, ApiResult};
pub use routes::{create_routes, AppState};

/// 按配置组装完整的API应用
pub fn create_app(
    arbiter: Arc<AssignmentArbiter>,
    metrics_handle: Option<PrometheusHandle>,
    api: &ApiConfig,
    observability: &ObservabilityConfig,
) -> Router {
    let state = AppState {
        arbiter,
        metrics_handle,
    };
    let timeout = Duration::from_secs(api.request_timeout_seconds);

    let router = create_routes(state, &observability.metrics_endpoint)
        .layer(DefaultBodyLimit::max(api.max_request_size_mb * 1024 * 1024))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::trace_layer())
                .layer(axum::middleware::from_fn(middleware::request_logging))
                .layer(axum::middleware::from_fn_with_state(
                    timeout,
                    middleware::request_timeout,
                )),
        );

    if api.cors_enabled {
        router.layer(middleware::cors_layer(&api.cors_origins))
    } else {
        router
    }
}

/// 默认配置、无指标导出的应用，供测试与嵌入使用
pub fn create_simple_app(arbiter: Arc<AssignmentArbiter>) -> Router {
    create_app(
        arbiter,
        None,
        &ApiConfig::default(),
        &ObservabilityConfig::default(),
    )
}

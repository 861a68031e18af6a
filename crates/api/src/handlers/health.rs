use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::warn;

use crate::routes::AppState;

/// 健康检查：存储可用时返回 200，否则 503
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (status_code, status, store) = match state.arbiter.health_check().await {
        Ok(()) => (StatusCode::OK, "ok", "ok".to_string()),
        Err(e) => {
            warn!("健康检查失败: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", e.to_string())
        }
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "store": store,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "service": "booking-arbiter",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

use arbiter_core::ArbiterError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// 存储暂不可用时建议客户端等待的秒数
const RETRY_AFTER_SECONDS: &str = "1";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("仲裁服务错误: {0}")]
    Arbiter(#[from] ArbiterError),

    #[error("验证错误: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("验证错误: {0}")]
    ValidationError(#[from] validator::ValidationError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("未找到资源")]
    NotFound,

    #[error("请求处理超时")]
    Timeout,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, String, &'static str, Vec<String>) {
        match self {
            ApiError::Arbiter(ArbiterError::BookingNotFound { booking_id }) => (
                StatusCode::NOT_FOUND,
                format!("预约单 {} 不存在", booking_id),
                "BOOKING_NOT_FOUND",
                vec!["请检查预约单ID是否正确".to_string()],
            ),
            ApiError::Arbiter(ArbiterError::CandidateNotFound {
                booking_id,
                worker_id,
            }) => (
                StatusCode::NOT_FOUND,
                format!("Worker {} 不是预约单 {} 的候选", worker_id, booking_id),
                "CANDIDATE_NOT_FOUND",
                vec![
                    "只有收到派单的Worker才能答复".to_string(),
                    format!("使用 GET /api/bookings/{} 查看候选列表", booking_id),
                ],
            ),
            ApiError::Arbiter(ArbiterError::InvalidTransition {
                booking_id,
                current,
                ..
            }) => (
                StatusCode::CONFLICT,
                format!("预约单 {} 的候选记录当前为 {}，不能再答复", booking_id, current),
                "INVALID_TRANSITION",
                vec![
                    "候选记录只能从 PENDING 状态流转一次".to_string(),
                    "预约单可能已过期或已被取消".to_string(),
                ],
            ),
            ApiError::Arbiter(ArbiterError::BookingClosed { booking_id }) => (
                StatusCode::CONFLICT,
                format!("预约单 {} 已结束", booking_id),
                "BOOKING_CLOSED",
                vec!["只有仍开放的预约单可以取消".to_string()],
            ),
            ApiError::Arbiter(ArbiterError::StoreUnavailable(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "存储暂不可用".to_string(),
                "STORE_UNAVAILABLE",
                vec!["请稍后重试，该操作没有产生任何状态变更".to_string()],
            ),
            ApiError::Arbiter(ArbiterError::InvalidRequest(msg)) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数无效: {}", msg),
                "INVALID_REQUEST",
                vec!["请检查请求参数".to_string()],
            ),
            ApiError::Validation(errors) => {
                let details: Vec<String> = errors
                    .field_errors()
                    .iter()
                    .map(|(field, errors)| {
                        let messages: Vec<String> = errors
                            .iter()
                            .map(|e| match &e.message {
                                Some(message) => message.to_string(),
                                None => e.code.to_string(),
                            })
                            .collect();
                        format!("{}: {}", field, messages.join(", "))
                    })
                    .collect();

                (
                    StatusCode::BAD_REQUEST,
                    format!("请求参数验证失败: {}", details.join("; ")),
                    "VALIDATION_ERROR",
                    vec!["请检查请求参数是否符合要求".to_string()],
                )
            }
            ApiError::ValidationError(error) => (
                StatusCode::BAD_REQUEST,
                format!("参数验证失败: {}", error.code),
                "VALIDATION_ERROR",
                vec!["请检查请求参数格式".to_string()],
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数错误: {}", msg),
                "BAD_REQUEST",
                vec!["请检查请求格式和参数".to_string()],
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "请求的资源不存在".to_string(),
                "NOT_FOUND",
                vec!["请检查请求URL是否正确".to_string()],
            ),
            ApiError::Timeout => (
                StatusCode::REQUEST_TIMEOUT,
                "请求处理超时".to_string(),
                "REQUEST_TIMEOUT",
                vec!["请稍后重试".to_string()],
            ),
            ApiError::Arbiter(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR",
                vec![
                    "系统遇到内部错误，请稍后重试".to_string(),
                    "查看 GET /health 检查系统状态".to_string(),
                ],
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_type, suggestions) = self.parts();

        if status.is_server_error() {
            error!(error = %self, "请求处理失败");
        }

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type,
                "code": status.as_u16(),
                "suggestions": suggestions,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        let mut response = (status, body).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from_static(RETRY_AFTER_SECONDS),
            );
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

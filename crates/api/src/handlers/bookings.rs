use arbiter_core::{
    BookingDetails, BookingStatus, BookingTemplate, Decision, DispatchStatus, RespondOutcome,
};
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::ApiResult,
    response::{created, success},
    routes::AppState,
    validation::{validate_contact_number, validate_worker_id, validate_worker_ids},
};

/// 派发请求
#[derive(Debug, Deserialize, Validate)]
pub struct DispatchBookingRequest {
    #[validate(length(min = 1, max = 128))]
    pub customer_id: String,
    #[validate(length(min = 1, max = 512))]
    pub location: String,
    #[validate(custom(function = "validate_contact_number"))]
    pub contact_number: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub candidate_worker_ids: Vec<String>,
}

impl DispatchBookingRequest {
    fn into_parts(self) -> (BookingTemplate, Vec<String>) {
        let template = BookingTemplate {
            customer_id: self.customer_id,
            location: self.location,
            contact_number: self.contact_number,
            description: self.description,
        };
        (template, self.candidate_worker_ids)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DispatchBookingResponse {
    pub booking_id: String,
    pub status: DispatchStatus,
    pub candidate_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Worker答复请求
#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub worker_id: String,
    pub decision: Decision,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RespondResponse {
    pub booking_id: String,
    pub worker_id: String,
    pub outcome: String,
    /// 该Worker候选记录的最终状态
    pub status: BookingStatus,
    pub superseded_worker_ids: Vec<String>,
    pub accepted_worker_id: Option<String>,
}

impl RespondResponse {
    fn new(booking_id: String, worker_id: String, outcome: RespondOutcome) -> Self {
        let label = outcome.label().to_string();
        let status = outcome.final_status();
        let (superseded_worker_ids, accepted_worker_id) = match outcome {
            RespondOutcome::Accepted {
                superseded_worker_ids,
            } => (superseded_worker_ids, Some(worker_id.clone())),
            RespondOutcome::Rejected => (Vec::new(), None),
            RespondOutcome::AlreadyResolved {
                accepted_worker_id,
                ..
            } => (Vec::new(), accepted_worker_id),
        };

        Self {
            booking_id,
            worker_id,
            outcome: label,
            status,
            superseded_worker_ids,
            accepted_worker_id,
        }
    }
}

/// 预约单关闭（取消或过期）结果
#[derive(Debug, Serialize, Deserialize)]
pub struct CloseBookingResponse {
    pub booking_id: String,
    pub status: DispatchStatus,
    /// 被本次操作关闭的待处理候选
    pub closed_worker_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookingDetailsResponse {
    #[serde(flatten)]
    pub details: BookingDetails,
    pub accepted_count: usize,
    pub pending_count: usize,
}

/// 派发预约单
pub async fn dispatch_booking(
    State(state): State<AppState>,
    Json(request): Json<DispatchBookingRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    request.validate()?;
    validate_worker_ids(&request.candidate_worker_ids)?;

    let (template, candidates) = request.into_parts();
    let dispatch = state.arbiter.dispatch(template, candidates).await?;

    Ok(created(DispatchBookingResponse {
        booking_id: dispatch.booking_id,
        status: dispatch.status,
        candidate_count: dispatch.candidate_count,
        created_at: dispatch.created_at,
    }))
}

/// 获取预约单详情
pub async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let details = state.arbiter.get_booking(&booking_id).await?;
    Ok(success(BookingDetailsResponse {
        accepted_count: details.accepted_count(),
        pending_count: details.pending_count(),
        details,
    }))
}

/// Worker接单或拒单
///
/// 抢单失败返回 200 与 `already_resolved`，调用方据此展示“已被他人接单”。
pub async fn respond_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
    Json(request): Json<RespondRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    validate_worker_id(&request.worker_id)?;

    let outcome = state
        .arbiter
        .respond(&booking_id, &request.worker_id, request.decision)
        .await?;

    Ok(success(RespondResponse::new(
        booking_id,
        request.worker_id,
        outcome,
    )))
}

/// 取消仍开放的预约单
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let closed = state.arbiter.cancel(&booking_id, Utc::now()).await?;
    Ok(success(CloseBookingResponse {
        booking_id: closed.booking_id,
        status: DispatchStatus::Cancelled,
        closed_worker_ids: closed.worker_ids,
    }))
}

/// 手动触发单个预约单的过期检查
///
/// 未到期或已结束的预约单不会变化，返回其当前状态。
pub async fn expire_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let report = state.arbiter.expire(&booking_id, Utc::now()).await?;

    let response = match report.expired.into_iter().next() {
        Some(closed) => CloseBookingResponse {
            booking_id: closed.booking_id,
            status: DispatchStatus::Expired,
            closed_worker_ids: closed.worker_ids,
        },
        None => {
            let details = state.arbiter.get_booking(&booking_id).await?;
            CloseBookingResponse {
                booking_id,
                status: details.dispatch.status,
                closed_worker_ids: Vec::new(),
            }
        }
    };

    Ok(success(response))
}

use arbiter_core::BookingStatus;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult},
    response::success,
    routes::AppState,
    validation::validate_worker_id,
};

/// Worker收件箱查询参数
#[derive(Debug, Deserialize)]
pub struct InboxQueryParams {
    pub status: Option<String>,
}

/// 获取Worker的候选记录，可按状态名或旧版整数状态码过滤
pub async fn worker_inbox(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
    Query(params): Query<InboxQueryParams>,
) -> ApiResult<impl axum::response::IntoResponse> {
    validate_worker_id(&worker_id)?;

    let status = params
        .status
        .as_deref()
        .map(str::parse::<BookingStatus>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let bookings = state.arbiter.worker_inbox(&worker_id, status).await?;
    Ok(success(bookings))
}

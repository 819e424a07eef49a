//! Slot listing handler

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;

use super::dto::{DaySlotsResponse, SlotDto, SlotsQuery};
use crate::application::AvailabilityChecker;
use crate::interfaces::http::common::{api_error, ApiResponse, ApiResult};

#[derive(Clone)]
pub struct SlotsState {
    pub availability: Arc<AvailabilityChecker>,
}

#[utoipa::path(
    get,
    path = "/api/v1/resources/{resource_id}/slots",
    tag = "Slots",
    params(
        ("resource_id" = String, Path, description = "Resource ID"),
        SlotsQuery
    ),
    responses(
        (status = 200, description = "Generated slots with availability", body = DaySlotsResponse),
        (status = 404, description = "Resource not found")
    )
)]
pub async fn list_slots(
    State(state): State<SlotsState>,
    Path(resource_id): Path<String>,
    Query(query): Query<SlotsQuery>,
) -> ApiResult<DaySlotsResponse> {
    let views = state
        .availability
        .list_slots(&resource_id, query.date, Utc::now())
        .await
        .map_err(api_error)?;

    Ok(Json(ApiResponse::success(DaySlotsResponse {
        resource_id,
        date: query.date,
        slots: views.into_iter().map(SlotDto::from).collect(),
    })))
}

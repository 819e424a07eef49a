//! Reservation handlers

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;

use super::dto::{parse_hhmm, CreateReservationRequest, OrderResponse, ReservationDto};
use crate::application::{BookingService, CreateReservation, OrderCoordinator};
use crate::domain::DomainError;
use crate::interfaces::http::common::{api_error, ApiError, ApiResponse, ApiResult, ValidatedJson};

#[derive(Clone)]
pub struct ReservationsState {
    pub bookings: Arc<BookingService>,
    pub orders: Arc<OrderCoordinator>,
    /// Public provider key id returned with new orders
    pub key_id: Arc<str>,
}

#[utoipa::path(
    post,
    path = "/api/v1/reservations",
    tag = "Reservations",
    request_body = CreateReservationRequest,
    responses(
        (status = 201, description = "Reservation created in PENDING", body = ReservationDto),
        (status = 400, description = "Not a bookable slot"),
        (status = 404, description = "Resource not found"),
        (status = 409, description = "Slot already booked"),
        (status = 422, description = "Validation error")
    )
)]
pub async fn create_reservation(
    State(state): State<ReservationsState>,
    ValidatedJson(body): ValidatedJson<CreateReservationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ReservationDto>>), ApiError<ReservationDto>> {
    let (Some(start_time), Some(end_time)) =
        (parse_hhmm(&body.start_time), parse_hhmm(&body.end_time))
    else {
        return Err(api_error(DomainError::Validation(
            "times must be HH:MM".into(),
        )));
    };

    let request = CreateReservation {
        resource_id: body.resource_id,
        date: body.date,
        start_time,
        end_time,
        user_id: body.user_id,
    };
    let reservation = state
        .bookings
        .create_reservation(request, Utc::now())
        .await
        .map_err(api_error)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(reservation.into())),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/reservations/{id}",
    tag = "Reservations",
    params(("id" = String, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation", body = ReservationDto),
        (status = 404, description = "Reservation not found")
    )
)]
pub async fn get_reservation(
    State(state): State<ReservationsState>,
    Path(id): Path<String>,
) -> ApiResult<ReservationDto> {
    let reservation = state.bookings.get(&id).await.map_err(api_error)?;
    Ok(Json(ApiResponse::success(reservation.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/reservations/{id}/cancel",
    tag = "Reservations",
    params(("id" = String, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Reservation cancelled", body = ReservationDto),
        (status = 404, description = "Reservation not found"),
        (status = 410, description = "Reservation already settled")
    )
)]
pub async fn cancel_reservation(
    State(state): State<ReservationsState>,
    Path(id): Path<String>,
) -> ApiResult<ReservationDto> {
    let reservation = state
        .bookings
        .cancel_reservation(&id, Utc::now())
        .await
        .map_err(api_error)?;
    Ok(Json(ApiResponse::success(reservation.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/reservations/{id}/order",
    tag = "Reservations",
    params(("id" = String, Path, description = "Reservation ID")),
    responses(
        (status = 200, description = "Provider order ready for checkout", body = OrderResponse),
        (status = 404, description = "Reservation not found"),
        (status = 409, description = "Another payment holds the slot, or already confirmed"),
        (status = 410, description = "Reservation expired or no longer payable"),
        (status = 502, description = "Payment provider unavailable")
    )
)]
pub async fn create_order(
    State(state): State<ReservationsState>,
    Path(id): Path<String>,
) -> ApiResult<OrderResponse> {
    let outcome = state
        .orders
        .create_order(&id, Utc::now())
        .await
        .map_err(api_error)?;
    Ok(Json(ApiResponse::success(OrderResponse::new(
        outcome,
        &state.key_id,
    ))))
}

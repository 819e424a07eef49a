//! Payment handlers

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use tracing::{error, warn};

use super::dto::{VerifyPaymentRequest, VerifyPaymentResponse, WebhookAck};
use crate::application::ports::{ProviderOrder, ProviderPayment};
use crate::application::{OrderCoordinator, WebhookProcessor};
use crate::domain::DomainError;
use crate::interfaces::http::common::{api_error, ApiError, ApiResponse, ApiResult, ValidatedJson};

/// Header carrying the hex HMAC-SHA256 of the raw webhook body
pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

#[derive(Clone)]
pub struct PaymentsState {
    pub orders: Arc<OrderCoordinator>,
    pub webhooks: Arc<WebhookProcessor>,
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    tag = "Payments",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Signature checked", body = VerifyPaymentResponse),
        (status = 422, description = "Validation error")
    )
)]
pub async fn verify_payment(
    State(state): State<PaymentsState>,
    ValidatedJson(body): ValidatedJson<VerifyPaymentRequest>,
) -> ApiResult<VerifyPaymentResponse> {
    let valid = state
        .orders
        .verify_payment_signature(&body.order_id, &body.payment_id, &body.signature);
    if !valid {
        warn!(order_id = %body.order_id, "Checkout signature did not verify");
    }
    Ok(Json(ApiResponse::success(VerifyPaymentResponse { valid })))
}

/// Provider webhook endpoint.
///
/// The body is taken raw because the signature covers the exact bytes.
/// A bad signature is 401 and a malformed body 400. Storage failures are
/// 500 so the provider redelivers; everything else, including unknown
/// orders, is acknowledged with 200.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    tag = "Payments",
    request_body(content = String, content_type = "application/json"),
    params(("X-Razorpay-Signature" = String, Header, description = "Hex HMAC-SHA256 of the body")),
    responses(
        (status = 200, description = "Delivery acknowledged", body = WebhookAck),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Missing or invalid signature"),
        (status = 500, description = "Temporary failure, provider should retry")
    )
)]
pub async fn payment_webhook(
    State(state): State<PaymentsState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookAck>>, ApiError<WebhookAck>> {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        warn!("Webhook rejected: missing signature header");
        return Err(api_error(DomainError::InvalidSignature));
    };

    match state
        .webhooks
        .handle_webhook(&body, signature, Utc::now())
        .await
    {
        Ok(outcome) => Ok(Json(ApiResponse::success(WebhookAck::from(&outcome)))),
        Err(DomainError::NotFound { value, .. }) => {
            error!(order_id = %value, "Webhook for unknown order acknowledged");
            Ok(Json(ApiResponse::success(WebhookAck {
                outcome: "unknown_order".to_string(),
                reservation_id: None,
            })))
        }
        Err(e @ (DomainError::InvalidSignature | DomainError::Validation(_))) => Err(api_error(e)),
        Err(e) => {
            error!(error = %e, "Webhook processing failed, provider will redeliver");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Temporary failure")),
            ))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/orders/{order_id}",
    tag = "Payments",
    params(("order_id" = String, Path, description = "Provider order ID")),
    responses(
        (status = 200, description = "Provider order", body = ProviderOrder),
        (status = 404, description = "Unknown order"),
        (status = 502, description = "Payment provider unavailable")
    )
)]
pub async fn get_order(
    State(state): State<PaymentsState>,
    Path(order_id): Path<String>,
) -> ApiResult<ProviderOrder> {
    let order = state.orders.fetch_order(&order_id).await.map_err(api_error)?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/{payment_id}",
    tag = "Payments",
    params(("payment_id" = String, Path, description = "Provider payment ID")),
    responses(
        (status = 200, description = "Provider payment", body = ProviderPayment),
        (status = 404, description = "Unknown payment"),
        (status = 502, description = "Payment provider unavailable")
    )
)]
pub async fn get_payment(
    State(state): State<PaymentsState>,
    Path(payment_id): Path<String>,
) -> ApiResult<ProviderPayment> {
    let payment = state
        .orders
        .fetch_payment(&payment_id)
        .await
        .map_err(api_error)?;
    Ok(Json(ApiResponse::success(payment)))
}

//! API router with Swagger UI

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::FromRef,
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sea_orm::DatabaseConnection;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::common::ApiResponse;
use super::modules::{health, metrics, payments, request_id, reservations, slots};
use crate::application::ports::{ProviderOrder, ProviderPayment};
use crate::application::{
    AvailabilityChecker, BookingService, OrderCoordinator, SlotAvailability, WebhookProcessor,
};

/// Everything the booking routes need. Each handler extracts its own
/// narrower state through `FromRef`.
#[derive(Clone)]
pub struct ApiState {
    pub db: DatabaseConnection,
    pub availability: Arc<AvailabilityChecker>,
    pub bookings: Arc<BookingService>,
    pub orders: Arc<OrderCoordinator>,
    pub webhooks: Arc<WebhookProcessor>,
    pub provider_name: &'static str,
    pub key_id: Arc<str>,
    pub started_at: Arc<Instant>,
}

impl FromRef<ApiState> for health::HealthState {
    fn from_ref(s: &ApiState) -> Self {
        health::HealthState {
            db: s.db.clone(),
            provider: s.provider_name,
            started_at: Arc::clone(&s.started_at),
        }
    }
}

impl FromRef<ApiState> for slots::SlotsState {
    fn from_ref(s: &ApiState) -> Self {
        slots::SlotsState {
            availability: Arc::clone(&s.availability),
        }
    }
}

impl FromRef<ApiState> for reservations::ReservationsState {
    fn from_ref(s: &ApiState) -> Self {
        reservations::ReservationsState {
            bookings: Arc::clone(&s.bookings),
            orders: Arc::clone(&s.orders),
            key_id: Arc::clone(&s.key_id),
        }
    }
}

impl FromRef<ApiState> for payments::PaymentsState {
    fn from_ref(s: &ApiState) -> Self {
        payments::PaymentsState {
            orders: Arc::clone(&s.orders),
            webhooks: Arc::clone(&s.webhooks),
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        slots::list_slots,
        reservations::create_reservation,
        reservations::get_reservation,
        reservations::cancel_reservation,
        reservations::create_order,
        payments::verify_payment,
        payments::payment_webhook,
        payments::get_order,
        payments::get_payment,
    ),
    components(
        schemas(
            ApiResponse<String>,
            health::HealthResponse,
            health::ComponentHealth,
            SlotAvailability,
            slots::SlotDto,
            slots::DaySlotsResponse,
            reservations::CreateReservationRequest,
            reservations::ReservationDto,
            reservations::OrderResponse,
            payments::VerifyPaymentRequest,
            payments::VerifyPaymentResponse,
            payments::WebhookAck,
            ProviderOrder,
            ProviderPayment,
        )
    ),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Slots", description = "Derived slots and their availability"),
        (name = "Reservations", description = "Reservation lifecycle and order creation"),
        (name = "Payments", description = "Payment verification and provider webhooks"),
    ),
    info(
        title = "Courtbook API",
        version = "0.1.0",
        description = "Slot booking with provider-confirmed payments"
    )
)]
pub struct ApiDoc;

/// Build the HTTP router. `/metrics` is only mounted when a Prometheus
/// handle is supplied.
pub fn create_api_router(state: ApiState, prometheus: Option<PrometheusHandle>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let booking_routes = Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/v1/resources/{resource_id}/slots",
            get(slots::list_slots),
        )
        .route(
            "/api/v1/reservations",
            post(reservations::create_reservation),
        )
        .route("/api/v1/reservations/{id}", get(reservations::get_reservation))
        .route(
            "/api/v1/reservations/{id}/cancel",
            post(reservations::cancel_reservation),
        )
        .route(
            "/api/v1/reservations/{id}/order",
            post(reservations::create_order),
        )
        .route("/api/v1/payments/verify", post(payments::verify_payment))
        .route("/api/v1/payments/webhook", post(payments::payment_webhook))
        .route("/api/v1/payments/orders/{order_id}", get(payments::get_order))
        .route("/api/v1/payments/{payment_id}", get(payments::get_payment))
        .with_state(state);

    let mut router = Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(booking_routes);

    if let Some(handle) = prometheus {
        router = router.merge(
            Router::new()
                .route("/metrics", get(metrics::prometheus_metrics))
                .with_state(metrics::MetricsState { handle }),
        );
    }

    router
        .layer(middleware::from_fn(metrics::http_metrics_middleware))
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

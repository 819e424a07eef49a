//! Reservation DTOs

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::application::OrderOutcome;
use crate::domain::Reservation;

fn validate_hhmm(value: &str) -> Result<(), ValidationError> {
    parse_hhmm(value)
        .map(|_| ())
        .ok_or_else(|| ValidationError::new("time_format").with_message("expected HH:MM".into()))
}

pub(crate) fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateReservationRequest {
    #[validate(length(min = 1, max = 64))]
    pub resource_id: String,
    /// YYYY-MM-DD
    #[schema(value_type = String, format = Date)]
    pub date: NaiveDate,
    /// HH:MM
    #[validate(custom(function = "validate_hhmm"))]
    pub start_time: String,
    /// HH:MM
    #[validate(custom(function = "validate_hhmm"))]
    pub end_time: String,
    #[validate(length(min = 1, max = 64))]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReservationDto {
    pub id: String,
    pub reference_code: String,
    pub resource_id: String,
    #[schema(value_type = String, format = Date)]
    pub booking_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub user_id: Option<String>,
    pub total_amount: i64,
    pub online_amount: i64,
    pub venue_due_amount: i64,
    pub status: String,
    pub payment_status: String,
    pub provider_order_id: Option<String>,
    pub provider_payment_id: Option<String>,
    pub payment_method: Option<String>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Reservation> for ReservationDto {
    fn from(r: Reservation) -> Self {
        Self {
            start_time: r.start_time.format("%H:%M").to_string(),
            end_time: r.end_time.format("%H:%M").to_string(),
            status: r.status.as_str().to_string(),
            payment_status: r.payment_status.as_str().to_string(),
            total_amount: r.price.total,
            online_amount: r.price.online,
            venue_due_amount: r.price.venue_due,
            id: r.id,
            reference_code: r.reference_code,
            resource_id: r.resource_id,
            booking_date: r.booking_date,
            user_id: r.user_id,
            provider_order_id: r.provider_order_id,
            provider_payment_id: r.provider_payment_id,
            payment_method: r.payment_method,
            lock_expires_at: r.lock_expires_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Checkout parameters for the client-side payment widget
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub reservation_id: String,
    pub order_id: String,
    /// Online-due amount in minor units
    pub amount: i64,
    pub currency: String,
    /// Public provider key id for the checkout widget
    pub key_id: String,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub reused: bool,
}

impl OrderResponse {
    pub fn new(outcome: OrderOutcome, key_id: &str) -> Self {
        Self {
            reservation_id: outcome.reservation_id,
            order_id: outcome.order_id,
            amount: outcome.amount,
            currency: outcome.currency,
            key_id: key_id.to_string(),
            lock_expires_at: outcome.lock_expires_at,
            reused: outcome.reused,
        }
    }
}

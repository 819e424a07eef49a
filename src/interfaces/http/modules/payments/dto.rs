//! Payment DTOs

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::application::WebhookOutcome;

/// Checkout callback fields forwarded by the client
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, max = 64))]
    pub order_id: String,
    #[validate(length(min = 1, max = 64))]
    pub payment_id: String,
    #[validate(length(min = 1, max = 128))]
    pub signature: String,
}

/// Signature check result. A valid signature does not confirm the booking;
/// only the provider webhook does.
#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyPaymentResponse {
    pub valid: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    /// `confirmed`, `cancelled`, `duplicate`, `orphaned`, `stale`,
    /// `ignored` or `unknown_order`
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<String>,
}

impl From<&WebhookOutcome> for WebhookAck {
    fn from(outcome: &WebhookOutcome) -> Self {
        let reservation_id = match outcome {
            WebhookOutcome::Confirmed { reservation_id, .. }
            | WebhookOutcome::Cancelled { reservation_id }
            | WebhookOutcome::Duplicate { reservation_id }
            | WebhookOutcome::Orphaned { reservation_id }
            | WebhookOutcome::Stale { reservation_id } => Some(reservation_id.clone()),
            WebhookOutcome::Ignored { .. } => None,
        };
        Self {
            outcome: outcome.label().to_string(),
            reservation_id,
        }
    }
}

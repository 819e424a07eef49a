//! Booking use cases
//!
//! - `AvailabilityChecker` classifies derived slots against stored reservations
//! - `BookingService` creates, cancels and anonymizes reservations
//! - `OrderCoordinator` attaches payment-provider orders to reservations
//! - `WebhookProcessor` applies provider callbacks (sole confirmer)
//! - `ExpirySweeper` reclaims abandoned reservations on a timer

pub mod availability;
pub mod booking_service;
pub mod expiry_sweeper;
pub mod order_coordinator;
pub mod webhook_processor;

use chrono::Duration;

pub use availability::{AvailabilityChecker, SlotAvailability, SlotView};
pub use booking_service::{BookingService, CreateReservation};
pub use expiry_sweeper::{ExpirySweeper, SweepReport};
pub use order_coordinator::{OrderCoordinator, OrderOutcome};
pub use webhook_processor::{WebhookOutcome, WebhookProcessor};

/// Time limits and defaults shared by the booking use cases.
#[derive(Debug, Clone)]
pub struct BookingPolicy {
    /// Maximum age of a PENDING reservation that may still be paid
    pub pending_grace: Duration,
    /// How long an AWAITING_CONFIRMATION reservation holds its slot
    pub payment_lock: Duration,
    pub max_slots_per_day: usize,
    pub reference_prefix: String,
    /// ISO currency code sent with provider orders
    pub currency: String,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            pending_grace: Duration::minutes(5),
            payment_lock: Duration::minutes(10),
            max_slots_per_day: crate::domain::slot::MAX_SLOTS_PER_DAY,
            reference_prefix: "BK".to_string(),
            currency: "INR".to_string(),
        }
    }
}

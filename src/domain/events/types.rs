//! Booking events
//!
//! Facts emitted by the booking core and handed to downstream consumers
//! (notifications, invoicing) through the notification queue.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::reservation::Reservation;

/// Event types published by the booking core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    ReservationConfirmed(ReservationConfirmedEvent),
    ReservationExpired(ReservationExpiredEvent),
    ReservationCancelled(ReservationCancelledEvent),
    PaymentOrphaned(PaymentOrphanedEvent),
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::ReservationConfirmed(_) => "reservation_confirmed",
            Event::ReservationExpired(_) => "reservation_expired",
            Event::ReservationCancelled(_) => "reservation_cancelled",
            Event::PaymentOrphaned(_) => "payment_orphaned",
        }
    }

    pub fn reservation_id(&self) -> &str {
        match self {
            Event::ReservationConfirmed(e) => &e.reservation_id,
            Event::ReservationExpired(e) => &e.reservation_id,
            Event::ReservationCancelled(e) => &e.reservation_id,
            Event::PaymentOrphaned(e) => &e.reservation_id,
        }
    }
}

/// Handed to the notification collaborator once a payment is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationConfirmedEvent {
    pub reservation_id: String,
    pub reference_code: String,
    pub user_id: Option<String>,
    pub resource_id: String,
    pub booking_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// Minor currency units
    pub total_amount: i64,
    pub online_amount: i64,
    pub venue_due_amount: i64,
    pub provider_payment_id: Option<String>,
    pub payment_initiated_at: Option<DateTime<Utc>>,
    pub confirmed_at: DateTime<Utc>,
}

impl From<&Reservation> for ReservationConfirmedEvent {
    fn from(r: &Reservation) -> Self {
        Self {
            reservation_id: r.id.clone(),
            reference_code: r.reference_code.clone(),
            user_id: r.user_id.clone(),
            resource_id: r.resource_id.clone(),
            booking_date: r.booking_date,
            start_time: r.start_time,
            end_time: r.end_time,
            total_amount: r.price.total,
            online_amount: r.price.online,
            venue_due_amount: r.price.venue_due,
            provider_payment_id: r.provider_payment_id.clone(),
            payment_initiated_at: r.payment_initiated_at,
            confirmed_at: r.payment_completed_at.unwrap_or(r.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationExpiredEvent {
    pub reservation_id: String,
    /// `stale_pending`, `payment_timeout`, `grace_elapsed` or `sibling_confirmed`
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationCancelledEvent {
    pub reservation_id: String,
    /// `payment_failed` or `owner_cancelled`
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Provider captured money for a reservation that is no longer payable.
/// Needs manual reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOrphanedEvent {
    pub reservation_id: String,
    pub provider_order_id: String,
    pub provider_payment_id: String,
    pub reservation_status: String,
    pub timestamp: DateTime<Utc>,
}

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let msg = EventMessage::new(Event::ReservationExpired(ReservationExpiredEvent {
            reservation_id: "r1".into(),
            reason: "payment_timeout".into(),
            timestamp: Utc::now(),
        }));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "ReservationExpired");
        assert_eq!(json["data"]["reservation_id"], "r1");
        assert_eq!(msg.event.event_type(), "reservation_expired");
        assert_eq!(msg.event.reservation_id(), "r1");
    }
}

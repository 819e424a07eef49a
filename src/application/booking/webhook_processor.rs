//! Payment-provider webhook handling
//!
//! The webhook is the only path to CONFIRMED. Deliveries may repeat and
//! arrive out of order; every branch is idempotent.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::application::notifications::NotificationQueue;
use crate::domain::events::{
    Event, PaymentOrphanedEvent, ReservationCancelledEvent, ReservationConfirmedEvent,
    ReservationExpiredEvent,
};
use crate::domain::reservation::{
    ConfirmOutcome, Reservation, ReservationChange, ReservationStatus, Transition,
};
use crate::domain::{DomainError, DomainResult, RepositoryProvider};
use crate::infrastructure::crypto::verify_webhook_signature;
use crate::shared::retry::{retry_with_backoff, RetryConfig};

pub const EVENT_PAYMENT_CAPTURED: &str = "payment.captured";
pub const EVENT_ORDER_PAID: &str = "order.paid";
pub const EVENT_PAYMENT_FAILED: &str = "payment.failed";

// ── Wire format ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    payment: Option<Wrapped<PaymentEntity>>,
    #[serde(default)]
    order: Option<Wrapped<OrderEntity>>,
}

#[derive(Debug, Deserialize)]
struct Wrapped<T> {
    entity: T,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    id: String,
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OrderEntity {
    id: String,
}

/// The fields the booking core acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    pub event: String,
    pub order_id: String,
    pub payment_id: String,
    pub status: Option<String>,
    pub method: Option<String>,
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Success,
    Failure,
    Other,
}

fn classify(event: &str) -> EventKind {
    match event {
        EVENT_PAYMENT_CAPTURED | EVENT_ORDER_PAID => EventKind::Success,
        EVENT_PAYMENT_FAILED => EventKind::Failure,
        _ => EventKind::Other,
    }
}

fn parse_event(raw: &[u8]) -> DomainResult<(String, Option<PaymentEvent>)> {
    let envelope: WebhookEnvelope = serde_json::from_slice(raw)
        .map_err(|e| DomainError::Validation(format!("malformed webhook payload: {}", e)))?;

    let Some(payment) = envelope.payload.payment.map(|w| w.entity) else {
        return Ok((envelope.event, None));
    };
    let order_id = payment
        .order_id
        .or_else(|| envelope.payload.order.map(|w| w.entity.id))
        .ok_or_else(|| DomainError::Validation("webhook payment has no order id".into()))?;

    let event = PaymentEvent {
        event: envelope.event.clone(),
        order_id,
        payment_id: payment.id,
        status: payment.status,
        method: payment.method,
        amount: payment.amount,
    };
    Ok((envelope.event, Some(event)))
}

// ── Outcome ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Confirmed {
        reservation_id: String,
        expired_siblings: Vec<String>,
    },
    Cancelled { reservation_id: String },
    /// Repeat delivery of an already-applied event
    Duplicate { reservation_id: String },
    /// Money captured for a reservation that can no longer be confirmed
    Orphaned { reservation_id: String },
    /// Failure reported for a reservation already settled otherwise
    Stale { reservation_id: String },
    /// Event type the booking core does not act on
    Ignored { event: String },
}

impl WebhookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Confirmed { .. } => "confirmed",
            Self::Cancelled { .. } => "cancelled",
            Self::Duplicate { .. } => "duplicate",
            Self::Orphaned { .. } => "orphaned",
            Self::Stale { .. } => "stale",
            Self::Ignored { .. } => "ignored",
        }
    }
}

fn record(outcome: &str) {
    metrics::counter!("booking_webhooks_total", "outcome" => outcome.to_string()).increment(1);
}

// ── Processor ──────────────────────────────────────────────────

pub struct WebhookProcessor {
    repos: Arc<dyn RepositoryProvider>,
    queue: NotificationQueue,
    webhook_secret: String,
    retry: RetryConfig,
}

impl WebhookProcessor {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        queue: NotificationQueue,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            repos,
            queue,
            webhook_secret: webhook_secret.into(),
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay: std::time::Duration::from_millis(20),
                backoff_multiplier: 2.0,
                max_delay: std::time::Duration::from_millis(200),
            },
        }
    }

    /// Verify, parse and apply one webhook delivery.
    pub async fn handle_webhook(
        &self,
        raw_payload: &[u8],
        signature: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<WebhookOutcome> {
        if !verify_webhook_signature(&self.webhook_secret, raw_payload, signature) {
            record("invalid_signature");
            error!(
                body_len = raw_payload.len(),
                "🚨 Webhook signature mismatch, possible forged request"
            );
            return Err(DomainError::InvalidSignature);
        }

        let (event_name, payment) = match parse_event(raw_payload) {
            Ok(parsed) => parsed,
            Err(e) => {
                record("malformed");
                return Err(e);
            }
        };

        let kind = classify(&event_name);
        let payment = match (kind, payment) {
            (EventKind::Other, _) | (_, None) => {
                info!(event = %event_name, "Ignoring webhook event");
                record("ignored");
                return Ok(WebhookOutcome::Ignored { event: event_name });
            }
            (_, Some(p)) => p,
        };

        let reservation = match self
            .repos
            .reservations()
            .find_by_order_id(&payment.order_id)
            .await?
        {
            Some(r) => r,
            None => {
                record("unknown_order");
                error!(
                    order_id = %payment.order_id,
                    payment_id = %payment.payment_id,
                    event = %event_name,
                    "Webhook for unknown order, needs reconciliation"
                );
                return Err(DomainError::NotFound {
                    entity: "Reservation",
                    field: "provider_order_id",
                    value: payment.order_id,
                });
            }
        };

        let outcome = match kind {
            EventKind::Success => self.apply_success(reservation, &payment, now).await?,
            EventKind::Failure => self.apply_failure(reservation, &payment, now).await?,
            EventKind::Other => WebhookOutcome::Ignored { event: event_name },
        };
        record(outcome.label());
        Ok(outcome)
    }

    async fn apply_success(
        &self,
        reservation: Reservation,
        payment: &PaymentEvent,
        now: DateTime<Utc>,
    ) -> DomainResult<WebhookOutcome> {
        if reservation.status == ReservationStatus::Pending {
            warn!(
                reservation_id = %reservation.id,
                order_id = %payment.order_id,
                "Capture for reservation not awaiting confirmation, confirming anyway"
            );
        }

        let repo = self.repos.reservations();
        let result = retry_with_backoff(
            self.retry.clone(),
            || {
                repo.confirm_and_expire_siblings(
                    &reservation.id,
                    &payment.payment_id,
                    payment.method.clone(),
                    now,
                )
            },
            |e| matches!(e, DomainError::Conflict(_)),
            "confirm_payment",
        )
        .await;

        match result {
            Ok(ConfirmOutcome::Confirmed {
                reservation: confirmed,
                expired_siblings,
            }) => {
                info!(
                    reservation_id = %confirmed.id,
                    order_id = %payment.order_id,
                    payment_id = %payment.payment_id,
                    from = %reservation.status,
                    to = %confirmed.status,
                    expired_siblings = expired_siblings.len(),
                    "✅ Reservation confirmed"
                );
                self.queue.enqueue(Event::ReservationConfirmed(
                    ReservationConfirmedEvent::from(&confirmed),
                ));
                for sibling in &expired_siblings {
                    self.queue
                        .enqueue(Event::ReservationExpired(ReservationExpiredEvent {
                            reservation_id: sibling.clone(),
                            reason: "sibling_confirmed".into(),
                            timestamp: now,
                        }));
                }
                if !expired_siblings.is_empty() {
                    metrics::counter!("booking_reservations_expired_total", "sweep" => "sibling")
                        .increment(expired_siblings.len() as u64);
                }
                Ok(WebhookOutcome::Confirmed {
                    reservation_id: confirmed.id,
                    expired_siblings,
                })
            }
            Ok(ConfirmOutcome::AlreadyConfirmed(existing)) => {
                info!(
                    reservation_id = %existing.id,
                    payment_id = %payment.payment_id,
                    "Duplicate capture delivery, already confirmed"
                );
                Ok(WebhookOutcome::Duplicate {
                    reservation_id: existing.id,
                })
            }
            Err(DomainError::NoLongerValid { status, .. }) => {
                Ok(self.orphaned(&reservation, payment, &status, now))
            }
            Err(DomainError::SlotUnavailable(_)) => {
                Ok(self.orphaned(&reservation, payment, "SLOT_TAKEN", now))
            }
            Err(e) => Err(e),
        }
    }

    fn orphaned(
        &self,
        reservation: &Reservation,
        payment: &PaymentEvent,
        status: &str,
        now: DateTime<Utc>,
    ) -> WebhookOutcome {
        metrics::counter!("booking_orphaned_payments_total").increment(1);
        error!(
            reservation_id = %reservation.id,
            order_id = %payment.order_id,
            payment_id = %payment.payment_id,
            amount = ?payment.amount,
            reservation_status = status,
            "💸 Orphaned payment: captured for a reservation that cannot be confirmed"
        );
        self.queue
            .enqueue(Event::PaymentOrphaned(PaymentOrphanedEvent {
                reservation_id: reservation.id.clone(),
                provider_order_id: payment.order_id.clone(),
                provider_payment_id: payment.payment_id.clone(),
                reservation_status: status.to_string(),
                timestamp: now,
            }));
        WebhookOutcome::Orphaned {
            reservation_id: reservation.id.clone(),
        }
    }

    async fn apply_failure(
        &self,
        reservation: Reservation,
        payment: &PaymentEvent,
        now: DateTime<Utc>,
    ) -> DomainResult<WebhookOutcome> {
        let result = self
            .repos
            .reservations()
            .apply_change(&reservation.id, ReservationChange::FailPayment, now)
            .await;

        match result {
            Ok((cancelled, Transition::Applied)) => {
                info!(
                    reservation_id = %cancelled.id,
                    order_id = %payment.order_id,
                    from = %reservation.status,
                    to = %cancelled.status,
                    "Payment failed, reservation cancelled"
                );
                self.queue
                    .enqueue(Event::ReservationCancelled(ReservationCancelledEvent {
                        reservation_id: cancelled.id.clone(),
                        reason: "payment_failed".into(),
                        timestamp: now,
                    }));
                Ok(WebhookOutcome::Cancelled {
                    reservation_id: cancelled.id,
                })
            }
            Ok((unchanged, Transition::Unchanged)) => Ok(WebhookOutcome::Duplicate {
                reservation_id: unchanged.id,
            }),
            Err(DomainError::AlreadyConfirmed(id)) => {
                warn!(
                    reservation_id = %id,
                    payment_id = %payment.payment_id,
                    "Failure event for a confirmed reservation, ignoring"
                );
                Ok(WebhookOutcome::Stale { reservation_id: id })
            }
            Err(DomainError::NoLongerValid { id, status }) => {
                info!(
                    reservation_id = %id,
                    %status,
                    "Failure event for a settled reservation, ignoring"
                );
                Ok(WebhookOutcome::Stale { reservation_id: id })
            }
            Err(e) => Err(e),
        }
    }
}

//! Payment-order creation for reservations
//!
//! The provider call happens outside any database transaction. Conflicts
//! are scanned before the call and rechecked inside the claim transaction
//! afterwards, so two concurrent orders for one slot cannot both succeed.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::BookingPolicy;
use crate::application::notifications::NotificationQueue;
use crate::application::ports::{CreateOrderRequest, PaymentProvider, ProviderOrder, ProviderPayment};
use crate::domain::events::{Event, ReservationExpiredEvent};
use crate::domain::reservation::{
    OrderPrecheck, Reservation, ReservationChange, ReservationStatus,
};
use crate::domain::{DomainError, DomainResult, RepositoryProvider};
use crate::infrastructure::crypto;

/// What the client needs to open the provider's checkout.
#[derive(Debug, Clone, Serialize)]
pub struct OrderOutcome {
    pub reservation_id: String,
    pub order_id: String,
    /// Online-due amount in minor units
    pub amount: i64,
    pub currency: String,
    pub lock_expires_at: Option<DateTime<Utc>>,
    /// An existing in-flight order was returned instead of a new one
    pub reused: bool,
}

impl OrderOutcome {
    fn new(reservation: &Reservation, order_id: String, currency: &str, reused: bool) -> Self {
        Self {
            reservation_id: reservation.id.clone(),
            order_id,
            amount: reservation.price.payable_online(),
            currency: currency.to_string(),
            lock_expires_at: reservation.lock_expires_at,
            reused,
        }
    }
}

pub struct OrderCoordinator {
    repos: Arc<dyn RepositoryProvider>,
    provider: Arc<dyn PaymentProvider>,
    queue: NotificationQueue,
    policy: BookingPolicy,
    key_secret: String,
}

impl OrderCoordinator {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        provider: Arc<dyn PaymentProvider>,
        queue: NotificationQueue,
        policy: BookingPolicy,
        key_secret: impl Into<String>,
    ) -> Self {
        Self {
            repos,
            provider,
            queue,
            policy,
            key_secret: key_secret.into(),
        }
    }

    /// Create (or return the in-flight) provider order for a reservation.
    pub async fn create_order(
        &self,
        reservation_id: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<OrderOutcome> {
        let reservation = self
            .repos
            .reservations()
            .find_by_id(reservation_id)
            .await?
            .ok_or_else(|| DomainError::reservation_not_found(reservation_id))?;

        match reservation.order_precheck(now, self.policy.pending_grace)? {
            OrderPrecheck::ReuseExisting(order_id) => {
                info!(
                    reservation_id,
                    %order_id,
                    "Returning in-flight order (idempotent retry)"
                );
                return Ok(OrderOutcome::new(
                    &reservation,
                    order_id,
                    &self.policy.currency,
                    true,
                ));
            }
            OrderPrecheck::ExpireNow => return Err(self.expire_on_request(&reservation, now).await),
            OrderPrecheck::CreateNew => {}
        }

        self.ensure_no_competing_payment(&reservation).await?;

        let request = self.order_request(&reservation);
        let order = match self.provider.create_order(request).await {
            Ok(order) => order,
            Err(e) => {
                error!(reservation_id, error = %e, "Provider order creation failed");
                if let Err(mark_err) = self
                    .repos
                    .reservations()
                    .apply_change(reservation_id, ReservationChange::MarkOrderFailed, now)
                    .await
                {
                    warn!(reservation_id, error = %mark_err, "Failed to mark payment as failed");
                }
                return Err(e);
            }
        };

        match self
            .repos
            .reservations()
            .claim_for_payment(reservation_id, &order.id, now, self.policy.payment_lock)
            .await
        {
            Ok(claimed) => {
                metrics::counter!("booking_orders_created_total").increment(1);
                info!(
                    reservation_id,
                    order_id = %order.id,
                    amount = order.amount,
                    from = %ReservationStatus::Pending,
                    to = %claimed.status,
                    lock_expires_at = ?claimed.lock_expires_at,
                    "Payment order created"
                );
                Ok(OrderOutcome::new(
                    &claimed,
                    order.id,
                    &self.policy.currency,
                    false,
                ))
            }
            Err(e @ DomainError::SlotUnavailable(_)) => {
                metrics::counter!("booking_order_conflicts_total").increment(1);
                warn!(
                    reservation_id,
                    order_id = %order.id,
                    "Lost the slot after creating a provider order; order left unpaid"
                );
                Err(e)
            }
            Err(
                e @ (DomainError::NoLongerValid { .. }
                | DomainError::AlreadyConfirmed(_)
                | DomainError::NotFound { .. }),
            ) => {
                metrics::counter!("booking_orphaned_payments_total").increment(1);
                error!(
                    reservation_id,
                    order_id = %order.id,
                    amount = order.amount,
                    error = %e,
                    "🚨 Provider order created for a reservation that can no longer be claimed, needs reconciliation"
                );
                Err(e)
            }
            Err(e) => {
                error!(
                    reservation_id,
                    order_id = %order.id,
                    error = %e,
                    "Failed to attach provider order to reservation"
                );
                Err(e)
            }
        }
    }

    async fn ensure_no_competing_payment(&self, reservation: &Reservation) -> DomainResult<()> {
        let slot = reservation.slot_key();
        let siblings = self.repos.reservations().find_for_slot(&slot).await?;
        if let Some(blocker) = siblings
            .iter()
            .find(|s| s.id != reservation.id && s.blocks_payment())
        {
            metrics::counter!("booking_order_conflicts_total").increment(1);
            info!(
                reservation_id = %reservation.id,
                blocker = %blocker.id,
                slot = %slot,
                "Slot has a competing payment"
            );
            return Err(DomainError::SlotUnavailable(format!(
                "slot {} already has a payment in progress",
                slot
            )));
        }
        Ok(())
    }

    /// Expire a reservation that is past its grace window or payment lock
    /// and produce the error returned to the caller. The grace window is
    /// checked first, also for reservations with an order in flight.
    async fn expire_on_request(&self, reservation: &Reservation, now: DateTime<Utc>) -> DomainError {
        let grace = self.policy.pending_grace;
        let (change, reason) = if reservation.grace_elapsed(now, grace) {
            (ReservationChange::ExpireGraceElapsed { grace }, "grace_elapsed")
        } else {
            (ReservationChange::ExpirePaymentTimeout, "payment_timeout")
        };

        match self
            .repos
            .reservations()
            .apply_change(&reservation.id, change, now)
            .await
        {
            Ok((stored, transition)) => {
                if transition.applied() {
                    metrics::counter!("booking_reservations_expired_total", "sweep" => "on_request")
                        .increment(1);
                    info!(
                        reservation_id = %reservation.id,
                        from = %reservation.status,
                        to = %stored.status,
                        reason,
                        "Reservation expired on order request"
                    );
                    self.queue
                        .enqueue(Event::ReservationExpired(ReservationExpiredEvent {
                            reservation_id: stored.id.clone(),
                            reason: reason.into(),
                            timestamp: now,
                        }));
                } else if stored.status == ReservationStatus::Confirmed {
                    return DomainError::AlreadyConfirmed(stored.id);
                }
                DomainError::Expired(stored.id)
            }
            Err(e) => e,
        }
    }

    fn order_request(&self, reservation: &Reservation) -> CreateOrderRequest {
        let mut notes = BTreeMap::new();
        notes.insert("reservation_id".to_string(), reservation.id.clone());
        notes.insert("resource_id".to_string(), reservation.resource_id.clone());
        notes.insert("slot".to_string(), reservation.slot_key().to_string());
        if reservation.price.venue_due > 0 {
            notes.insert(
                "venue_due_amount".to_string(),
                reservation.price.venue_due.to_string(),
            );
        }

        CreateOrderRequest {
            amount: reservation.price.payable_online(),
            currency: self.policy.currency.clone(),
            receipt: reservation.reference_code.clone(),
            payment_capture: true,
            notes,
        }
    }

    /// Check a client-supplied checkout signature. Informational only:
    /// reservation state is changed by the webhook alone.
    pub fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let valid =
            crypto::verify_payment_signature(&self.key_secret, order_id, payment_id, signature);
        if !valid {
            warn!(order_id, payment_id, "Client payment signature mismatch");
        }
        valid
    }

    pub async fn fetch_order(&self, order_id: &str) -> DomainResult<ProviderOrder> {
        self.provider.fetch_order(order_id).await
    }

    pub async fn fetch_payment(&self, payment_id: &str) -> DomainResult<ProviderPayment> {
        self.provider.fetch_payment(payment_id).await
    }
}

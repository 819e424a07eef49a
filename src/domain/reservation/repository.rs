//! Reservation repository interface
//!
//! Every mutating method is atomic with respect to the reservation row it
//! touches: implementations read the row under a row lock (or equivalent),
//! apply the domain transition, and write it back guarded by `version`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use super::model::{Reservation, Transition};
use crate::domain::slot::SlotKey;
use crate::domain::DomainResult;

/// Single-row transitions applied under the row lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationChange {
    /// Stale-pending sweep: only if still PENDING past the grace window
    ExpireStalePending { grace: Duration },
    /// Payment-timeout sweep: only if AWAITING_CONFIRMATION past its lock
    ExpirePaymentTimeout,
    /// Order request after the grace window: any non-terminal status
    ExpireGraceElapsed { grace: Duration },
    /// Unconditional expiry of a non-terminal reservation
    Expire,
    /// Provider order creation failed
    MarkOrderFailed,
    /// Provider reported a failed payment
    FailPayment,
    /// Explicit cancellation by owner or admin
    Cancel,
}

impl ReservationChange {
    pub fn apply(&self, r: &mut Reservation, now: DateTime<Utc>) -> DomainResult<Transition> {
        match *self {
            Self::ExpireStalePending { grace } => {
                if r.is_stale_pending(now, grace) {
                    Ok(r.expire(now))
                } else {
                    Ok(Transition::Unchanged)
                }
            }
            Self::ExpirePaymentTimeout => {
                if r.is_payment_timed_out(now) {
                    Ok(r.expire(now))
                } else {
                    Ok(Transition::Unchanged)
                }
            }
            Self::ExpireGraceElapsed { grace } => {
                if r.grace_elapsed(now, grace) {
                    Ok(r.expire(now))
                } else {
                    Ok(Transition::Unchanged)
                }
            }
            Self::Expire => Ok(r.expire(now)),
            Self::MarkOrderFailed => Ok(r.mark_order_failed(now)),
            Self::FailPayment => r.fail_payment(now),
            Self::Cancel => r.cancel(now),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ExpireStalePending { .. } => "expire_stale_pending",
            Self::ExpirePaymentTimeout => "expire_payment_timeout",
            Self::ExpireGraceElapsed { .. } => "expire_grace_elapsed",
            Self::Expire => "expire",
            Self::MarkOrderFailed => "mark_order_failed",
            Self::FailPayment => "fail_payment",
            Self::Cancel => "cancel",
        }
    }
}

/// Result of confirming a captured payment.
#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    /// Newly confirmed; siblings competing for the slot were expired
    Confirmed {
        reservation: Reservation,
        expired_siblings: Vec<String>,
    },
    /// Duplicate delivery, nothing changed
    AlreadyConfirmed(Reservation),
}

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Save a new reservation
    async fn insert(&self, reservation: Reservation) -> DomainResult<()>;

    /// Find reservation by ID
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Reservation>>;

    /// Find the reservation a provider order was created for
    async fn find_by_order_id(&self, order_id: &str) -> DomainResult<Option<Reservation>>;

    /// All reservations (any status) for one slot
    async fn find_for_slot(&self, slot: &SlotKey) -> DomainResult<Vec<Reservation>>;

    /// Non-terminal and confirmed reservations for a resource on a date
    async fn find_live_for_date(
        &self,
        resource_id: &str,
        date: NaiveDate,
    ) -> DomainResult<Vec<Reservation>>;

    /// PENDING reservations created before `created_before`
    async fn find_stale_pending(
        &self,
        created_before: DateTime<Utc>,
    ) -> DomainResult<Vec<Reservation>>;

    /// AWAITING_CONFIRMATION reservations whose lock expired before `now`
    async fn find_payment_timed_out(&self, now: DateTime<Utc>) -> DomainResult<Vec<Reservation>>;

    /// Apply a single-row transition atomically.
    ///
    /// Returns the stored reservation after the change and whether anything
    /// was written.
    async fn apply_change(
        &self,
        id: &str,
        change: ReservationChange,
        now: DateTime<Utc>,
    ) -> DomainResult<(Reservation, Transition)>;

    /// Attach a provider order and move PENDING → AWAITING_CONFIRMATION,
    /// rechecking in the same transaction that no other reservation for the
    /// slot has a payment in progress or completed.
    async fn claim_for_payment(
        &self,
        id: &str,
        order_id: &str,
        now: DateTime<Utc>,
        lock: Duration,
    ) -> DomainResult<Reservation>;

    /// Confirm a captured payment and, in the same transaction, expire every
    /// non-terminal sibling competing for the slot.
    async fn confirm_and_expire_siblings(
        &self,
        id: &str,
        payment_id: &str,
        method: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<ConfirmOutcome>;

    /// Null the owner reference on all of a user's reservations
    async fn anonymize_owner(&self, user_id: &str, now: DateTime<Utc>) -> DomainResult<u64>;
}

//! Reservation domain entity
//!
//! A reservation is a user's claim on one generated slot. It carries two
//! parallel state machines:
//!
//! ```text
//! PENDING ──order created──> AWAITING_CONFIRMATION ──captured──> CONFIRMED
//! PENDING ──grace elapsed───────────────────────────────────────> EXPIRED
//! AWAITING_CONFIRMATION ──payment failed────────────────────────> CANCELLED
//! AWAITING_CONFIRMATION ──lock elapsed──────────────────────────> EXPIRED
//! any non-terminal ──cancelled by owner/admin───────────────────> CANCELLED
//! ```
//!
//! and a coarser payment status (`NOT_STARTED`, `IN_PROGRESS`, `SUCCESS`,
//! `FAILED`). Every transition method here is pure; persistence and
//! locking live in the repository.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use crate::domain::slot::SlotKey;
use crate::domain::{DomainError, DomainResult};

/// Booking status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservationStatus {
    /// Created, no provider order yet
    Pending,
    /// Provider order created, waiting for the webhook
    AwaitingConfirmation,
    /// Paid
    Confirmed,
    /// Payment failed or cancelled by owner/admin
    Cancelled,
    /// Grace window or payment lock elapsed, or lost the slot to a sibling
    Expired,
}

impl ReservationStatus {
    pub const NON_TERMINAL: [ReservationStatus; 2] =
        [ReservationStatus::Pending, ReservationStatus::AwaitingConfirmation];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::AwaitingConfirmation => "AWAITING_CONFIRMATION",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "AWAITING_CONFIRMATION" => Some(Self::AwaitingConfirmation),
            "CONFIRMED" => Some(Self::Confirmed),
            "CANCELLED" => Some(Self::Cancelled),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Cancelled | Self::Expired)
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment status, tracked alongside the booking status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentStatus {
    NotStarted,
    InProgress,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NOT_STARTED" => Some(Self::NotStarted),
            "IN_PROGRESS" => Some(Self::InProgress),
            "SUCCESS" => Some(Self::Success),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of applying a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// State changed and must be persisted
    Applied,
    /// Already in the requested state, or not eligible; nothing to persist
    Unchanged,
}

impl Transition {
    pub fn applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

/// What `createOrder` should do with a reservation, decided before any
/// provider call is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderPrecheck {
    /// Create a fresh provider order
    CreateNew,
    /// An order is already in flight; hand back its id
    ReuseExisting(String),
    /// The reservation timed out; expire it and reject
    ExpireNow,
}

/// Price breakdown in minor currency units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBreakdown {
    pub total: i64,
    /// Portion collected online through the payment provider
    pub online: i64,
    /// Portion collected at the venue
    pub venue_due: i64,
}

impl PriceBreakdown {
    pub fn full(total: i64) -> Self {
        Self {
            total,
            online: total,
            venue_due: 0,
        }
    }

    /// Amount to charge through the provider; falls back to the total when
    /// no split is configured.
    pub fn payable_online(&self) -> i64 {
        if self.online > 0 {
            self.online
        } else {
            self.total
        }
    }
}

/// Persisted booking record
#[derive(Debug, Clone)]
pub struct Reservation {
    pub id: String,
    /// Human-readable reference, e.g. `BK-250114-7QX2MD`
    pub reference_code: String,
    pub resource_id: String,
    pub booking_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// `None` once the owner has been anonymized
    pub user_id: Option<String>,
    pub price: PriceBreakdown,
    pub status: ReservationStatus,
    pub payment_status: PaymentStatus,
    pub provider_order_id: Option<String>,
    pub provider_payment_id: Option<String>,
    pub payment_method: Option<String>,
    pub payment_initiated_at: Option<DateTime<Utc>>,
    pub payment_completed_at: Option<DateTime<Utc>>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped on every write
    pub version: i32,
}

impl Reservation {
    pub fn new_pending(
        id: impl Into<String>,
        reference_code: impl Into<String>,
        slot: &SlotKey,
        user_id: Option<String>,
        price: PriceBreakdown,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            reference_code: reference_code.into(),
            resource_id: slot.resource_id.clone(),
            booking_date: slot.date,
            start_time: slot.start_time,
            end_time: slot.end_time,
            user_id,
            price,
            status: ReservationStatus::Pending,
            payment_status: PaymentStatus::NotStarted,
            provider_order_id: None,
            provider_payment_id: None,
            payment_method: None,
            payment_initiated_at: None,
            payment_completed_at: None,
            lock_expires_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn slot_key(&self) -> SlotKey {
        SlotKey::new(
            self.resource_id.clone(),
            self.booking_date,
            self.start_time,
            self.end_time,
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Held by an in-flight payment whose lock has not elapsed.
    pub fn holds_slot(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::AwaitingConfirmation
            && self.lock_expires_at.map_or(false, |until| until > now)
    }

    /// Whether this reservation blocks other reservations from paying for
    /// the same slot.
    pub fn blocks_payment(&self) -> bool {
        matches!(
            self.payment_status,
            PaymentStatus::InProgress | PaymentStatus::Success
        ) && self.status != ReservationStatus::Expired
            && self.status != ReservationStatus::Cancelled
    }

    /// PENDING with no order and older than the grace window.
    pub fn is_stale_pending(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.status == ReservationStatus::Pending && now - self.created_at > grace
    }

    /// Non-terminal and created longer than `grace` ago. Past this point a
    /// reservation can no longer be paid, whatever its payment lock says.
    pub fn grace_elapsed(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        !self.is_terminal() && now - self.created_at > grace
    }

    /// AWAITING_CONFIRMATION and the payment lock is in the past.
    pub fn is_payment_timed_out(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::AwaitingConfirmation
            && self.lock_expires_at.map_or(true, |until| until <= now)
    }

    /// Preconditions for `createOrder`, in the order they must be checked.
    pub fn order_precheck(&self, now: DateTime<Utc>, grace: Duration) -> DomainResult<OrderPrecheck> {
        match self.status {
            ReservationStatus::Confirmed => {
                return Err(DomainError::AlreadyConfirmed(self.id.clone()))
            }
            ReservationStatus::Cancelled | ReservationStatus::Expired => {
                return Err(self.no_longer_valid())
            }
            ReservationStatus::Pending | ReservationStatus::AwaitingConfirmation => {}
        }

        if self.grace_elapsed(now, grace) {
            return Ok(OrderPrecheck::ExpireNow);
        }

        if self.status == ReservationStatus::AwaitingConfirmation {
            if self.is_payment_timed_out(now) {
                return Ok(OrderPrecheck::ExpireNow);
            }
            if self.payment_status == PaymentStatus::InProgress {
                if let Some(order_id) = &self.provider_order_id {
                    return Ok(OrderPrecheck::ReuseExisting(order_id.clone()));
                }
            }
            return Err(self.no_longer_valid());
        }

        match self.payment_status {
            PaymentStatus::NotStarted => Ok(OrderPrecheck::CreateNew),
            _ => Err(self.no_longer_valid()),
        }
    }

    /// Record a freshly created provider order. PENDING → AWAITING_CONFIRMATION.
    pub fn begin_payment(
        &mut self,
        order_id: impl Into<String>,
        now: DateTime<Utc>,
        lock: Duration,
    ) -> DomainResult<()> {
        if self.status != ReservationStatus::Pending
            || self.payment_status != PaymentStatus::NotStarted
        {
            return Err(self.no_longer_valid());
        }
        self.provider_order_id = Some(order_id.into());
        self.payment_status = PaymentStatus::InProgress;
        self.status = ReservationStatus::AwaitingConfirmation;
        self.payment_initiated_at = Some(now);
        self.lock_expires_at = Some(now + lock);
        self.updated_at = now;
        Ok(())
    }

    /// Provider order could not be created. The reservation stays PENDING
    /// (the stale-pending sweep reclaims it) but can no longer be paid.
    pub fn mark_order_failed(&mut self, now: DateTime<Utc>) -> Transition {
        if self.status != ReservationStatus::Pending || self.payment_status.is_terminal() {
            return Transition::Unchanged;
        }
        self.payment_status = PaymentStatus::Failed;
        self.updated_at = now;
        Transition::Applied
    }

    /// Successful capture reported by the provider.
    ///
    /// Re-delivery to an already CONFIRMED reservation is a no-op. A capture
    /// for a CANCELLED/EXPIRED reservation is an orphaned payment and is
    /// rejected so it never silently re-confirms.
    pub fn confirm_payment(
        &mut self,
        payment_id: impl Into<String>,
        method: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Transition> {
        match self.status {
            ReservationStatus::Confirmed => Ok(Transition::Unchanged),
            ReservationStatus::Cancelled | ReservationStatus::Expired => {
                Err(self.no_longer_valid())
            }
            ReservationStatus::Pending | ReservationStatus::AwaitingConfirmation => {
                self.provider_payment_id = Some(payment_id.into());
                self.payment_method = method;
                self.payment_status = PaymentStatus::Success;
                self.payment_completed_at = Some(now);
                self.status = ReservationStatus::Confirmed;
                self.lock_expires_at = None;
                self.updated_at = now;
                Ok(Transition::Applied)
            }
        }
    }

    /// Failed payment reported by the provider.
    pub fn fail_payment(&mut self, now: DateTime<Utc>) -> DomainResult<Transition> {
        match self.status {
            ReservationStatus::Cancelled => Ok(Transition::Unchanged),
            ReservationStatus::Confirmed => Err(DomainError::AlreadyConfirmed(self.id.clone())),
            ReservationStatus::Expired => Err(self.no_longer_valid()),
            ReservationStatus::Pending | ReservationStatus::AwaitingConfirmation => {
                self.payment_status = PaymentStatus::Failed;
                self.status = ReservationStatus::Cancelled;
                self.lock_expires_at = None;
                self.updated_at = now;
                Ok(Transition::Applied)
            }
        }
    }

    /// Move any non-terminal reservation to EXPIRED. An in-flight payment is
    /// marked FAILED in the same step.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Transition {
        if self.is_terminal() {
            return Transition::Unchanged;
        }
        if self.payment_status == PaymentStatus::InProgress
            || self.status == ReservationStatus::AwaitingConfirmation
        {
            self.payment_status = PaymentStatus::Failed;
        }
        self.status = ReservationStatus::Expired;
        self.lock_expires_at = None;
        self.updated_at = now;
        Transition::Applied
    }

    /// Explicit cancellation by the owner or an admin.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> DomainResult<Transition> {
        match self.status {
            ReservationStatus::Cancelled => Ok(Transition::Unchanged),
            ReservationStatus::Confirmed => Err(DomainError::AlreadyConfirmed(self.id.clone())),
            ReservationStatus::Expired => Err(self.no_longer_valid()),
            ReservationStatus::Pending | ReservationStatus::AwaitingConfirmation => {
                if self.payment_status == PaymentStatus::InProgress {
                    self.payment_status = PaymentStatus::Failed;
                }
                self.status = ReservationStatus::Cancelled;
                self.lock_expires_at = None;
                self.updated_at = now;
                Ok(Transition::Applied)
            }
        }
    }

    /// Drop the owner reference; booking facts are retained.
    pub fn anonymize(&mut self, now: DateTime<Utc>) -> Transition {
        if self.user_id.take().is_some() {
            self.updated_at = now;
            Transition::Applied
        } else {
            Transition::Unchanged
        }
    }

    fn no_longer_valid(&self) -> DomainError {
        DomainError::NoLongerValid {
            id: self.id.clone(),
            status: self.status.to_string(),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-14T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn grace() -> Duration {
        Duration::minutes(5)
    }

    fn lock() -> Duration {
        Duration::minutes(10)
    }

    fn sample() -> Reservation {
        let slot = SlotKey::new(
            "court-1",
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        );
        Reservation::new_pending(
            "r1",
            "BK-250114-AAAAAA",
            &slot,
            Some("user-1".into()),
            PriceBreakdown::full(1000),
            t0(),
        )
    }

    fn awaiting() -> Reservation {
        let mut r = sample();
        r.begin_payment("order_1", t0() + Duration::minutes(1), lock())
            .unwrap();
        r
    }

    #[test]
    fn new_reservation_is_pending() {
        let r = sample();
        assert_eq!(r.status, ReservationStatus::Pending);
        assert_eq!(r.payment_status, PaymentStatus::NotStarted);
        assert!(!r.is_terminal());
        assert_eq!(r.slot_key().resource_id, "court-1");
    }

    #[test]
    fn precheck_within_grace_creates_order() {
        let r = sample();
        let check = r.order_precheck(t0() + Duration::minutes(4), grace()).unwrap();
        assert_eq!(check, OrderPrecheck::CreateNew);
    }

    #[test]
    fn precheck_after_grace_expires() {
        let r = sample();
        let check = r.order_precheck(t0() + Duration::minutes(6), grace()).unwrap();
        assert_eq!(check, OrderPrecheck::ExpireNow);
    }

    #[test]
    fn precheck_reuses_in_flight_order() {
        let r = awaiting();
        let check = r.order_precheck(t0() + Duration::minutes(2), grace()).unwrap();
        assert_eq!(check, OrderPrecheck::ReuseExisting("order_1".into()));
    }

    #[test]
    fn precheck_grace_applies_before_in_flight_reuse() {
        let r = awaiting();
        // lock runs until t0+11m, grace ends at t0+5m
        let check = r.order_precheck(t0() + Duration::minutes(5), grace()).unwrap();
        assert_eq!(check, OrderPrecheck::ReuseExisting("order_1".into()));
        let check = r.order_precheck(t0() + Duration::minutes(6), grace()).unwrap();
        assert_eq!(check, OrderPrecheck::ExpireNow);
        assert!(r.grace_elapsed(t0() + Duration::minutes(6), grace()));
        assert!(!r.is_payment_timed_out(t0() + Duration::minutes(6)));
    }

    #[test]
    fn precheck_rejects_terminal_states() {
        let mut r = awaiting();
        r.confirm_payment("pay_1", None, t0()).unwrap();
        assert!(matches!(
            r.order_precheck(t0(), grace()),
            Err(DomainError::AlreadyConfirmed(_))
        ));

        let mut r = sample();
        r.expire(t0());
        assert!(matches!(
            r.order_precheck(t0(), grace()),
            Err(DomainError::NoLongerValid { .. })
        ));
    }

    #[test]
    fn precheck_rejects_after_failed_order() {
        let mut r = sample();
        assert!(r.mark_order_failed(t0()).applied());
        assert_eq!(r.status, ReservationStatus::Pending);
        assert!(matches!(
            r.order_precheck(t0(), grace()),
            Err(DomainError::NoLongerValid { .. })
        ));
    }

    #[test]
    fn begin_payment_sets_lock() {
        let r = awaiting();
        let at = t0() + Duration::minutes(1);
        assert_eq!(r.status, ReservationStatus::AwaitingConfirmation);
        assert_eq!(r.payment_status, PaymentStatus::InProgress);
        assert_eq!(r.payment_initiated_at, Some(at));
        assert_eq!(r.lock_expires_at, Some(at + lock()));
        assert!(r.holds_slot(at));
        assert!(!r.holds_slot(at + lock()));
        assert!(r.blocks_payment());
    }

    #[test]
    fn begin_payment_twice_is_rejected() {
        let mut r = awaiting();
        assert!(r.begin_payment("order_2", t0(), lock()).is_err());
        assert_eq!(r.provider_order_id.as_deref(), Some("order_1"));
    }

    #[test]
    fn confirm_is_idempotent() {
        let mut r = awaiting();
        let at = t0() + Duration::minutes(3);
        assert_eq!(
            r.confirm_payment("pay_1", Some("upi".into()), at).unwrap(),
            Transition::Applied
        );
        assert_eq!(r.status, ReservationStatus::Confirmed);
        assert_eq!(r.payment_status, PaymentStatus::Success);
        assert_eq!(r.lock_expires_at, None);
        assert_eq!(r.payment_completed_at, Some(at));
        assert_eq!(
            r.confirm_payment("pay_1", Some("upi".into()), at).unwrap(),
            Transition::Unchanged
        );
    }

    #[test]
    fn confirm_after_expiry_is_orphaned() {
        let mut r = awaiting();
        r.expire(t0() + Duration::minutes(12));
        let result = r.confirm_payment("pay_1", None, t0() + Duration::minutes(13));
        assert!(matches!(result, Err(DomainError::NoLongerValid { .. })));
        assert_eq!(r.status, ReservationStatus::Expired);
    }

    #[test]
    fn failure_cancels_once() {
        let mut r = awaiting();
        assert_eq!(r.fail_payment(t0()).unwrap(), Transition::Applied);
        assert_eq!(r.status, ReservationStatus::Cancelled);
        assert_eq!(r.payment_status, PaymentStatus::Failed);
        assert_eq!(r.fail_payment(t0()).unwrap(), Transition::Unchanged);
    }

    #[test]
    fn failure_does_not_undo_confirmation() {
        let mut r = awaiting();
        r.confirm_payment("pay_1", None, t0()).unwrap();
        assert!(r.fail_payment(t0()).is_err());
        assert_eq!(r.status, ReservationStatus::Confirmed);
    }

    #[test]
    fn expire_marks_in_flight_payment_failed() {
        let mut r = awaiting();
        assert!(r.expire(t0()).applied());
        assert_eq!(r.status, ReservationStatus::Expired);
        assert_eq!(r.payment_status, PaymentStatus::Failed);
        assert_eq!(r.lock_expires_at, None);
        assert!(!r.expire(t0()).applied());
    }

    #[test]
    fn expire_keeps_untouched_payment_status_for_pending() {
        let mut r = sample();
        r.expire(t0());
        assert_eq!(r.payment_status, PaymentStatus::NotStarted);
    }

    #[test]
    fn stale_and_timeout_predicates() {
        let r = sample();
        assert!(!r.is_stale_pending(t0() + Duration::minutes(5), grace()));
        assert!(r.is_stale_pending(t0() + Duration::minutes(6), grace()));

        let r = awaiting();
        assert!(!r.is_stale_pending(t0() + Duration::hours(1), grace()));
        assert!(!r.is_payment_timed_out(t0() + Duration::minutes(10)));
        assert!(r.is_payment_timed_out(t0() + Duration::minutes(11)));
    }

    #[test]
    fn cancel_rules() {
        let mut r = awaiting();
        assert!(r.cancel(t0()).unwrap().applied());
        assert_eq!(r.payment_status, PaymentStatus::Failed);
        assert!(!r.cancel(t0()).unwrap().applied());

        let mut r = awaiting();
        r.confirm_payment("pay", None, t0()).unwrap();
        assert!(matches!(r.cancel(t0()), Err(DomainError::AlreadyConfirmed(_))));
    }

    #[test]
    fn anonymize_drops_owner_only() {
        let mut r = awaiting();
        assert!(r.anonymize(t0()).applied());
        assert_eq!(r.user_id, None);
        assert_eq!(r.provider_order_id.as_deref(), Some("order_1"));
        assert!(!r.anonymize(t0()).applied());
    }

    #[test]
    fn status_parse_roundtrip() {
        for status in [
            ReservationStatus::Pending,
            ReservationStatus::AwaitingConfirmation,
            ReservationStatus::Confirmed,
            ReservationStatus::Cancelled,
            ReservationStatus::Expired,
        ] {
            assert_eq!(ReservationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReservationStatus::parse("Accepted"), None);
        assert_eq!(PaymentStatus::parse("IN_PROGRESS"), Some(PaymentStatus::InProgress));
        assert_eq!(PaymentStatus::parse("PAID"), None);
    }

    #[test]
    fn payable_online_falls_back_to_total() {
        let split = PriceBreakdown {
            total: 1000,
            online: 300,
            venue_due: 700,
        };
        assert_eq!(split.payable_online(), 300);
        let unsplit = PriceBreakdown {
            total: 1000,
            online: 0,
            venue_due: 0,
        };
        assert_eq!(unsplit.payable_online(), 1000);
    }
}

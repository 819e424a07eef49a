//! End-to-end booking flows against an in-memory SQLite database, the mock
//! payment provider and a recording notifier.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use courtbook::application::ports::{
    CreateOrderRequest, Notifier, NotifyError, PaymentProvider, ProviderOrder, ProviderPayment,
};
use courtbook::application::{
    notification_channel, AvailabilityChecker, BookingPolicy, BookingService, CreateReservation,
    ExpirySweeper, NotificationWorker, OrderCoordinator, SlotAvailability, WebhookOutcome,
    WebhookProcessor,
};
use courtbook::domain::events::EventMessage;
use courtbook::domain::reservation::ReservationChange;
use courtbook::domain::{
    DomainError, DomainResult, OperatingHours, PaymentStatus, RepositoryProvider, Reservation,
    ReservationStatus, Resource,
};
use courtbook::infrastructure::MockPaymentProvider;
use courtbook::shared::RetryConfig;
use courtbook::{init_database, run_migrations, DatabaseConfig, SeaOrmRepositoryProvider};

const WEBHOOK_SECRET: &str = "whsec_test";
const KEY_SECRET: &str = "key_secret_test";

#[derive(Default)]
struct RecordingNotifier {
    seen: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    fn events(&self) -> Vec<(String, String)> {
        self.seen.lock().unwrap().clone()
    }

    fn count(&self, event_type: &str, reservation_id: &str) -> usize {
        self.events()
            .iter()
            .filter(|(t, id)| t == event_type && id == reservation_id)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &EventMessage) -> Result<(), NotifyError> {
        self.seen.lock().unwrap().push((
            message.event.event_type().to_string(),
            message.event.reservation_id().to_string(),
        ));
        Ok(())
    }
}

/// Provider whose order creation races with the owner cancelling the
/// reservation: the order succeeds, but the reservation is cancelled
/// before the coordinator can claim it.
struct CancelDuringOrder {
    inner: Arc<MockPaymentProvider>,
    repos: Arc<dyn RepositoryProvider>,
    reservation_id: String,
    at: DateTime<Utc>,
}

#[async_trait]
impl PaymentProvider for CancelDuringOrder {
    fn name(&self) -> &'static str {
        "cancel-during-order"
    }

    async fn create_order(&self, request: CreateOrderRequest) -> DomainResult<ProviderOrder> {
        let order = self.inner.create_order(request).await?;
        self.repos
            .reservations()
            .apply_change(&self.reservation_id, ReservationChange::Cancel, self.at)
            .await?;
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &str) -> DomainResult<ProviderOrder> {
        self.inner.fetch_order(order_id).await
    }

    async fn fetch_payment(&self, payment_id: &str) -> DomainResult<ProviderPayment> {
        self.inner.fetch_payment(payment_id).await
    }
}

struct Harness {
    repos: Arc<dyn RepositoryProvider>,
    provider: Arc<MockPaymentProvider>,
    availability: AvailabilityChecker,
    bookings: BookingService,
    orders: Arc<OrderCoordinator>,
    webhooks: WebhookProcessor,
    sweeper: ExpirySweeper,
    worker: NotificationWorker,
    notifier: Arc<RecordingNotifier>,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 14, 10, 0, 0).unwrap()
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

async fn harness() -> Harness {
    harness_on(DatabaseConfig::in_memory()).await
}

async fn harness_on(config: DatabaseConfig) -> Harness {
    let db = init_database(&config).await.unwrap();
    run_migrations(&db).await.unwrap();
    let repos: Arc<dyn RepositoryProvider> = Arc::new(SeaOrmRepositoryProvider::new(db));

    let hours = OperatingHours::new(hm(6, 0), hm(22, 0), 60, 50_000);
    repos
        .resources()
        .save(Resource::new("court-1", "Court 1", hours))
        .await
        .unwrap();

    let policy = BookingPolicy::default();
    let provider = Arc::new(MockPaymentProvider::new(WEBHOOK_SECRET));
    let (queue, receiver) = notification_channel();
    let notifier = Arc::new(RecordingNotifier::default());
    let worker = NotificationWorker::new(receiver, notifier.clone()).with_retry(RetryConfig {
        max_attempts: 1,
        ..RetryConfig::default()
    });

    Harness {
        availability: AvailabilityChecker::new(repos.clone(), policy.max_slots_per_day),
        bookings: BookingService::new(repos.clone(), queue.clone(), policy.clone()),
        orders: Arc::new(OrderCoordinator::new(
            repos.clone(),
            provider.clone(),
            queue.clone(),
            policy.clone(),
            KEY_SECRET,
        )),
        webhooks: WebhookProcessor::new(repos.clone(), queue.clone(), WEBHOOK_SECRET),
        sweeper: ExpirySweeper::new(repos.clone(), queue, policy.pending_grace),
        repos,
        provider,
        worker,
        notifier,
    }
}

impl Harness {
    async fn reserve(&self, start: u32, now: DateTime<Utc>) -> Reservation {
        self.bookings
            .create_reservation(
                CreateReservation {
                    resource_id: "court-1".into(),
                    date: date(),
                    start_time: hm(start, 0),
                    end_time: hm(start + 1, 0),
                    user_id: Some("user-1".into()),
                },
                now,
            )
            .await
            .unwrap()
    }

    async fn load(&self, id: &str) -> Reservation {
        self.repos
            .reservations()
            .find_by_id(id)
            .await
            .unwrap()
            .unwrap()
    }
}

#[tokio::test]
async fn payment_timeout_sweep_expires_unpaid_reservation() {
    let h = harness().await;
    let r1 = h.reserve(18, t0()).await;

    let order = h
        .orders
        .create_order(&r1.id, t0() + Duration::minutes(4))
        .await
        .unwrap();
    assert!(!order.reused);
    assert_eq!(order.amount, 50_000);
    assert_eq!(
        h.load(&r1.id).await.status,
        ReservationStatus::AwaitingConfirmation
    );

    let report = h
        .sweeper
        .sweep_payment_timeouts(t0() + Duration::minutes(15))
        .await
        .unwrap();
    assert_eq!(report.expired, 1);

    let stored = h.load(&r1.id).await;
    assert_eq!(stored.status, ReservationStatus::Expired);
    assert_eq!(stored.payment_status, PaymentStatus::Failed);
}

#[tokio::test]
async fn second_order_for_same_slot_is_rejected() {
    let h = harness().await;
    let r1 = h.reserve(18, t0()).await;
    let r2 = h.reserve(18, t0()).await;
    let now = t0() + Duration::minutes(1);

    h.orders.create_order(&r1.id, now).await.unwrap();
    let err = h.orders.create_order(&r2.id, now).await.unwrap_err();

    assert!(matches!(err, DomainError::SlotUnavailable(_)));
    assert!(err.is_retryable_by_user());
    assert_eq!(h.load(&r2.id).await.status, ReservationStatus::Pending);
    assert_eq!(h.provider.order_count(), 1);
}

#[tokio::test]
async fn captured_webhook_confirms_and_expires_siblings() {
    let mut h = harness().await;
    let r1 = h.reserve(18, t0()).await;
    let r2 = h.reserve(18, t0()).await;
    let now = t0() + Duration::minutes(1);

    let order = h.orders.create_order(&r1.id, now).await.unwrap();
    let webhook = h.provider.capture(&order.order_id, "upi").unwrap();

    let outcome = h
        .webhooks
        .handle_webhook(&webhook.body, &webhook.signature, now + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        WebhookOutcome::Confirmed {
            reservation_id: r1.id.clone(),
            expired_siblings: vec![r2.id.clone()],
        }
    );

    let confirmed = h.load(&r1.id).await;
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    assert_eq!(confirmed.payment_status, PaymentStatus::Success);
    assert_eq!(confirmed.payment_method.as_deref(), Some("upi"));
    assert_eq!(h.load(&r2.id).await.status, ReservationStatus::Expired);

    let status = h
        .availability
        .slot_status("court-1", date(), hm(18, 0), hm(19, 0), now)
        .await
        .unwrap();
    assert_eq!(status, SlotAvailability::Booked);

    h.worker.drain().await;
    assert_eq!(h.notifier.count("reservation_confirmed", &r1.id), 1);
    assert_eq!(h.notifier.count("reservation_expired", &r2.id), 1);
}

#[tokio::test]
async fn order_after_grace_window_expires_reservation() {
    let h = harness().await;
    let r1 = h.reserve(18, t0()).await;

    let err = h
        .orders
        .create_order(&r1.id, t0() + Duration::minutes(6))
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::Expired(_)));
    assert_eq!(h.load(&r1.id).await.status, ReservationStatus::Expired);
    assert_eq!(h.provider.order_count(), 0);
}

#[tokio::test]
async fn tampered_webhook_is_rejected_without_state_change() {
    let h = harness().await;
    let r1 = h.reserve(18, t0()).await;
    let now = t0() + Duration::minutes(1);
    let order = h.orders.create_order(&r1.id, now).await.unwrap();
    let webhook = h.provider.capture(&order.order_id, "card").unwrap();

    let tampered = String::from_utf8(webhook.body.clone())
        .unwrap()
        .replace("captured", "authorized");
    let err = h
        .webhooks
        .handle_webhook(tampered.as_bytes(), &webhook.signature, now)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidSignature));

    let err = h
        .webhooks
        .handle_webhook(&webhook.body, "deadbeef", now)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidSignature));

    assert_eq!(
        h.load(&r1.id).await.status,
        ReservationStatus::AwaitingConfirmation
    );
}

/// Six reservations for one slot race `create_order`; exactly one may win
/// and every loser must see `SlotUnavailable`.
async fn race_orders_for_one_slot(h: &Harness) {
    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(h.reserve(20, t0()).await.id);
    }
    let now = t0() + Duration::minutes(2);

    let tasks: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let orders = h.orders.clone();
            tokio::spawn(async move { orders.create_order(&id, now).await })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(DomainError::SlotUnavailable(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, 1);

    let mut awaiting = 0;
    for id in &ids {
        let r = h.load(id).await;
        if r.status == ReservationStatus::AwaitingConfirmation {
            awaiting += 1;
            assert_eq!(r.payment_status, PaymentStatus::InProgress);
        } else {
            assert_eq!(r.status, ReservationStatus::Pending);
        }
    }
    assert_eq!(awaiting, 1);
}

#[tokio::test]
async fn concurrent_orders_yield_single_awaiting_reservation() {
    let h = harness().await;
    race_orders_for_one_slot(&h).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_orders_on_pooled_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("courtbook.db");
    let config = DatabaseConfig {
        max_connections: 8,
        ..DatabaseConfig::sqlite(&path.display().to_string())
    };
    let h = harness_on(config).await;
    race_orders_for_one_slot(&h).await;
}

#[tokio::test]
async fn duplicate_webhook_delivery_notifies_once() {
    let mut h = harness().await;
    let r1 = h.reserve(9, t0()).await;
    let now = t0() + Duration::minutes(1);
    let order = h.orders.create_order(&r1.id, now).await.unwrap();
    let webhook = h.provider.capture(&order.order_id, "card").unwrap();

    let first = h
        .webhooks
        .handle_webhook(&webhook.body, &webhook.signature, now)
        .await
        .unwrap();
    let second = h
        .webhooks
        .handle_webhook(&webhook.body, &webhook.signature, now + Duration::seconds(30))
        .await
        .unwrap();

    assert_eq!(first.label(), "confirmed");
    assert_eq!(
        second,
        WebhookOutcome::Duplicate {
            reservation_id: r1.id.clone()
        }
    );

    h.worker.drain().await;
    assert_eq!(h.notifier.count("reservation_confirmed", &r1.id), 1);
}

#[tokio::test]
async fn capture_after_sibling_confirmed_is_orphaned() {
    let mut h = harness().await;
    let r1 = h.reserve(18, t0()).await;
    let r2 = h.reserve(18, t0()).await;
    let now = t0() + Duration::minutes(1);

    // r1 pays and times out; r2 then takes the slot and pays
    let stale = h.orders.create_order(&r1.id, now).await.unwrap();
    h.sweeper
        .sweep_payment_timeouts(now + Duration::minutes(11))
        .await
        .unwrap();
    assert_eq!(h.load(&r1.id).await.status, ReservationStatus::Expired);

    let r3 = h.reserve(18, now + Duration::minutes(11)).await;
    let fresh = h
        .orders
        .create_order(&r3.id, now + Duration::minutes(12))
        .await
        .unwrap();
    let webhook = h.provider.capture(&fresh.order_id, "upi").unwrap();
    h.webhooks
        .handle_webhook(&webhook.body, &webhook.signature, now + Duration::minutes(13))
        .await
        .unwrap();

    // the late capture for r1 must not confirm a second booking
    let late = h.provider.capture(&stale.order_id, "upi").unwrap();
    let outcome = h
        .webhooks
        .handle_webhook(&late.body, &late.signature, now + Duration::minutes(14))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        WebhookOutcome::Orphaned {
            reservation_id: r1.id.clone()
        }
    );
    assert_eq!(h.load(&r1.id).await.status, ReservationStatus::Expired);
    assert_eq!(h.load(&r2.id).await.status, ReservationStatus::Expired);
    assert_eq!(h.load(&r3.id).await.status, ReservationStatus::Confirmed);

    let confirmed = h
        .repos
        .reservations()
        .find_for_slot(&r1.slot_key())
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.status == ReservationStatus::Confirmed)
        .count();
    assert_eq!(confirmed, 1);

    h.worker.drain().await;
    assert_eq!(h.notifier.count("payment_orphaned", &r1.id), 1);
}

#[tokio::test]
async fn provider_failure_marks_payment_failed() {
    let h = harness().await;
    let r1 = h.reserve(7, t0()).await;
    h.provider.fail_next_create_order();

    let err = h
        .orders
        .create_order(&r1.id, t0() + Duration::minutes(1))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Provider(_)));

    let stored = h.load(&r1.id).await;
    assert_eq!(stored.status, ReservationStatus::Pending);
    assert_eq!(stored.payment_status, PaymentStatus::Failed);

    let report = h
        .sweeper
        .sweep_stale_pending(t0() + Duration::minutes(6))
        .await
        .unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(h.load(&r1.id).await.status, ReservationStatus::Expired);
}

#[tokio::test]
async fn failed_payment_webhook_cancels_and_frees_slot() {
    let mut h = harness().await;
    let r1 = h.reserve(12, t0()).await;
    let now = t0() + Duration::minutes(1);
    let order = h.orders.create_order(&r1.id, now).await.unwrap();

    let held = h
        .availability
        .slot_status("court-1", date(), hm(12, 0), hm(13, 0), now)
        .await
        .unwrap();
    assert_eq!(held, SlotAvailability::Held);

    let webhook = h.provider.fail(&order.order_id, "card").unwrap();
    let outcome = h
        .webhooks
        .handle_webhook(&webhook.body, &webhook.signature, now)
        .await
        .unwrap();
    assert_eq!(outcome.label(), "cancelled");

    let stored = h.load(&r1.id).await;
    assert_eq!(stored.status, ReservationStatus::Cancelled);
    assert_eq!(stored.payment_status, PaymentStatus::Failed);

    let free = h
        .availability
        .slot_status("court-1", date(), hm(12, 0), hm(13, 0), now)
        .await
        .unwrap();
    assert_eq!(free, SlotAvailability::Available);

    h.worker.drain().await;
    assert_eq!(h.notifier.count("reservation_cancelled", &r1.id), 1);
}

#[tokio::test]
async fn retrying_order_returns_in_flight_order() {
    let h = harness().await;
    let r1 = h.reserve(15, t0()).await;

    let first = h
        .orders
        .create_order(&r1.id, t0() + Duration::minutes(1))
        .await
        .unwrap();
    let again = h
        .orders
        .create_order(&r1.id, t0() + Duration::minutes(4))
        .await
        .unwrap();

    assert!(again.reused);
    assert_eq!(again.order_id, first.order_id);
    assert_eq!(h.provider.order_count(), 1);
}

#[tokio::test]
async fn retry_after_grace_expires_in_flight_order() {
    let mut h = harness().await;
    let r1 = h.reserve(16, t0()).await;
    h.orders
        .create_order(&r1.id, t0() + Duration::minutes(1))
        .await
        .unwrap();

    // payment lock still runs until t0+11m
    let err = h
        .orders
        .create_order(&r1.id, t0() + Duration::minutes(7))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Expired(_)), "{err}");

    let stored = h.load(&r1.id).await;
    assert_eq!(stored.status, ReservationStatus::Expired);
    assert_eq!(stored.payment_status, PaymentStatus::Failed);
    assert_eq!(h.provider.order_count(), 1);

    h.worker.drain().await;
    assert_eq!(h.notifier.count("reservation_expired", &r1.id), 1);
}

#[tokio::test]
async fn reservation_cancelled_during_provider_call_is_not_claimed() {
    let h = harness().await;
    let r1 = h.reserve(17, t0()).await;
    let now = t0() + Duration::minutes(1);

    let (queue, _receiver) = notification_channel();
    let racing = OrderCoordinator::new(
        h.repos.clone(),
        Arc::new(CancelDuringOrder {
            inner: h.provider.clone(),
            repos: h.repos.clone(),
            reservation_id: r1.id.clone(),
            at: now,
        }),
        queue,
        BookingPolicy::default(),
        KEY_SECRET,
    );

    let err = racing.create_order(&r1.id, now).await.unwrap_err();
    assert!(matches!(err, DomainError::NoLongerValid { .. }), "{err}");

    // the provider order exists but is attached to nothing
    assert_eq!(h.provider.order_count(), 1);
    let stored = h.load(&r1.id).await;
    assert_eq!(stored.status, ReservationStatus::Cancelled);
    assert_eq!(stored.provider_order_id, None);
    assert_eq!(stored.payment_status, PaymentStatus::NotStarted);
}

#[tokio::test]
async fn cancel_and_anonymize() {
    let h = harness().await;
    let r1 = h.reserve(10, t0()).await;
    let r2 = h.reserve(11, t0()).await;

    let cancelled = h.bookings.cancel_reservation(&r1.id, t0()).await.unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    // second cancel is a no-op
    let again = h.bookings.cancel_reservation(&r1.id, t0()).await.unwrap();
    assert_eq!(again.status, ReservationStatus::Cancelled);

    let count = h.bookings.anonymize_owner("user-1", t0()).await.unwrap();
    assert_eq!(count, 2);
    assert_eq!(h.load(&r2.id).await.user_id, None);
}

#[tokio::test]
async fn rejects_windows_that_are_not_generated_slots() {
    let h = harness().await;
    let err = h
        .bookings
        .create_reservation(
            CreateReservation {
                resource_id: "court-1".into(),
                date: date(),
                start_time: hm(18, 30),
                end_time: hm(19, 30),
                user_id: None,
            },
            t0(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let err = h
        .bookings
        .create_reservation(
            CreateReservation {
                resource_id: "court-9".into(),
                date: date(),
                start_time: hm(18, 0),
                end_time: hm(19, 0),
                user_id: None,
            },
            t0(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound { .. }));
}

#[tokio::test]
async fn rejects_slots_that_already_started_today() {
    let h = harness().await;
    let today = t0().date_naive();
    let request = |start: u32| CreateReservation {
        resource_id: "court-1".into(),
        date: today,
        start_time: hm(start, 0),
        end_time: hm(start + 1, 0),
        user_id: None,
    };

    // t0 is 10:00 on the booking day
    for start in [9, 10] {
        let err = h
            .bookings
            .create_reservation(request(start), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)), "{err}");
    }
    let later = h.bookings.create_reservation(request(11), t0()).await.unwrap();
    assert_eq!(later.status, ReservationStatus::Pending);
}

#[tokio::test]
async fn list_slots_reports_each_window() {
    let h = harness().await;
    let r1 = h.reserve(6, t0()).await;
    h.orders
        .create_order(&r1.id, t0() + Duration::minutes(1))
        .await
        .unwrap();

    let slots = h
        .availability
        .list_slots("court-1", date(), t0() + Duration::minutes(2))
        .await
        .unwrap();
    assert_eq!(slots.len(), 16);
    assert_eq!(slots[0].availability, SlotAvailability::Held);
    assert!(slots[1..]
        .iter()
        .all(|s| s.availability == SlotAvailability::Available));
}

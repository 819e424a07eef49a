//! SeaORM implementation of ReservationRepository
//!
//! Multi-row transitions run inside one database transaction. Rows are
//! read with `SELECT ... FOR UPDATE` and written back guarded by `version`,
//! so a lost race surfaces as a domain error instead of a silent
//! overwrite. Transactions that touch several rows of one slot lock them
//! in a single query ordered by id, so two writers always queue in the
//! same order.
//!
//! SQLite has no row locks. There every write transaction takes the
//! database write lock with its first statement, and concurrent writers
//! wait on the busy timeout instead of failing after a stale read.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{debug, warn};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, DbErr, EntityTrait, IsolationLevel, QueryFilter, QueryOrder, QuerySelect,
    Set, SqlErr, TransactionTrait,
};

use crate::domain::reservation::{
    ConfirmOutcome, PriceBreakdown, Reservation, ReservationChange, ReservationRepository,
    Transition,
};
use crate::domain::slot::SlotKey;
use crate::domain::{DomainError, DomainResult};
use crate::infrastructure::database::entities::reservation::{
    self, BookingState, Column, PaymentState,
};
use crate::infrastructure::database::supports_row_locks;

pub struct SeaOrmReservationRepository {
    db: DatabaseConnection,
}

impl SeaOrmReservationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Open a transaction that will write reservation `id`.
    ///
    /// On SQLite a no-op update of the row is issued first so the write
    /// lock is held before anything is read.
    async fn begin_write(
        &self,
        id: &str,
        isolation: Option<IsolationLevel>,
    ) -> DomainResult<DatabaseTransaction> {
        let backend = self.db.get_database_backend();
        let row_locks = supports_row_locks(backend);
        let isolation = isolation.filter(|_| row_locks);
        let txn = self.db.begin_with_config(isolation, None).await?;

        if !row_locks {
            reservation::Entity::update_many()
                .col_expr(Column::Version, Expr::col(Column::Version).add(0))
                .filter(Column::Id.eq(id))
                .exec(&txn)
                .await?;
        }
        Ok(txn)
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn model_to_domain(m: reservation::Model) -> Reservation {
    Reservation {
        id: m.id,
        reference_code: m.reference_code,
        resource_id: m.resource_id,
        booking_date: m.booking_date,
        start_time: m.start_time,
        end_time: m.end_time,
        user_id: m.user_id,
        price: PriceBreakdown {
            total: m.total_amount,
            online: m.online_amount,
            venue_due: m.venue_due_amount,
        },
        status: m.status.into(),
        payment_status: m.payment_status.into(),
        provider_order_id: m.provider_order_id,
        provider_payment_id: m.provider_payment_id,
        payment_method: m.payment_method,
        payment_initiated_at: m.payment_initiated_at,
        payment_completed_at: m.payment_completed_at,
        lock_expires_at: m.lock_expires_at,
        created_at: m.created_at,
        updated_at: m.updated_at,
        version: m.version,
    }
}

fn to_active(r: &Reservation) -> reservation::ActiveModel {
    reservation::ActiveModel {
        id: Set(r.id.clone()),
        reference_code: Set(r.reference_code.clone()),
        resource_id: Set(r.resource_id.clone()),
        booking_date: Set(r.booking_date),
        start_time: Set(r.start_time),
        end_time: Set(r.end_time),
        user_id: Set(r.user_id.clone()),
        total_amount: Set(r.price.total),
        online_amount: Set(r.price.online),
        venue_due_amount: Set(r.price.venue_due),
        status: Set(BookingState::from(r.status)),
        payment_status: Set(PaymentState::from(r.payment_status)),
        provider_order_id: Set(r.provider_order_id.clone()),
        provider_payment_id: Set(r.provider_payment_id.clone()),
        payment_method: Set(r.payment_method.clone()),
        payment_initiated_at: Set(r.payment_initiated_at),
        payment_completed_at: Set(r.payment_completed_at),
        lock_expires_at: Set(r.lock_expires_at),
        created_at: Set(r.created_at),
        updated_at: Set(r.updated_at),
        version: Set(r.version),
    }
}

fn slot_condition(slot: &SlotKey) -> Condition {
    Condition::all()
        .add(Column::ResourceId.eq(slot.resource_id.as_str()))
        .add(Column::BookingDate.eq(slot.date))
        .add(Column::StartTime.eq(slot.start_time))
        .add(Column::EndTime.eq(slot.end_time))
}

/// Lost a lock race: PostgreSQL serialization failure (40001) or
/// deadlock (40P01), or SQLite busy/locked after the busy timeout.
fn is_lock_contention(msg: &str) -> bool {
    const MARKERS: [&str; 7] = [
        "40001",
        "40P01",
        "could not serialize",
        "deadlock detected",
        "database is locked",
        "database table is locked",
        "SQLITE_BUSY",
    ];
    MARKERS.iter().any(|m| msg.contains(m))
}

/// A claim that lost a lock race lost the slot.
fn claim_error(id: &str, e: DomainError) -> DomainError {
    match e {
        DomainError::Storage(msg) if is_lock_contention(&msg) => {
            warn!("Lock contention claiming reservation {}: {}", id, msg);
            DomainError::SlotUnavailable(format!(
                "concurrent payment attempt for reservation {}",
                id
            ))
        }
        other => other,
    }
}

/// A confirmation that lost a lock race is retried by the caller.
fn confirm_error(id: &str, e: DomainError) -> DomainError {
    match e {
        DomainError::Storage(msg) if is_lock_contention(&msg) => {
            warn!("Lock contention confirming reservation {}: {}", id, msg);
            DomainError::Conflict(format!("reservation {} is being modified", id))
        }
        other => other,
    }
}

fn is_unique_violation(e: &DbErr) -> bool {
    matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Read one reservation under a row lock.
async fn lock_by_id<C: ConnectionTrait>(conn: &C, id: &str) -> DomainResult<Reservation> {
    reservation::Entity::find_by_id(id.to_string())
        .lock_exclusive()
        .one(conn)
        .await?
        .map(model_to_domain)
        .ok_or_else(|| DomainError::reservation_not_found(id))
}

/// Read a reservation without locking it.
async fn read_by_id<C: ConnectionTrait>(conn: &C, id: &str) -> DomainResult<Reservation> {
    reservation::Entity::find_by_id(id.to_string())
        .one(conn)
        .await?
        .map(model_to_domain)
        .ok_or_else(|| DomainError::reservation_not_found(id))
}

/// Lock every reservation for `slot`, ordered by id.
async fn lock_slot<C: ConnectionTrait>(conn: &C, slot: &SlotKey) -> DomainResult<Vec<Reservation>> {
    let models = reservation::Entity::find()
        .filter(slot_condition(slot))
        .order_by_asc(Column::Id)
        .lock_exclusive()
        .all(conn)
        .await?;
    Ok(models.into_iter().map(model_to_domain).collect())
}

/// Split a locked slot into the target reservation and its siblings.
fn take_target(rows: Vec<Reservation>, id: &str) -> DomainResult<(Reservation, Vec<Reservation>)> {
    let (mut target, siblings): (Vec<_>, Vec<_>) = rows.into_iter().partition(|r| r.id == id);
    let target = target
        .pop()
        .ok_or_else(|| DomainError::reservation_not_found(id))?;
    Ok((target, siblings))
}

/// Write back a reservation read at `r.version`, bumping the version.
async fn write_guarded<C: ConnectionTrait>(conn: &C, r: &Reservation) -> DomainResult<Reservation> {
    let mut next = r.clone();
    next.version = r.version + 1;

    let mut am = to_active(&next);
    am.id = NotSet;

    let res = reservation::Entity::update_many()
        .set(am)
        .filter(Column::Id.eq(r.id.as_str()))
        .filter(Column::Version.eq(r.version))
        .exec(conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::SlotUnavailable(format!("slot {} is already booked", r.slot_key()))
            } else {
                DomainError::from(e)
            }
        })?;

    if res.rows_affected == 0 {
        return Err(DomainError::Conflict(format!(
            "reservation {} changed since version {}",
            r.id, r.version
        )));
    }
    Ok(next)
}

// ── ReservationRepository impl ──────────────────────────────────

#[async_trait]
impl ReservationRepository for SeaOrmReservationRepository {
    async fn insert(&self, r: Reservation) -> DomainResult<()> {
        debug!("Saving reservation: {} ({})", r.id, r.reference_code);

        reservation::Entity::insert(to_active(&r))
            .exec_without_returning(&self.db)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DomainError::Conflict(format!("reservation {} already exists", r.id))
                } else {
                    DomainError::from(e)
                }
            })?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Reservation>> {
        let model = reservation::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;
        Ok(model.map(model_to_domain))
    }

    async fn find_by_order_id(&self, order_id: &str) -> DomainResult<Option<Reservation>> {
        let model = reservation::Entity::find()
            .filter(Column::ProviderOrderId.eq(order_id))
            .order_by_desc(Column::CreatedAt)
            .one(&self.db)
            .await?;
        Ok(model.map(model_to_domain))
    }

    async fn find_for_slot(&self, slot: &SlotKey) -> DomainResult<Vec<Reservation>> {
        let models = reservation::Entity::find()
            .filter(slot_condition(slot))
            .order_by_asc(Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(model_to_domain).collect())
    }

    async fn find_live_for_date(
        &self,
        resource_id: &str,
        date: NaiveDate,
    ) -> DomainResult<Vec<Reservation>> {
        let models = reservation::Entity::find()
            .filter(Column::ResourceId.eq(resource_id))
            .filter(Column::BookingDate.eq(date))
            .filter(Column::Status.is_in([
                BookingState::Pending,
                BookingState::AwaitingConfirmation,
                BookingState::Confirmed,
            ]))
            .order_by_asc(Column::StartTime)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(model_to_domain).collect())
    }

    async fn find_stale_pending(
        &self,
        created_before: DateTime<Utc>,
    ) -> DomainResult<Vec<Reservation>> {
        let models = reservation::Entity::find()
            .filter(Column::Status.eq(BookingState::Pending))
            .filter(Column::CreatedAt.lt(created_before))
            .order_by_asc(Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(model_to_domain).collect())
    }

    async fn find_payment_timed_out(&self, now: DateTime<Utc>) -> DomainResult<Vec<Reservation>> {
        let models = reservation::Entity::find()
            .filter(Column::Status.eq(BookingState::AwaitingConfirmation))
            .filter(
                Condition::any()
                    .add(Column::LockExpiresAt.lte(now))
                    .add(Column::LockExpiresAt.is_null()),
            )
            .order_by_asc(Column::LockExpiresAt)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(model_to_domain).collect())
    }

    async fn apply_change(
        &self,
        id: &str,
        change: ReservationChange,
        now: DateTime<Utc>,
    ) -> DomainResult<(Reservation, Transition)> {
        let txn = self.begin_write(id, None).await?;

        let mut r = lock_by_id(&txn, id).await?;
        let transition = change.apply(&mut r, now)?;
        let stored = if transition.applied() {
            write_guarded(&txn, &r).await?
        } else {
            r
        };

        txn.commit().await?;
        debug!(
            "Reservation {} {}: {:?} (status {})",
            id,
            change.name(),
            transition,
            stored.status
        );
        Ok((stored, transition))
    }

    async fn claim_for_payment(
        &self,
        id: &str,
        order_id: &str,
        now: DateTime<Utc>,
        lock: Duration,
    ) -> DomainResult<Reservation> {
        let txn = self
            .begin_write(id, Some(IsolationLevel::Serializable))
            .await
            .map_err(|e| claim_error(id, e))?;

        let claimed = async {
            let slot = read_by_id(&txn, id).await?.slot_key();
            let (mut r, competitors) = take_target(lock_slot(&txn, &slot).await?, id)?;

            if let Some(blocker) = competitors.iter().find(|s| s.blocks_payment()) {
                return Err(DomainError::SlotUnavailable(format!(
                    "slot {} is held by reservation {} ({})",
                    slot, blocker.id, blocker.status
                )));
            }

            r.begin_payment(order_id, now, lock)?;
            write_guarded(&txn, &r).await
        }
        .await;

        let outcome = match claimed {
            Ok(r) => txn.commit().await.map(|_| r).map_err(DomainError::from),
            Err(e) => Err(e),
        };

        outcome.map_err(|e| claim_error(id, e))
    }

    async fn confirm_and_expire_siblings(
        &self,
        id: &str,
        payment_id: &str,
        method: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<ConfirmOutcome> {
        let txn = self
            .begin_write(id, None)
            .await
            .map_err(|e| confirm_error(id, e))?;

        let confirmed = async {
            let slot = read_by_id(&txn, id).await?.slot_key();
            let (mut r, siblings) = take_target(lock_slot(&txn, &slot).await?, id)?;

            if r.confirm_payment(payment_id, method, now)? == Transition::Unchanged {
                return Ok(ConfirmOutcome::AlreadyConfirmed(r));
            }
            let confirmed = write_guarded(&txn, &r).await?;

            let mut expired_siblings = Vec::with_capacity(siblings.len());
            for mut sibling in siblings {
                if sibling.expire(now).applied() {
                    write_guarded(&txn, &sibling).await?;
                    expired_siblings.push(sibling.id);
                }
            }
            Ok(ConfirmOutcome::Confirmed {
                reservation: confirmed,
                expired_siblings,
            })
        }
        .await;

        let outcome = match confirmed {
            Ok(outcome) => txn.commit().await.map(|_| outcome).map_err(DomainError::from),
            Err(e) => Err(e),
        };

        let outcome = outcome.map_err(|e| confirm_error(id, e))?;

        if let ConfirmOutcome::Confirmed {
            expired_siblings, ..
        } = &outcome
        {
            debug!(
                "Reservation {} confirmed with payment {}; expired {} sibling(s)",
                id,
                payment_id,
                expired_siblings.len()
            );
        }
        Ok(outcome)
    }

    async fn anonymize_owner(&self, user_id: &str, now: DateTime<Utc>) -> DomainResult<u64> {
        let res = reservation::Entity::update_many()
            .col_expr(Column::UserId, Expr::value(Option::<String>::None))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .col_expr(Column::Version, Expr::col(Column::Version).add(1))
            .filter(Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::reservation::{PaymentStatus, ReservationStatus};
    use crate::domain::resource::{OperatingHours, Resource, ResourceRepository};
    use crate::infrastructure::database::repositories::resource_repository::SeaOrmResourceRepository;
    use crate::infrastructure::database::{init_database, run_migrations, DatabaseConfig};
    use chrono::{NaiveTime, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 14, 10, 0, 0).unwrap()
    }

    fn slot() -> SlotKey {
        SlotKey::new(
            "court-1",
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        )
    }

    fn pending(id: &str, created_at: DateTime<Utc>) -> Reservation {
        Reservation::new_pending(
            id,
            format!("BK-250115-{}", id.to_uppercase()),
            &slot(),
            Some("user-1".into()),
            PriceBreakdown::full(50_000),
            created_at,
        )
    }

    async fn setup() -> SeaOrmReservationRepository {
        let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&db).await.unwrap();
        let hours = OperatingHours::new(
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            60,
            50_000,
        );
        SeaOrmResourceRepository::new(db.clone())
            .save(Resource::new("court-1", "Court 1", hours))
            .await
            .unwrap();
        SeaOrmReservationRepository::new(db)
    }

    #[tokio::test]
    async fn test_insert_and_find_round_trip() {
        let repo = setup().await;
        repo.insert(pending("r1", t0())).await.unwrap();

        let found = repo.find_by_id("r1").await.unwrap().unwrap();
        assert_eq!(found.status, ReservationStatus::Pending);
        assert_eq!(found.payment_status, PaymentStatus::NotStarted);
        assert_eq!(found.slot_key(), slot());
        assert_eq!(found.price.total, 50_000);
        assert_eq!(found.version, 0);

        assert!(repo.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_moves_to_awaiting_and_bumps_version() {
        let repo = setup().await;
        repo.insert(pending("r1", t0())).await.unwrap();

        let claimed = repo
            .claim_for_payment("r1", "order_1", t0(), Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(claimed.status, ReservationStatus::AwaitingConfirmation);
        assert_eq!(claimed.payment_status, PaymentStatus::InProgress);
        assert_eq!(claimed.version, 1);
        assert_eq!(claimed.lock_expires_at, Some(t0() + Duration::minutes(10)));

        let by_order = repo.find_by_order_id("order_1").await.unwrap().unwrap();
        assert_eq!(by_order.id, "r1");
    }

    #[tokio::test]
    async fn test_claim_rejected_when_sibling_in_progress() {
        let repo = setup().await;
        repo.insert(pending("r1", t0())).await.unwrap();
        repo.insert(pending("r2", t0())).await.unwrap();

        repo.claim_for_payment("r1", "order_1", t0(), Duration::minutes(10))
            .await
            .unwrap();
        let err = repo
            .claim_for_payment("r2", "order_2", t0(), Duration::minutes(10))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::SlotUnavailable(_)));

        let r2 = repo.find_by_id("r2").await.unwrap().unwrap();
        assert_eq!(r2.status, ReservationStatus::Pending);
        assert_eq!(r2.version, 0);
    }

    #[tokio::test]
    async fn test_confirm_expires_siblings() {
        let repo = setup().await;
        repo.insert(pending("r1", t0())).await.unwrap();
        repo.insert(pending("r2", t0())).await.unwrap();
        repo.claim_for_payment("r1", "order_1", t0(), Duration::minutes(10))
            .await
            .unwrap();

        let outcome = repo
            .confirm_and_expire_siblings("r1", "pay_1", Some("upi".into()), t0())
            .await
            .unwrap();
        match outcome {
            ConfirmOutcome::Confirmed {
                reservation,
                expired_siblings,
            } => {
                assert_eq!(reservation.status, ReservationStatus::Confirmed);
                assert_eq!(reservation.payment_method.as_deref(), Some("upi"));
                assert_eq!(expired_siblings, vec!["r2".to_string()]);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let r2 = repo.find_by_id("r2").await.unwrap().unwrap();
        assert_eq!(r2.status, ReservationStatus::Expired);

        // Re-delivery is a no-op
        let again = repo
            .confirm_and_expire_siblings("r1", "pay_1", None, t0())
            .await
            .unwrap();
        assert!(matches!(again, ConfirmOutcome::AlreadyConfirmed(_)));
    }

    #[tokio::test]
    async fn test_second_confirmed_row_rejected_by_unique_index() {
        let repo = setup().await;
        let mut a = pending("r1", t0());
        a.confirm_payment("pay_a", None, t0()).unwrap();
        repo.insert(a).await.unwrap();

        repo.insert(pending("r2", t0())).await.unwrap();
        let err = repo
            .confirm_and_expire_siblings("r2", "pay_b", None, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::SlotUnavailable(_)));
        let r2 = repo.find_by_id("r2").await.unwrap().unwrap();
        assert_eq!(r2.status, ReservationStatus::Pending);
    }

    #[test]
    fn test_lock_contention_maps_to_domain_errors() {
        for msg in [
            "error returned from database: (code: 5) database is locked",
            "error returned from database: deadlock detected",
            "could not serialize access due to concurrent update",
        ] {
            assert!(is_lock_contention(msg), "{msg}");
            assert!(matches!(
                claim_error("r1", DomainError::Storage(msg.into())),
                DomainError::SlotUnavailable(_)
            ));
            assert!(matches!(
                confirm_error("r1", DomainError::Storage(msg.into())),
                DomainError::Conflict(_)
            ));
        }
        assert!(matches!(
            claim_error("r1", DomainError::Storage("disk I/O error".into())),
            DomainError::Storage(_)
        ));
    }

    #[tokio::test]
    async fn test_stale_version_is_a_conflict() {
        let repo = setup().await;
        repo.insert(pending("r1", t0())).await.unwrap();
        let mut stale = repo.find_by_id("r1").await.unwrap().unwrap();

        repo.apply_change("r1", ReservationChange::Cancel, t0())
            .await
            .unwrap();

        stale.expire(t0());
        let err = write_guarded(&repo.db, &stale).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_sweep_queries() {
        let repo = setup().await;
        repo.insert(pending("old", t0() - Duration::minutes(30)))
            .await
            .unwrap();
        repo.insert(pending("fresh", t0())).await.unwrap();

        let stale = repo
            .find_stale_pending(t0() - Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, "old");

        repo.claim_for_payment("fresh", "order_f", t0(), Duration::minutes(10))
            .await
            .unwrap();
        assert!(repo.find_payment_timed_out(t0()).await.unwrap().is_empty());
        let timed_out = repo
            .find_payment_timed_out(t0() + Duration::minutes(11))
            .await
            .unwrap();
        assert_eq!(timed_out.len(), 1);
        assert_eq!(timed_out[0].id, "fresh");
    }

    #[tokio::test]
    async fn test_anonymize_owner() {
        let repo = setup().await;
        repo.insert(pending("r1", t0())).await.unwrap();
        repo.insert(pending("r2", t0())).await.unwrap();

        assert_eq!(repo.anonymize_owner("user-1", t0()).await.unwrap(), 2);
        let r1 = repo.find_by_id("r1").await.unwrap().unwrap();
        assert!(r1.user_id.is_none());
        assert_eq!(r1.version, 1);
        assert_eq!(r1.reference_code, "BK-250115-R1");
        assert_eq!(repo.anonymize_owner("user-1", t0()).await.unwrap(), 0);
    }
}

//! Reservation requests, cancellation and owner anonymization

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::{info, warn};

use super::BookingPolicy;
use crate::application::notifications::NotificationQueue;
use crate::domain::events::{Event, ReservationCancelledEvent};
use crate::domain::reservation::{
    PriceBreakdown, Reservation, ReservationChange, ReservationStatus,
};
use crate::domain::slot::{find_slot, slot_start_on, SlotKey};
use crate::domain::{DomainError, DomainResult, RepositoryProvider};
use crate::infrastructure::crypto::generate_reference_code;

/// A user's request for one slot.
#[derive(Debug, Clone)]
pub struct CreateReservation {
    pub resource_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub user_id: Option<String>,
}

pub struct BookingService {
    repos: Arc<dyn RepositoryProvider>,
    queue: NotificationQueue,
    policy: BookingPolicy,
}

impl BookingService {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        queue: NotificationQueue,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            repos,
            queue,
            policy,
        }
    }

    /// Persist a PENDING reservation for one of the resource's generated
    /// slots. Several PENDING reservations may exist for the same slot; only
    /// an already BOOKED slot is refused.
    pub async fn create_reservation(
        &self,
        request: CreateReservation,
        now: DateTime<Utc>,
    ) -> DomainResult<Reservation> {
        let resource = self
            .repos
            .resources()
            .find_by_id(&request.resource_id)
            .await?
            .ok_or_else(|| DomainError::NotFound {
                entity: "Resource",
                field: "id",
                value: request.resource_id.clone(),
            })?;

        if !resource.hours.enabled {
            return Err(DomainError::Validation(format!(
                "resource {} is not accepting bookings",
                resource.id
            )));
        }
        if request.date < now.date_naive() {
            return Err(DomainError::Validation(format!(
                "booking date {} is in the past",
                request.date
            )));
        }

        let slot = find_slot(Some(&resource.hours), request.start_time, request.end_time)
            .ok_or_else(|| {
                DomainError::Validation(format!(
                    "{}-{} is not a bookable slot for {}",
                    request.start_time.format("%H:%M"),
                    request.end_time.format("%H:%M"),
                    resource.id
                ))
            })?;
        if slot_start_on(&resource.hours, request.date, &slot) <= now.naive_utc() {
            return Err(DomainError::Validation(format!(
                "slot {} on {} has already started",
                slot.label, request.date
            )));
        }

        let key = SlotKey::new(
            resource.id.clone(),
            request.date,
            slot.start_time,
            slot.end_time,
        );
        let existing = self.repos.reservations().find_for_slot(&key).await?;
        if existing
            .iter()
            .any(|r| r.status == ReservationStatus::Confirmed)
        {
            return Err(DomainError::SlotUnavailable(format!(
                "slot {} is already booked",
                key
            )));
        }

        let (online, venue_due) = resource.split_price(slot.price);
        let price = PriceBreakdown {
            total: slot.price,
            online,
            venue_due,
        };

        let reservation = Reservation::new_pending(
            uuid::Uuid::new_v4().to_string(),
            generate_reference_code(&self.policy.reference_prefix, request.date),
            &key,
            request.user_id,
            price,
            now,
        );
        self.repos.reservations().insert(reservation.clone()).await?;

        info!(
            reservation_id = %reservation.id,
            reference = %reservation.reference_code,
            slot = %key,
            total = price.total,
            "Reservation created"
        );
        Ok(reservation)
    }

    pub async fn get(&self, id: &str) -> DomainResult<Reservation> {
        self.repos
            .reservations()
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::reservation_not_found(id))
    }

    /// Cancel a non-terminal reservation on behalf of its owner or an admin.
    pub async fn cancel_reservation(&self, id: &str, now: DateTime<Utc>) -> DomainResult<Reservation> {
        let (reservation, transition) = self
            .repos
            .reservations()
            .apply_change(id, ReservationChange::Cancel, now)
            .await?;

        if transition.applied() {
            info!(reservation_id = %id, "Reservation cancelled by owner");
            if reservation.provider_order_id.is_some() {
                warn!(
                    reservation_id = %id,
                    order_id = ?reservation.provider_order_id,
                    "Cancelled reservation had a provider order; a late capture will be orphaned"
                );
            }
            self.queue
                .enqueue(Event::ReservationCancelled(ReservationCancelledEvent {
                    reservation_id: reservation.id.clone(),
                    reason: "owner_cancelled".into(),
                    timestamp: now,
                }));
        }
        Ok(reservation)
    }

    /// Privacy erasure: drop the owner reference from all of a user's
    /// reservations. Booking facts are kept.
    pub async fn anonymize_owner(&self, user_id: &str, now: DateTime<Utc>) -> DomainResult<u64> {
        let count = self.repos.reservations().anonymize_owner(user_id, now).await?;
        info!(count, "Anonymized reservation owner");
        Ok(count)
    }
}

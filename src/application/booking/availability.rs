//! Slot availability classification
//!
//! Availability reads run without row locks: a stale answer only surfaces
//! later as a retryable `SlotUnavailable`, never as a double confirmation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::reservation::{Reservation, ReservationStatus};
use crate::domain::slot::{generate_slots_with_limit, GeneratedSlot, SlotKey};
use crate::domain::{DomainError, DomainResult, RepositoryProvider, Resource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotAvailability {
    Available,
    /// Another reservation is awaiting payment confirmation with a live lock
    Held,
    /// A CONFIRMED reservation exists
    Booked,
}

impl SlotAvailability {
    /// Classify a slot from the reservations recorded for it.
    pub fn classify<'a>(
        reservations: impl IntoIterator<Item = &'a Reservation>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut held = false;
        for r in reservations {
            if r.status == ReservationStatus::Confirmed {
                return SlotAvailability::Booked;
            }
            held |= r.holds_slot(now);
        }
        if held {
            SlotAvailability::Held
        } else {
            SlotAvailability::Available
        }
    }
}

/// One generated slot with its availability.
#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    #[serde(flatten)]
    pub slot: GeneratedSlot,
    pub availability: SlotAvailability,
}

pub struct AvailabilityChecker {
    repos: Arc<dyn RepositoryProvider>,
    max_slots_per_day: usize,
}

impl AvailabilityChecker {
    pub fn new(repos: Arc<dyn RepositoryProvider>, max_slots_per_day: usize) -> Self {
        Self {
            repos,
            max_slots_per_day,
        }
    }

    pub(crate) async fn resource(&self, resource_id: &str) -> DomainResult<Resource> {
        self.repos
            .resources()
            .find_by_id(resource_id)
            .await?
            .ok_or_else(|| DomainError::NotFound {
                entity: "Resource",
                field: "id",
                value: resource_id.to_string(),
            })
    }

    /// Classify a single `(resource, date, start, end)` window.
    pub async fn slot_status(
        &self,
        resource_id: &str,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        now: DateTime<Utc>,
    ) -> DomainResult<SlotAvailability> {
        let key = SlotKey::new(resource_id, date, start_time, end_time);
        let reservations = self.repos.reservations().find_for_slot(&key).await?;
        Ok(SlotAvailability::classify(&reservations, now))
    }

    /// Full slot sequence for a resource and date, annotated with
    /// availability. A disabled resource yields an empty list.
    pub async fn list_slots(
        &self,
        resource_id: &str,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<SlotView>> {
        let resource = self.resource(resource_id).await?;
        let slots = generate_slots_with_limit(Some(&resource.hours), self.max_slots_per_day);
        if slots.is_empty() {
            return Ok(Vec::new());
        }

        let live = self
            .repos
            .reservations()
            .find_live_for_date(resource_id, date)
            .await?;
        let mut by_window: HashMap<(NaiveTime, NaiveTime), Vec<&Reservation>> = HashMap::new();
        for r in &live {
            by_window
                .entry((r.start_time, r.end_time))
                .or_default()
                .push(r);
        }

        Ok(slots
            .into_iter()
            .map(|slot| {
                let availability = by_window
                    .get(&(slot.start_time, slot.end_time))
                    .map_or(SlotAvailability::Available, |rs| {
                        SlotAvailability::classify(rs.iter().copied(), now)
                    });
                SlotView { slot, availability }
            })
            .collect())
    }
}

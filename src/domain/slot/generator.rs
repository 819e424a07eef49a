//! On-the-fly slot generation
//!
//! Slots are never stored. They are derived from a resource's operating
//! hours every time availability is queried; a slot's identity is its
//! `(resource, date, start, end)` tuple.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;

use crate::domain::resource::OperatingHours;

/// Safety bound against misconfiguration (e.g. 1-minute slots over 24h).
pub const MAX_SLOTS_PER_DAY: usize = 500;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// A derived, non-persisted bookable window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedSlot {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: u32,
    /// e.g. `"06:00 - 07:00"`
    pub label: String,
    /// Minor currency units
    pub price: i64,
    /// Position within the day, starting at 0
    pub ordinal: usize,
}

impl GeneratedSlot {
    /// True when the slot starts before midnight and ends after it.
    pub fn ends_next_day(&self) -> bool {
        self.end_time <= self.start_time
    }
}

/// Identity of a slot on a given resource and date.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub resource_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl SlotKey {
    pub fn new(
        resource_id: impl Into<String>,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            date,
            start_time,
            end_time,
        }
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{} {}-{}",
            self.resource_id,
            self.date,
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}

/// When `slot` starts if booked for `date`.
///
/// `date` names the operating day: in a window that wraps past midnight,
/// slots starting before `opens_at` fall on the following calendar day.
pub fn slot_start_on(hours: &OperatingHours, date: NaiveDate, slot: &GeneratedSlot) -> NaiveDateTime {
    let start = date.and_time(slot.start_time);
    if hours.wraps_midnight() && slot.start_time < hours.opens_at {
        start + Duration::days(1)
    } else {
        start
    }
}

fn minutes_of_day(t: NaiveTime) -> u32 {
    t.num_seconds_from_midnight() / 60
}

/// Total open minutes, accounting for a window that wraps past midnight.
pub fn open_minutes(hours: &OperatingHours) -> u32 {
    let open = minutes_of_day(hours.opens_at);
    let close = minutes_of_day(hours.closes_at);
    if close <= open {
        (MINUTES_PER_DAY - open) + close
    } else {
        close - open
    }
}

/// Generate the ordered slot sequence for an operating-hours config.
///
/// Disabled or missing configuration yields no slots.
pub fn generate_slots(hours: Option<&OperatingHours>) -> Vec<GeneratedSlot> {
    generate_slots_with_limit(hours, MAX_SLOTS_PER_DAY)
}

/// Like [`generate_slots`] but stops silently after `limit` slots.
pub fn generate_slots_with_limit(hours: Option<&OperatingHours>, limit: usize) -> Vec<GeneratedSlot> {
    let Some(hours) = hours else {
        return Vec::new();
    };
    if !hours.enabled || hours.slot_minutes == 0 {
        return Vec::new();
    }

    let step = Duration::minutes(i64::from(hours.slot_minutes));
    let count = (open_minutes(hours) / hours.slot_minutes) as usize;

    let mut slots = Vec::with_capacity(count.min(limit));
    let mut start = hours.opens_at;
    for ordinal in 0..count.min(limit) {
        // NaiveTime addition wraps at midnight
        let (end, _) = start.overflowing_add_signed(step);
        slots.push(GeneratedSlot {
            start_time: start,
            end_time: end,
            duration_minutes: hours.slot_minutes,
            label: format!("{} - {}", start.format("%H:%M"), end.format("%H:%M")),
            price: hours.base_price,
            ordinal,
        });
        start = end;
    }
    slots
}

/// Find the generated slot matching an exact `(start, end)` window.
pub fn find_slot(
    hours: Option<&OperatingHours>,
    start_time: NaiveTime,
    end_time: NaiveTime,
) -> Option<GeneratedSlot> {
    generate_slots(hours)
        .into_iter()
        .find(|s| s.start_time == start_time && s.end_time == end_time)
}

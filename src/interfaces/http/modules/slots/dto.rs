//! Slot listing DTOs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::application::{SlotAvailability, SlotView};

#[derive(Debug, Deserialize, IntoParams)]
pub struct SlotsQuery {
    /// Booking date (YYYY-MM-DD)
    pub date: NaiveDate,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SlotDto {
    /// HH:MM
    pub start_time: String,
    /// HH:MM; earlier than `start_time` when the slot crosses midnight
    pub end_time: String,
    pub duration_minutes: u32,
    pub label: String,
    /// Minor currency units
    pub price: i64,
    pub ordinal: usize,
    pub availability: SlotAvailability,
}

impl From<SlotView> for SlotDto {
    fn from(v: SlotView) -> Self {
        Self {
            start_time: v.slot.start_time.format("%H:%M").to_string(),
            end_time: v.slot.end_time.format("%H:%M").to_string(),
            duration_minutes: v.slot.duration_minutes,
            label: v.slot.label,
            price: v.slot.price,
            ordinal: v.slot.ordinal,
            availability: v.availability,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DaySlotsResponse {
    pub resource_id: String,
    #[schema(value_type = String, format = Date)]
    pub date: NaiveDate,
    pub slots: Vec<SlotDto>,
}

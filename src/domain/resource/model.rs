//! Resource domain entity

use chrono::{DateTime, NaiveTime, Utc};

/// Operating-hours configuration of a bookable resource.
///
/// `closes_at <= opens_at` means the window runs past midnight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatingHours {
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    /// Slot length in minutes, must be > 0
    pub slot_minutes: u32,
    /// Price of one slot in minor currency units
    pub base_price: i64,
    pub enabled: bool,
}

impl OperatingHours {
    pub fn new(opens_at: NaiveTime, closes_at: NaiveTime, slot_minutes: u32, base_price: i64) -> Self {
        Self {
            opens_at,
            closes_at,
            slot_minutes,
            base_price,
            enabled: true,
        }
    }

    /// Whether the configured window wraps past midnight.
    pub fn wraps_midnight(&self) -> bool {
        self.closes_at <= self.opens_at
    }
}

/// A bookable unit, e.g. one court.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: String,
    pub venue_id: Option<String>,
    pub name: String,
    pub hours: OperatingHours,
    /// Share of the price paid online, in percent (1..=100).
    /// `None` means the full price is paid online.
    pub advance_percent: Option<u8>,
    pub created_at: DateTime<Utc>,
}

impl Resource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, hours: OperatingHours) -> Self {
        Self {
            id: id.into(),
            venue_id: None,
            name: name.into(),
            hours,
            advance_percent: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_advance_percent(mut self, percent: u8) -> Self {
        self.advance_percent = Some(percent);
        self
    }

    /// Split `total` into (online, at venue).
    ///
    /// Without an advance percentage the whole amount is due online.
    pub fn split_price(&self, total: i64) -> (i64, i64) {
        match self.advance_percent {
            Some(p) if (1..100).contains(&p) => {
                let online = total * i64::from(p) / 100;
                (online, total - online)
            }
            _ => (total, 0),
        }
    }
}

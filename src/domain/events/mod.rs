//! Domain events
//!
//! Event types that represent facts about what happened to reservations.
//! The queue that carries them lives in `application::notifications`.

pub mod types;

pub use types::{
    Event, EventMessage, PaymentOrphanedEvent, ReservationCancelledEvent,
    ReservationConfirmedEvent, ReservationExpiredEvent,
};

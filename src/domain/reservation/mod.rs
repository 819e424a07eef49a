//! Reservation aggregate
//!
//! Contains the Reservation entity, its state machine, and the repository
//! interface.

pub mod model;
pub mod repository;

pub use model::{
    OrderPrecheck, PaymentStatus, PriceBreakdown, Reservation, ReservationStatus, Transition,
};
pub use repository::{ConfirmOutcome, ReservationChange, ReservationRepository};

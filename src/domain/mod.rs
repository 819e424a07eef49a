pub mod events;
pub mod repositories;
pub mod reservation;
pub mod resource;
pub mod slot;

// Re-export commonly used types
pub use repositories::{DomainResult, RepositoryProvider};
pub use reservation::{PaymentStatus, PriceBreakdown, Reservation, ReservationStatus};
pub use resource::{OperatingHours, Resource};
pub use slot::{GeneratedSlot, SlotKey};

// Re-export DomainError from shared for convenience
pub use crate::shared::errors::DomainError;

//! Database entities module

pub mod reservation;
pub mod resource;

pub use reservation::Entity as Reservation;
pub use resource::Entity as Resource;

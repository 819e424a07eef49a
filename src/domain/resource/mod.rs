//! Resource aggregate
//!
//! A bookable unit and its operating-hours configuration.

pub mod model;
pub mod repository;

pub use model::{OperatingHours, Resource};
pub use repository::ResourceRepository;

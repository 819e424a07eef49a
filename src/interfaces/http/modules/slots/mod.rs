//! Derived slot listing per resource and date

pub mod dto;
pub mod handlers;

pub use dto::*;
pub use handlers::*;

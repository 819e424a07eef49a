//! Payment verification, provider webhooks and provider lookups

pub mod dto;
pub mod handlers;

pub use dto::*;
pub use handlers::*;

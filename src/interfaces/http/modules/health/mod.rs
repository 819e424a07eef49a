//! Liveness and readiness checks

pub mod handlers;

pub use handlers::*;

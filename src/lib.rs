//! # Courtbook
//!
//! Booking core for time-slot resources (courts, lanes, rooms): slots are
//! derived on the fly from operating hours, reservations move through a
//! payment-backed state machine, and a booking is confirmed only by the
//! payment provider's webhook.
//!
//! ## Architecture
//!
//! - **domain**: slots, reservations and their state machines, events,
//!   repository traits
//! - **application**: booking use cases, expiry sweeps, notification queue
//! - **infrastructure**: SeaORM persistence, payment provider adapters,
//!   signatures and reference codes
//! - **interfaces**: REST API with Swagger documentation
//! - **shared**: error taxonomy, retry, graceful shutdown

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod shared;

pub use config::{default_config_path, AppConfig};

pub use infrastructure::database::repositories::SeaOrmRepositoryProvider;
pub use infrastructure::{init_database, run_migrations, DatabaseConfig};

pub use interfaces::http::create_api_router;

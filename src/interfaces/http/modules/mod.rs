pub mod health;
pub mod metrics;
pub mod payments;
pub mod request_id;
pub mod reservations;
pub mod slots;

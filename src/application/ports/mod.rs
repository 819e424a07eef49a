//! Application ports (hexagonal architecture boundaries)
//!
//! Outbound interfaces the booking use cases depend on. Adapters live in
//! `infrastructure` (payment providers) and `application::notifications`
//! (the default logging notifier).

pub mod notifier;
pub mod payment;

pub use notifier::{Notifier, NotifyError};
pub use payment::{CreateOrderRequest, PaymentProvider, ProviderOrder, ProviderPayment};

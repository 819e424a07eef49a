//! Payment provider adapters

pub mod http;
pub mod mock;

pub use http::{HttpPaymentProvider, HttpProviderConfig, PaymentProviderError};
pub use mock::{MockPaymentProvider, SignedWebhook};

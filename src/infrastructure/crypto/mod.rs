//! Cryptographic helpers

pub mod reference;
pub mod signature;

pub use reference::generate_reference_code;
pub use signature::{sign_hex, verify_payment_signature, verify_webhook_signature};

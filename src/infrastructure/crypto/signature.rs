//! HMAC-SHA256 signatures used by the payment provider
//!
//! Webhooks are signed over the raw request body with the webhook secret.
//! Client-side checkout results are signed over `"{order_id}|{payment_id}"`
//! with the API key secret. Signatures travel as lowercase hex.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn keyed(secret: &str) -> Option<HmacSha256> {
    if secret.is_empty() {
        return None;
    }
    HmacSha256::new_from_slice(secret.as_bytes()).ok()
}

/// Hex HMAC-SHA256 of `payload`. `None` for an empty secret.
pub fn sign_hex(secret: &str, payload: &[u8]) -> Option<String> {
    let mut mac = keyed(secret)?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature over `payload`.
pub fn verify_hex(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(mut mac) = keyed(secret) else {
        return false;
    };
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Verify a webhook delivery against the raw body bytes.
pub fn verify_webhook_signature(webhook_secret: &str, raw_body: &[u8], signature: &str) -> bool {
    verify_hex(webhook_secret, raw_body, signature)
}

/// Payload signed by the provider's checkout for a completed payment.
pub fn payment_signature_payload(order_id: &str, payment_id: &str) -> String {
    format!("{}|{}", order_id, payment_id)
}

/// Verify the signature a client received from checkout.
pub fn verify_payment_signature(
    key_secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    let payload = payment_signature_payload(order_id, payment_id);
    verify_hex(key_secret, payload.as_bytes(), signature)
}

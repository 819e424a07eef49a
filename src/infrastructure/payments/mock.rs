//! In-process payment provider for local runs and tests
//!
//! Orders and payments live in memory. `capture` and `fail` simulate the
//! checkout completing and return the signed webhook the real provider
//! would deliver.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use serde_json::json;

use crate::application::ports::{CreateOrderRequest, PaymentProvider, ProviderOrder, ProviderPayment};
use crate::domain::{DomainError, DomainResult};
use crate::infrastructure::crypto::sign_hex;

/// A webhook delivery: raw body and its signature header value.
#[derive(Debug, Clone)]
pub struct SignedWebhook {
    pub body: Vec<u8>,
    pub signature: String,
}

pub struct MockPaymentProvider {
    webhook_secret: String,
    orders: DashMap<String, ProviderOrder>,
    payments: DashMap<String, ProviderPayment>,
    sequence: AtomicU64,
    fail_next_create: AtomicBool,
}

impl MockPaymentProvider {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            orders: DashMap::new(),
            payments: DashMap::new(),
            sequence: AtomicU64::new(0),
            fail_next_create: AtomicBool::new(false),
        }
    }

    /// Make the next `create_order` call fail with a provider error.
    pub fn fail_next_create_order(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    /// Number of orders created so far
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}_{:014X}", prefix, n)
    }

    /// Simulate a successful capture for `order_id`.
    pub fn capture(&self, order_id: &str, method: &str) -> DomainResult<SignedWebhook> {
        let payment = self.record_payment(order_id, "captured", method)?;
        if let Some(mut order) = self.orders.get_mut(order_id) {
            order.status = "paid".into();
            order.amount_paid = payment.amount;
        }
        self.webhook("payment.captured", &payment)
    }

    /// Simulate a declined payment for `order_id`.
    pub fn fail(&self, order_id: &str, method: &str) -> DomainResult<SignedWebhook> {
        let payment = self.record_payment(order_id, "failed", method)?;
        if let Some(mut order) = self.orders.get_mut(order_id) {
            order.status = "attempted".into();
        }
        self.webhook("payment.failed", &payment)
    }

    fn record_payment(&self, order_id: &str, status: &str, method: &str) -> DomainResult<ProviderPayment> {
        let order = self
            .orders
            .get(order_id)
            .map(|o| o.clone())
            .ok_or_else(|| DomainError::Provider(format!("unknown order {}", order_id)))?;
        let payment = ProviderPayment {
            id: self.next_id("pay"),
            order_id: Some(order.id.clone()),
            amount: order.amount,
            currency: order.currency.clone(),
            status: status.into(),
            method: Some(method.into()),
            captured: status == "captured",
        };
        self.payments.insert(payment.id.clone(), payment.clone());
        Ok(payment)
    }

    /// Build and sign a webhook body for `payment`.
    pub fn webhook(&self, event: &str, payment: &ProviderPayment) -> DomainResult<SignedWebhook> {
        let body = json!({
            "entity": "event",
            "event": event,
            "payload": {
                "payment": {
                    "entity": payment,
                }
            }
        })
        .to_string()
        .into_bytes();
        let signature = sign_hex(&self.webhook_secret, &body)
            .ok_or_else(|| DomainError::Validation("webhook secret is empty".into()))?;
        Ok(SignedWebhook { body, signature })
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_order(&self, request: CreateOrderRequest) -> DomainResult<ProviderOrder> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(DomainError::Provider("mock provider unavailable".into()));
        }
        let order = ProviderOrder {
            id: self.next_id("order"),
            amount: request.amount,
            amount_paid: 0,
            currency: request.currency,
            receipt: Some(request.receipt),
            status: "created".into(),
        };
        debug!("Mock order {} for {}", order.id, order.amount);
        self.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &str) -> DomainResult<ProviderOrder> {
        self.orders
            .get(order_id)
            .map(|o| o.clone())
            .ok_or_else(|| DomainError::NotFound {
                entity: "ProviderOrder",
                field: "id",
                value: order_id.to_string(),
            })
    }

    async fn fetch_payment(&self, payment_id: &str) -> DomainResult<ProviderPayment> {
        self.payments
            .get(payment_id)
            .map(|p| p.clone())
            .ok_or_else(|| DomainError::NotFound {
                entity: "ProviderPayment",
                field: "id",
                value: payment_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::crypto::verify_webhook_signature;
    use std::collections::BTreeMap;

    fn request() -> CreateOrderRequest {
        CreateOrderRequest {
            amount: 50_000,
            currency: "INR".into(),
            receipt: "BK-250115-ABC123".into(),
            payment_capture: true,
            notes: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_create_and_capture() {
        let mock = MockPaymentProvider::new("whsec");
        let order = mock.create_order(request()).await.unwrap();
        assert!(order.id.starts_with("order_"));
        assert_eq!(order.status, "created");

        let hook = mock.capture(&order.id, "upi").unwrap();
        assert!(verify_webhook_signature("whsec", &hook.body, &hook.signature));

        let body: serde_json::Value = serde_json::from_slice(&hook.body).unwrap();
        assert_eq!(body["event"], "payment.captured");
        let payment_id = body["payload"]["payment"]["entity"]["id"].as_str().unwrap();
        let payment = mock.fetch_payment(payment_id).await.unwrap();
        assert_eq!(payment.order_id.as_deref(), Some(order.id.as_str()));
        assert!(payment.captured);

        let order = mock.fetch_order(&order.id).await.unwrap();
        assert_eq!(order.status, "paid");
        assert_eq!(order.amount_paid, 50_000);
    }

    #[tokio::test]
    async fn test_fail_next_create() {
        let mock = MockPaymentProvider::new("whsec");
        mock.fail_next_create_order();
        assert!(matches!(
            mock.create_order(request()).await,
            Err(DomainError::Provider(_))
        ));
        assert!(mock.create_order(request()).await.is_ok());
        assert_eq!(mock.order_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let mock = MockPaymentProvider::new("whsec");
        assert!(matches!(
            mock.fetch_order("order_x").await,
            Err(DomainError::NotFound { .. })
        ));
        assert!(mock.capture("order_x", "card").is_err());
    }
}

//! Outbound port to the payment provider
//!
//! Amounts are integers in minor currency units (paise, cents).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::DomainResult;

/// Body of a create-order call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub amount: i64,
    pub currency: String,
    /// Merchant-side reference, the reservation's reference code
    pub receipt: String,
    /// Capture automatically once authorized
    pub payment_capture: bool,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
}

/// An order as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProviderOrder {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_paid: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    /// `created`, `attempted` or `paid`
    pub status: String,
}

/// A payment as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProviderPayment {
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    /// `created`, `authorized`, `captured`, `refunded` or `failed`
    pub status: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub captured: bool,
}

/// Payment provider client, constructed once at startup and injected.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Short provider name for logs and metrics
    fn name(&self) -> &'static str;

    async fn create_order(&self, request: CreateOrderRequest) -> DomainResult<ProviderOrder>;

    async fn fetch_order(&self, order_id: &str) -> DomainResult<ProviderOrder>;

    async fn fetch_payment(&self, payment_id: &str) -> DomainResult<ProviderPayment>;
}

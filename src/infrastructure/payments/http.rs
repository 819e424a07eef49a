//! HTTP client for a Razorpay-compatible payment API

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::application::ports::{CreateOrderRequest, PaymentProvider, ProviderOrder, ProviderPayment};
use crate::domain::{DomainError, DomainResult};

/// Connection settings for the provider API.
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// API root, e.g. `"https://api.razorpay.com"`
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
    pub timeout: Duration,
}

/// Errors that can occur when talking to the provider.
#[derive(Debug, Error)]
pub enum PaymentProviderError {
    /// Transport, timeout or body decoding failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-success status
    #[error("Provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl From<PaymentProviderError> for DomainError {
    fn from(e: PaymentProviderError) -> Self {
        DomainError::Provider(e.to_string())
    }
}

/// Razorpay error envelope: `{"error": {"code": "...", "description": "..."}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpPaymentProvider {
    config: HttpProviderConfig,
    http: Client,
}

impl HttpPaymentProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self, PaymentProviderError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.basic_auth(&self.config.key_id, Some(&self.config.key_secret))
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, PaymentProviderError> {
        let response = self.authed(req).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorEnvelope>(&text) {
                Ok(env) => format!(
                    "{}: {}",
                    env.error.code.unwrap_or_else(|| "ERROR".into()),
                    env.error.description.unwrap_or_default()
                ),
                Err(_) => text,
            };
            return Err(PaymentProviderError::Rejected { status, message });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn create_order(&self, request: CreateOrderRequest) -> DomainResult<ProviderOrder> {
        debug!(
            "Creating provider order: receipt={} amount={} {}",
            request.receipt, request.amount, request.currency
        );
        let req = self.http.post(self.url("orders")).json(&request);
        Ok(self.send(req).await?)
    }

    async fn fetch_order(&self, order_id: &str) -> DomainResult<ProviderOrder> {
        let req = self.http.get(self.url(&format!("orders/{}", order_id)));
        Ok(self.send(req).await?)
    }

    async fn fetch_payment(&self, payment_id: &str) -> DomainResult<ProviderPayment> {
        let req = self.http.get(self.url(&format!("payments/{}", payment_id)));
        Ok(self.send(req).await?)
    }
}

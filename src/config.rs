//! Application configuration
//!
//! Loaded from a TOML file (default `~/.config/courtbook/config.toml`).
//! Every section and key is optional; missing values fall back to the
//! defaults below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::BookingPolicy;
use crate::infrastructure::{DatabaseConfig, HttpProviderConfig};
use crate::shared::errors::InfraError;

/// Env var that overrides the config file location
pub const CONFIG_ENV_VAR: &str = "COURTBOOK_CONFIG";

/// Default config path: `~/.config/courtbook/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("courtbook")
        .join("config.toml")
}

/// Config path from `COURTBOOK_CONFIG`, else the default location.
pub fn resolve_config_path() -> PathBuf {
    std::env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_config_path())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub logging: LoggingSection,
    pub booking: BookingSection,
    pub payment: PaymentSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub api_host: String,
    pub api_port: u16,
    /// Seconds to wait for background tasks on shutdown
    pub shutdown_timeout: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            api_host: "0.0.0.0".to_string(),
            api_port: 8080,
            shutdown_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// `sqlite://...` or `postgres://...`
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        let d = DatabaseConfig::default();
        Self {
            url: d.url,
            max_connections: d.max_connections,
            connect_timeout_secs: d.connect_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `EnvFilter` directive, e.g. `info` or `courtbook=debug,info`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingSection {
    pub pending_grace_minutes: u32,
    pub payment_lock_minutes: u32,
    pub sweep_interval_secs: u64,
    pub max_slots_per_day: usize,
    pub reference_prefix: String,
}

impl Default for BookingSection {
    fn default() -> Self {
        Self {
            pending_grace_minutes: 5,
            payment_lock_minutes: 10,
            sweep_interval_secs: 60,
            max_slots_per_day: crate::domain::slot::MAX_SLOTS_PER_DAY,
            reference_prefix: "BK".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// In-process provider, for development and tests
    Mock,
    /// Razorpay-compatible HTTP API
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentSection {
    pub provider: ProviderKind,
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    pub currency: String,
    pub request_timeout_secs: u64,
}

impl Default for PaymentSection {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Mock,
            base_url: "https://api.razorpay.com".to_string(),
            key_id: String::new(),
            key_secret: String::new(),
            webhook_secret: String::new(),
            currency: "INR".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// Load from `path`. A missing file yields defaults; an unreadable or
    /// malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, InfraError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| InfraError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, InfraError> {
        toml::from_str(raw).map_err(|e| InfraError::Config(e.to_string()))
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), InfraError> {
        let b = &self.booking;
        if b.pending_grace_minutes == 0 {
            return Err(InfraError::Config("booking.pending_grace_minutes must be > 0".into()));
        }
        if b.payment_lock_minutes == 0 {
            return Err(InfraError::Config("booking.payment_lock_minutes must be > 0".into()));
        }
        if b.sweep_interval_secs == 0 {
            return Err(InfraError::Config("booking.sweep_interval_secs must be > 0".into()));
        }
        if b.max_slots_per_day == 0 {
            return Err(InfraError::Config("booking.max_slots_per_day must be > 0".into()));
        }
        if b.reference_prefix.trim().is_empty() {
            return Err(InfraError::Config("booking.reference_prefix must not be empty".into()));
        }
        if self.database.url.trim().is_empty() {
            return Err(InfraError::Config("database.url must not be empty".into()));
        }

        let p = &self.payment;
        if p.currency.len() != 3 {
            return Err(InfraError::Config(format!(
                "payment.currency must be an ISO 4217 code, got {:?}",
                p.currency
            )));
        }
        if p.provider == ProviderKind::Http {
            if p.webhook_secret.is_empty() {
                return Err(InfraError::Config(
                    "payment.webhook_secret is required for the http provider".into(),
                ));
            }
            if p.key_id.is_empty() || p.key_secret.is_empty() {
                return Err(InfraError::Config(
                    "payment.key_id and payment.key_secret are required for the http provider"
                        .into(),
                ));
            }
            if p.request_timeout_secs == 0 {
                return Err(InfraError::Config("payment.request_timeout_secs must be > 0".into()));
            }
        }
        Ok(())
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.database.url.clone(),
            max_connections: self.database.max_connections,
            connect_timeout_secs: self.database.connect_timeout_secs,
        }
    }

    pub fn booking_policy(&self) -> BookingPolicy {
        BookingPolicy {
            pending_grace: chrono::Duration::minutes(self.booking.pending_grace_minutes.into()),
            payment_lock: chrono::Duration::minutes(self.booking.payment_lock_minutes.into()),
            max_slots_per_day: self.booking.max_slots_per_day,
            reference_prefix: self.booking.reference_prefix.clone(),
            currency: self.payment.currency.clone(),
        }
    }

    pub fn provider_config(&self) -> HttpProviderConfig {
        HttpProviderConfig {
            base_url: self.payment.base_url.clone(),
            key_id: self.payment.key_id.clone(),
            key_secret: self.payment.key_secret.clone(),
            timeout: Duration::from_secs(self.payment.request_timeout_secs),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.booking.sweep_interval_secs)
    }

    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.server.api_host, self.server.api_port)
    }
}

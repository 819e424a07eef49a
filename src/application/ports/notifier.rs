//! Outbound port to the notification collaborator

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::events::EventMessage;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// Delivery failed but may succeed later
    #[error("Notification delivery failed: {0}")]
    Transient(String),

    /// Delivery can never succeed for this message
    #[error("Notification rejected: {0}")]
    Rejected(String),
}

impl NotifyError {
    pub fn is_transient(&self) -> bool {
        matches!(self, NotifyError::Transient(_))
    }
}

/// Delivers booking events to users (SMS, email, push, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &EventMessage) -> Result<(), NotifyError>;
}

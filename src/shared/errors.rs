use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Validation: {0}")]
    Validation(String),

    /// Another reservation holds or has paid for the same slot.
    #[error("Slot unavailable: {0}")]
    SlotUnavailable(String),

    #[error("Reservation {0} is already confirmed")]
    AlreadyConfirmed(String),

    #[error("Reservation {id} is no longer valid (status: {status})")]
    NoLongerValid { id: String, status: String },

    /// The pending grace window or payment lock has elapsed.
    #[error("Reservation {0} has expired")]
    Expired(String),

    #[error("Payment provider error: {0}")]
    Provider(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Optimistic write lost against a concurrent writer.
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Storage(String),
}

impl DomainError {
    /// Whether this error is likely transient (e.g. DB connection lost)
    /// and the operation may succeed if retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::Storage(_) | DomainError::Conflict(_))
    }

    /// Whether the user can recover by picking another slot or retrying
    /// the request themselves.
    pub fn is_retryable_by_user(&self) -> bool {
        matches!(
            self,
            DomainError::SlotUnavailable(_) | DomainError::Conflict(_) | DomainError::Provider(_)
        )
    }

    pub fn reservation_not_found(id: &str) -> Self {
        DomainError::NotFound {
            entity: "Reservation",
            field: "id",
            value: id.to_string(),
        }
    }
}

impl From<sea_orm::DbErr> for DomainError {
    fn from(e: sea_orm::DbErr) -> Self {
        DomainError::Storage(e.to_string())
    }
}

/// Startup-time errors outside the booking domain.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_and_conflict_are_transient() {
        assert!(DomainError::Storage("timeout".into()).is_transient());
        assert!(DomainError::Conflict("version".into()).is_transient());
        assert!(!DomainError::Expired("r1".into()).is_transient());
        assert!(!DomainError::InvalidSignature.is_transient());
    }

    #[test]
    fn slot_unavailable_is_user_retryable() {
        assert!(DomainError::SlotUnavailable("taken".into()).is_retryable_by_user());
        assert!(!DomainError::AlreadyConfirmed("r1".into()).is_retryable_by_user());
        assert!(!DomainError::Validation("bad".into()).is_retryable_by_user());
    }

    #[test]
    fn not_found_message_names_entity() {
        let e = DomainError::reservation_not_found("abc");
        assert_eq!(e.to_string(), "Not found: Reservation with id=abc");
    }
}

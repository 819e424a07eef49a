//! Repository traits for the domain layer
//!
//! Contains:
//! - `RepositoryProvider`: unified access to all per-aggregate repositories
//! - `DomainResult`: standard result type for domain operations

use super::reservation::ReservationRepository;
use super::resource::ResourceRepository;
use crate::shared::errors::DomainError;

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

/// Provides access to all domain repositories.
///
/// ```ignore
/// async fn handle(repos: &dyn RepositoryProvider) {
///     let court = repos.resources().find_by_id("court-1").await?;
///     let r = repos.reservations().find_by_order_id("order_9A").await?;
/// }
/// ```
pub trait RepositoryProvider: Send + Sync {
    fn resources(&self) -> &dyn ResourceRepository;
    fn reservations(&self) -> &dyn ReservationRepository;
}

//! SeaORM implementation of RepositoryProvider

use sea_orm::DatabaseConnection;

use crate::domain::repositories::RepositoryProvider;
use crate::domain::reservation::ReservationRepository;
use crate::domain::resource::ResourceRepository;

use super::reservation_repository::SeaOrmReservationRepository;
use super::resource_repository::SeaOrmResourceRepository;

/// Unified repository provider backed by SeaORM.
///
/// Holds one connection pool and exposes per-aggregate repository accessors.
///
/// ```ignore
/// let repos = SeaOrmRepositoryProvider::new(db.clone());
/// let court = repos.resources().find_by_id("court-1").await?;
/// let pending = repos.reservations().find_stale_pending(cutoff).await?;
/// ```
pub struct SeaOrmRepositoryProvider {
    resources: SeaOrmResourceRepository,
    reservations: SeaOrmReservationRepository,
}

impl SeaOrmRepositoryProvider {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            resources: SeaOrmResourceRepository::new(db.clone()),
            reservations: SeaOrmReservationRepository::new(db),
        }
    }
}

impl RepositoryProvider for SeaOrmRepositoryProvider {
    fn resources(&self) -> &dyn ResourceRepository {
        &self.resources
    }

    fn reservations(&self) -> &dyn ReservationRepository {
        &self.reservations
    }
}

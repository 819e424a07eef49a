//! Resource repository interface

use async_trait::async_trait;

use super::model::Resource;
use crate::domain::DomainResult;

#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Insert or replace a resource
    async fn save(&self, resource: Resource) -> DomainResult<()>;

    /// Find resource by ID
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Resource>>;
}

//! SeaORM implementation of ResourceRepository

use async_trait::async_trait;
use log::debug;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};

use crate::domain::resource::{OperatingHours, Resource, ResourceRepository};
use crate::domain::{DomainError, DomainResult};
use crate::infrastructure::database::entities::resource::{self, Column};

pub struct SeaOrmResourceRepository {
    db: DatabaseConnection,
}

impl SeaOrmResourceRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn model_to_domain(m: resource::Model) -> Resource {
    Resource {
        id: m.id,
        venue_id: m.venue_id,
        name: m.name,
        hours: OperatingHours {
            opens_at: m.opens_at,
            closes_at: m.closes_at,
            slot_minutes: u32::try_from(m.slot_minutes).unwrap_or(0),
            base_price: m.base_price,
            enabled: m.enabled,
        },
        advance_percent: m.advance_percent.and_then(|p| u8::try_from(p).ok()),
        created_at: m.created_at,
    }
}

#[async_trait]
impl ResourceRepository for SeaOrmResourceRepository {
    async fn save(&self, r: Resource) -> DomainResult<()> {
        debug!("Saving resource: {}", r.id);

        let slot_minutes = i32::try_from(r.hours.slot_minutes).map_err(|_| {
            DomainError::Validation(format!("slot length {} out of range", r.hours.slot_minutes))
        })?;

        let model = resource::ActiveModel {
            id: Set(r.id),
            venue_id: Set(r.venue_id),
            name: Set(r.name),
            opens_at: Set(r.hours.opens_at),
            closes_at: Set(r.hours.closes_at),
            slot_minutes: Set(slot_minutes),
            base_price: Set(r.hours.base_price),
            enabled: Set(r.hours.enabled),
            advance_percent: Set(r.advance_percent.map(i16::from)),
            created_at: Set(r.created_at),
        };

        resource::Entity::insert(model)
            .on_conflict(
                OnConflict::column(Column::Id)
                    .update_columns([
                        Column::VenueId,
                        Column::Name,
                        Column::OpensAt,
                        Column::ClosesAt,
                        Column::SlotMinutes,
                        Column::BasePrice,
                        Column::Enabled,
                        Column::AdvancePercent,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Resource>> {
        let model = resource::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;
        Ok(model.map(model_to_domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::{init_database, run_migrations, DatabaseConfig};
    use chrono::NaiveTime;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn test_save_is_an_upsert() {
        let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&db).await.unwrap();
        let repo = SeaOrmResourceRepository::new(db);

        let hours = OperatingHours::new(hm(6, 0), hm(22, 0), 60, 50_000);
        let court = Resource::new("court-1", "Court 1", hours);
        repo.save(court.clone()).await.unwrap();

        let found = repo.find_by_id("court-1").await.unwrap().unwrap();
        assert_eq!(found.hours, court.hours);
        assert_eq!(found.advance_percent, None);

        let updated = Resource {
            name: "Centre Court".into(),
            ..court.with_advance_percent(30)
        };
        repo.save(updated).await.unwrap();

        let found = repo.find_by_id("court-1").await.unwrap().unwrap();
        assert_eq!(found.name, "Centre Court");
        assert_eq!(found.advance_percent, Some(30));
        assert!(repo.find_by_id("court-2").await.unwrap().is_none());
    }
}

//! Bookable resource entity (one court, one lane, ...)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "resources")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(nullable)]
    pub venue_id: Option<String>,

    pub name: String,

    /// Operating hours; `closes_at <= opens_at` wraps past midnight
    pub opens_at: Time,
    pub closes_at: Time,
    pub slot_minutes: i32,

    /// Minor currency units per slot
    pub base_price: i64,

    pub enabled: bool,

    /// Online share of the price in percent
    #[sea_orm(nullable)]
    pub advance_percent: Option<i16>,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::reservation::Entity")]
    Reservations,
}

impl Related<super::reservation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reservations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

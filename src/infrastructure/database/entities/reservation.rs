//! Reservation entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::reservation::{PaymentStatus, ReservationStatus};

/// Booking status column
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum BookingState {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "AWAITING_CONFIRMATION")]
    AwaitingConfirmation,
    #[sea_orm(string_value = "CONFIRMED")]
    Confirmed,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
    #[sea_orm(string_value = "EXPIRED")]
    Expired,
}

impl From<ReservationStatus> for BookingState {
    fn from(s: ReservationStatus) -> Self {
        match s {
            ReservationStatus::Pending => Self::Pending,
            ReservationStatus::AwaitingConfirmation => Self::AwaitingConfirmation,
            ReservationStatus::Confirmed => Self::Confirmed,
            ReservationStatus::Cancelled => Self::Cancelled,
            ReservationStatus::Expired => Self::Expired,
        }
    }
}

impl From<BookingState> for ReservationStatus {
    fn from(s: BookingState) -> Self {
        match s {
            BookingState::Pending => Self::Pending,
            BookingState::AwaitingConfirmation => Self::AwaitingConfirmation,
            BookingState::Confirmed => Self::Confirmed,
            BookingState::Cancelled => Self::Cancelled,
            BookingState::Expired => Self::Expired,
        }
    }
}

/// Payment status column
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum PaymentState {
    #[sea_orm(string_value = "NOT_STARTED")]
    NotStarted,
    #[sea_orm(string_value = "IN_PROGRESS")]
    InProgress,
    #[sea_orm(string_value = "SUCCESS")]
    Success,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

impl From<PaymentStatus> for PaymentState {
    fn from(s: PaymentStatus) -> Self {
        match s {
            PaymentStatus::NotStarted => Self::NotStarted,
            PaymentStatus::InProgress => Self::InProgress,
            PaymentStatus::Success => Self::Success,
            PaymentStatus::Failed => Self::Failed,
        }
    }
}

impl From<PaymentState> for PaymentStatus {
    fn from(s: PaymentState) -> Self {
        match s {
            PaymentState::NotStarted => Self::NotStarted,
            PaymentState::InProgress => Self::InProgress,
            PaymentState::Success => Self::Success,
            PaymentState::Failed => Self::Failed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reservations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique)]
    pub reference_code: String,

    pub resource_id: String,
    pub booking_date: Date,
    pub start_time: Time,
    pub end_time: Time,

    /// Nulled on owner anonymization
    #[sea_orm(nullable)]
    pub user_id: Option<String>,

    /// Amounts in minor currency units
    pub total_amount: i64,
    pub online_amount: i64,
    pub venue_due_amount: i64,

    pub status: BookingState,
    pub payment_status: PaymentState,

    #[sea_orm(nullable)]
    pub provider_order_id: Option<String>,
    #[sea_orm(nullable)]
    pub provider_payment_id: Option<String>,
    #[sea_orm(nullable)]
    pub payment_method: Option<String>,

    pub payment_initiated_at: Option<DateTimeUtc>,
    pub payment_completed_at: Option<DateTimeUtc>,
    pub lock_expires_at: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,

    /// Optimistic concurrency token
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::resource::Entity",
        from = "Column::ResourceId",
        to = "super::resource::Column::Id"
    )]
    Resource,
}

impl Related<super::resource::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Resource.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

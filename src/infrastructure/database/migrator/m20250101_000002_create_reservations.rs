//! Create reservations table
//!
//! Besides the lookup indexes, a partial unique index guarantees at most one
//! CONFIRMED reservation per (resource, date, start, end).

use sea_orm_migration::prelude::*;

use super::m20250101_000001_create_resources::Resources;

const CONFIRMED_SLOT_INDEX: &str = "uq_reservations_confirmed_slot";

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Reservations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Reservations::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Reservations::ReferenceCode)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Reservations::ResourceId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Reservations::BookingDate).date().not_null())
                    .col(ColumnDef::new(Reservations::StartTime).time().not_null())
                    .col(ColumnDef::new(Reservations::EndTime).time().not_null())
                    .col(ColumnDef::new(Reservations::UserId).string())
                    .col(
                        ColumnDef::new(Reservations::TotalAmount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Reservations::OnlineAmount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Reservations::VenueDueAmount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Reservations::Status)
                            .string_len(32)
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(
                        ColumnDef::new(Reservations::PaymentStatus)
                            .string_len(16)
                            .not_null()
                            .default("NOT_STARTED"),
                    )
                    .col(ColumnDef::new(Reservations::ProviderOrderId).string())
                    .col(ColumnDef::new(Reservations::ProviderPaymentId).string())
                    .col(ColumnDef::new(Reservations::PaymentMethod).string())
                    .col(ColumnDef::new(Reservations::PaymentInitiatedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Reservations::PaymentCompletedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Reservations::LockExpiresAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Reservations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Reservations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Reservations::Version)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_reservations_resource")
                            .from(Reservations::Table, Reservations::ResourceId)
                            .to(Resources::Table, Resources::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reservations_slot")
                    .table(Reservations::Table)
                    .col(Reservations::ResourceId)
                    .col(Reservations::BookingDate)
                    .col(Reservations::StartTime)
                    .col(Reservations::EndTime)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reservations_status_created")
                    .table(Reservations::Table)
                    .col(Reservations::Status)
                    .col(Reservations::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reservations_status_lock")
                    .table(Reservations::Table)
                    .col(Reservations::Status)
                    .col(Reservations::LockExpiresAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reservations_provider_order")
                    .table(Reservations::Table)
                    .col(Reservations::ProviderOrderId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reservations_user")
                    .table(Reservations::Table)
                    .col(Reservations::UserId)
                    .to_owned(),
            )
            .await?;

        // Partial indexes are not expressible through the index builder;
        // SQLite and PostgreSQL share this syntax.
        manager
            .get_connection()
            .execute_unprepared(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {CONFIRMED_SLOT_INDEX} \
                 ON reservations (resource_id, booking_date, start_time, end_time) \
                 WHERE status = 'CONFIRMED'"
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(&format!("DROP INDEX IF EXISTS {CONFIRMED_SLOT_INDEX}"))
            .await?;
        manager
            .drop_table(Table::drop().table(Reservations::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Reservations {
    Table,
    Id,
    ReferenceCode,
    ResourceId,
    BookingDate,
    StartTime,
    EndTime,
    UserId,
    TotalAmount,
    OnlineAmount,
    VenueDueAmount,
    Status,
    PaymentStatus,
    ProviderOrderId,
    ProviderPaymentId,
    PaymentMethod,
    PaymentInitiatedAt,
    PaymentCompletedAt,
    LockExpiresAt,
    CreatedAt,
    UpdatedAt,
    Version,
}

use sea_orm_migration::{prelude::*, schema::*};

use super::m20261001_000002_create_drivers::Driver;
use super::m20261001_000003_create_delivery_orders::DeliveryOrder;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DriverRejection::Table)
                    .if_not_exists()
                    .col(uuid(DriverRejection::Id).primary_key())
                    .col(uuid(DriverRejection::DriverId).not_null())
                    .col(uuid(DriverRejection::OrderId).not_null())
                    .col(string_null(DriverRejection::Reason))
                    .col(
                        timestamp_with_time_zone(DriverRejection::RejectedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_driver_rejection_driver")
                            .from(DriverRejection::Table, DriverRejection::DriverId)
                            .to(Driver::Table, Driver::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_driver_rejection_order")
                            .from(DriverRejection::Table, DriverRejection::OrderId)
                            .to(DeliveryOrder::Table, DeliveryOrder::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DriverRejection::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum DriverRejection {
    Table,
    Id,
    DriverId,
    OrderId,
    Reason,
    RejectedAt,
}

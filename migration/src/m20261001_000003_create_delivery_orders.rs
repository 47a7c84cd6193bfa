use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20261001_000002_create_drivers::Driver;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(OrderStatus::Enum)
                    .values([
                        OrderStatus::Paid,
                        OrderStatus::Preparing,
                        OrderStatus::Offered,
                        OrderStatus::Assigned,
                        OrderStatus::OutForDelivery,
                        OrderStatus::Delivered,
                        OrderStatus::Cancelled,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DeliveryOrder::Table)
                    .if_not_exists()
                    .col(uuid(DeliveryOrder::Id).primary_key())
                    .col(
                        ColumnDef::new(DeliveryOrder::Status)
                            .custom(OrderStatus::Enum)
                            .not_null(),
                    )
                    .col(double_null(DeliveryOrder::DeliveryLat))
                    .col(double_null(DeliveryOrder::DeliveryLng))
                    .col(double(DeliveryOrder::DeliveryFee).not_null().default(0.0))
                    .col(double(DeliveryOrder::DeliveryDistanceKm).not_null().default(0.0))
                    .col(uuid_null(DeliveryOrder::DriverId))
                    .col(
                        timestamp_with_time_zone(DeliveryOrder::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_delivery_order_driver")
                            .from(DeliveryOrder::Table, DeliveryOrder::DriverId)
                            .to(Driver::Table, Driver::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Busy-driver lookups filter on status
        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_order_status")
                    .table(DeliveryOrder::Table)
                    .col(DeliveryOrder::Status)
                    .to_owned(),
            )
            .await?;

        // A driver holds at most one live order
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX idx_delivery_order_one_live_per_driver \
                 ON delivery_order (driver_id) \
                 WHERE status IN ('offered', 'assigned', 'out_for_delivery')",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeliveryOrder::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(OrderStatus::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum DeliveryOrder {
    Table,
    Id,
    Status,
    DeliveryLat,
    DeliveryLng,
    DeliveryFee,
    DeliveryDistanceKm,
    DriverId,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum OrderStatus {
    #[sea_orm(iden = "order_status")]
    Enum,
    #[sea_orm(iden = "paid")]
    Paid,
    #[sea_orm(iden = "preparing")]
    Preparing,
    #[sea_orm(iden = "offered")]
    Offered,
    #[sea_orm(iden = "assigned")]
    Assigned,
    #[sea_orm(iden = "out_for_delivery")]
    OutForDelivery,
    #[sea_orm(iden = "delivered")]
    Delivered,
    #[sea_orm(iden = "cancelled")]
    Cancelled,
}

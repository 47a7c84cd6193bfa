use sea_orm_migration::{prelude::*, schema::*};

use super::m20261001_000001_create_restaurants::Restaurant;
use super::m20261001_000003_create_delivery_orders::DeliveryOrder;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OrderPickup::Table)
                    .if_not_exists()
                    .col(uuid(OrderPickup::Id).primary_key())
                    .col(uuid(OrderPickup::OrderId).not_null())
                    .col(uuid(OrderPickup::RestaurantId).not_null())
                    .col(integer(OrderPickup::Position).not_null().default(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_pickup_order")
                            .from(OrderPickup::Table, OrderPickup::OrderId)
                            .to(DeliveryOrder::Table, DeliveryOrder::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_pickup_restaurant")
                            .from(OrderPickup::Table, OrderPickup::RestaurantId)
                            .to(Restaurant::Table, Restaurant::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OrderPickup::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum OrderPickup {
    Table,
    Id,
    OrderId,
    RestaurantId,
    Position,
}

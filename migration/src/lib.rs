pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_restaurants;
mod m20261001_000002_create_drivers;
mod m20261001_000003_create_delivery_orders;
mod m20261001_000004_create_order_pickups;
mod m20261001_000005_create_driver_rejections;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_restaurants::Migration),
            Box::new(m20261001_000002_create_drivers::Migration),
            Box::new(m20261001_000003_create_delivery_orders::Migration),
            Box::new(m20261001_000004_create_order_pickups::Migration),
            Box::new(m20261001_000005_create_driver_rejections::Migration),
        ]
    }
}

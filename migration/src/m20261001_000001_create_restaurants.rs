use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Restaurant::Table)
                    .if_not_exists()
                    .col(uuid(Restaurant::Id).primary_key())
                    .col(string_len(Restaurant::Name, 100).not_null())
                    .col(double_null(Restaurant::Lat))
                    .col(double_null(Restaurant::Lng))
                    .to_owned(),
            )
            .await?;

        // Seed restaurants in central Harare
        let insert = Query::insert()
            .into_table(Restaurant::Table)
            .columns([Restaurant::Id, Restaurant::Name, Restaurant::Lat, Restaurant::Lng])
            .values_panic([
                Expr::cust("gen_random_uuid()"),
                "KFC Zimbabwe".into(),
                (-17.8252).into(),
                (31.0335).into(),
            ])
            .values_panic([
                Expr::cust("gen_random_uuid()"),
                "Nando's Harare".into(),
                (-17.8292).into(),
                (31.0522).into(),
            ])
            .values_panic([
                Expr::cust("gen_random_uuid()"),
                "Pizza Inn".into(),
                (-17.8310).into(),
                (31.0450).into(),
            ])
            .values_panic([
                Expr::cust("gen_random_uuid()"),
                "Ocean Basket".into(),
                (-17.8200).into(),
                (31.0290).into(),
            ])
            .to_owned();

        manager.exec_stmt(insert).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Restaurant::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Restaurant {
    Table,
    Id,
    Name,
    Lat,
    Lng,
}

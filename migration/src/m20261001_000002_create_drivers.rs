use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Driver::Table)
                    .if_not_exists()
                    .col(uuid(Driver::Id).primary_key())
                    .col(string_len(Driver::Name, 100).not_null())
                    .col(boolean(Driver::IsOnline).not_null().default(false))
                    .col(double_null(Driver::Lat))
                    .col(double_null(Driver::Lng))
                    .col(
                        timestamp_with_time_zone(Driver::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_driver_is_online")
                    .table(Driver::Table)
                    .col(Driver::IsOnline)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Driver::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Driver {
    Table,
    Id,
    Name,
    IsOnline,
    Lat,
    Lng,
    CreatedAt,
}

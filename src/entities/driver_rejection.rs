use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A driver declining (or timing out on) an offer; they are never offered
/// that order again.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "driver_rejection")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub driver_id: Uuid,
    pub order_id: Uuid,
    pub reason: Option<String>,
    pub rejected_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::driver::Entity",
        from = "Column::DriverId",
        to = "super::driver::Column::Id"
    )]
    Driver,
    #[sea_orm(
        belongs_to = "super::delivery_order::Entity",
        from = "Column::OrderId",
        to = "super::delivery_order::Column::Id"
    )]
    Order,
}

impl ActiveModelBehavior for ActiveModel {}

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dispatch::Coordinate;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "order_status")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "preparing")]
    Preparing,
    #[sea_orm(string_value = "offered")]
    Offered,
    #[sea_orm(string_value = "assigned")]
    Assigned,
    #[sea_orm(string_value = "out_for_delivery")]
    OutForDelivery,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    /// Statuses in which the order's driver can't take another one.
    pub const DRIVER_BUSY: [OrderStatus; 3] = [
        OrderStatus::Offered,
        OrderStatus::Assigned,
        OrderStatus::OutForDelivery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Paid => "paid",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Offered => "offered",
            OrderStatus::Assigned => "assigned",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delivery_order")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub status: OrderStatus,
    pub delivery_lat: Option<f64>,
    pub delivery_lng: Option<f64>,
    pub delivery_fee: f64,
    pub delivery_distance_km: f64,
    pub driver_id: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::driver::Entity",
        from = "Column::DriverId",
        to = "super::driver::Column::Id"
    )]
    Driver,
    #[sea_orm(has_many = "super::order_pickup::Entity")]
    Pickups,
}

impl Related<super::driver::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Driver.def()
    }
}

impl Related<super::order_pickup::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pickups.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn dropoff(&self) -> Option<Coordinate> {
        Coordinate::from_parts(self.delivery_lat, self.delivery_lng)
    }
}

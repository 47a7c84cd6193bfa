use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dispatch::{Coordinate, PickupPoint};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "restaurant")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_pickup::Entity")]
    Pickups,
}

impl Related<super::order_pickup::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pickups.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn pickup_point(&self) -> PickupPoint {
        PickupPoint {
            restaurant_id: self.id,
            location: Coordinate::from_parts(self.lat, self.lng),
        }
    }
}

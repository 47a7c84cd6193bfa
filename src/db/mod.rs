use sea_orm::{
    ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait, QueryFilter,
};
use uuid::Uuid;

use crate::config::Config;
use crate::dispatch::DriverCandidate;
use crate::entities::delivery_order::{self, OrderStatus};
use crate::entities::driver;
use crate::error::{AppError, AppResult};

pub async fn connect(config: &Config) -> AppResult<DatabaseConnection> {
    Database::connect(&config.database_url)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to connect to database: {}", e)))
}

/// Snapshot of every online driver, flagged available unless they already
/// hold an offered, assigned or in-flight order.
pub async fn driver_candidates<C: ConnectionTrait>(db: &C) -> AppResult<Vec<DriverCandidate>> {
    let busy: Vec<Uuid> = delivery_order::Entity::find()
        .filter(delivery_order::Column::Status.is_in(OrderStatus::DRIVER_BUSY))
        .all(db)
        .await?
        .into_iter()
        .filter_map(|o| o.driver_id)
        .collect();

    let drivers = driver::Entity::find()
        .filter(driver::Column::IsOnline.eq(true))
        .all(db)
        .await?;

    Ok(drivers.iter().map(|d| candidate_from(d, &busy)).collect())
}

/// A driver without a position fix is never available: straight-line distance
/// would put them on top of every pickup.
fn candidate_from(driver: &driver::Model, busy: &[Uuid]) -> DriverCandidate {
    let location = driver.location();
    DriverCandidate {
        driver_id: driver.id,
        location,
        available: location.is_some() && !busy.contains(&driver.id),
    }
}

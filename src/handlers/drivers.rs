use axum::{
    extract::{Path, Query, State},
    Json,
};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::db;
use crate::dispatch::{Coordinate, nearest_drivers};
use crate::entities::driver;
use crate::error::{AppError, AppResult};

const DEFAULT_NEARBY_LIMIT: usize = 5;

#[derive(Debug, Serialize)]
pub struct DriverStatusResponse {
    pub id: Uuid,
    pub is_online: bool,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl From<driver::Model> for DriverStatusResponse {
    fn from(d: driver::Model) -> Self {
        Self {
            id: d.id,
            is_online: d.is_online,
            lat: d.lat,
            lng: d.lng,
        }
    }
}

/// Driver app reports its current position
pub async fn update_location(
    State(state): State<AppState>,
    Path(driver_id): Path<Uuid>,
    Json(payload): Json<Coordinate>,
) -> AppResult<Json<DriverStatusResponse>> {
    if !payload.is_valid() {
        return Err(AppError::BadRequest(format!(
            "Invalid coordinate ({}, {})",
            payload.lat, payload.lng
        )));
    }

    let driver = find_driver(&state, driver_id).await?;
    let mut active: driver::ActiveModel = driver.into();
    active.lat = Set(Some(payload.lat));
    active.lng = Set(Some(payload.lng));

    let updated = active.update(&state.db).await?;
    tracing::debug!(%driver_id, lat = payload.lat, lng = payload.lng, "Driver location updated");

    Ok(Json(updated.into()))
}

#[derive(Debug, Deserialize)]
pub struct OnlineRequest {
    pub is_online: bool,
}

/// Driver goes on or off duty
pub async fn set_online(
    State(state): State<AppState>,
    Path(driver_id): Path<Uuid>,
    Json(payload): Json<OnlineRequest>,
) -> AppResult<Json<DriverStatusResponse>> {
    let driver = find_driver(&state, driver_id).await?;
    let mut active: driver::ActiveModel = driver.into();
    active.is_online = Set(payload.is_online);

    let updated = active.update(&state.db).await?;
    tracing::info!(%driver_id, is_online = payload.is_online, "Driver availability changed");

    Ok(Json(updated.into()))
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct NearbyDriver {
    pub driver_id: Uuid,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub distance_km: f64,
}

/// Available drivers closest to a point, nearest first
pub async fn nearby(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> AppResult<Json<Vec<NearbyDriver>>> {
    let target = Coordinate::new(query.lat, query.lng);
    if !target.is_valid() {
        return Err(AppError::BadRequest(format!(
            "Invalid coordinate ({}, {})",
            query.lat, query.lng
        )));
    }

    let candidates = db::driver_candidates(&state.db).await?;
    let limit = query.limit.unwrap_or(DEFAULT_NEARBY_LIMIT);

    let responses = nearest_drivers(target, &candidates, &[], limit)
        .into_iter()
        .map(|(c, distance_km)| NearbyDriver {
            driver_id: c.driver_id,
            lat: c.location.map(|l| l.lat),
            lng: c.location.map(|l| l.lng),
            distance_km,
        })
        .collect();

    Ok(Json(responses))
}

async fn find_driver(state: &AppState, driver_id: Uuid) -> AppResult<driver::Model> {
    driver::Entity::find_by_id(driver_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Driver not found".to_string()))
}

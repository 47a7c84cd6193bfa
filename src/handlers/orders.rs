use axum::{
    Json,
    extract::{Path, State},
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::db;
use crate::dispatch::fee::route_distance_km;
use crate::dispatch::geo::{estimate_eta_minutes, validate_restaurant_group};
use crate::dispatch::{
    Coordinate, DispatchPlan, DispatchRequest, DriverCandidate, PickupPoint, RoadDistances,
    distance_km,
};
use crate::entities::delivery_order::{self, OrderStatus};
use crate::entities::{driver, driver_rejection, order_pickup, restaurant};
use crate::error::{AppError, AppResult};
use crate::events::DispatchEvent;
use crate::scheduler::DispatchTimer;

/// Plans tried when the chosen driver is taken by a concurrent dispatch.
const MAX_ASSIGNMENT_ATTEMPTS: usize = 3;

#[derive(Debug, Deserialize)]
pub struct DriverActionRequest {
    pub driver_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub driver_id: Option<Uuid>,
}

/// Restaurant starts preparing: price the delivery and look for a driver
pub async fn mark_preparing(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<DispatchPlan>> {
    let order = find_order(&state, order_id).await?;

    if !matches!(order.status, OrderStatus::Paid | OrderStatus::Preparing) {
        return Err(AppError::Conflict(format!(
            "Order is already {}",
            order.status.as_str()
        )));
    }

    // Validate before the status changes so a bad order stays untouched
    let pickups = load_dispatchable_pickups(&state, order_id).await?;

    if order.status == OrderStatus::Paid {
        let moved = transition(
            &state.db,
            order_id,
            &[OrderStatus::Paid],
            None,
            OrderStatus::Preparing,
            false,
        )
        .await?;
        if !moved {
            return Err(AppError::Conflict("Order changed, try again".to_string()));
        }
        publish_status(&state, order_id, OrderStatus::Preparing);
    }

    let plan = dispatch_order(&state, &order, pickups, Vec::new(), 0).await?;
    Ok(Json(plan))
}

/// Driver takes the order they were offered
pub async fn accept_offer(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<DriverActionRequest>,
) -> AppResult<Json<OrderStatusResponse>> {
    let status = driver_step(
        &state,
        order_id,
        payload.driver_id,
        OrderStatus::Offered,
        OrderStatus::Assigned,
        "Offer expired or already taken",
    )
    .await?;
    tracing::info!(%order_id, driver_id = %payload.driver_id, "Driver accepted offer");
    Ok(Json(status))
}

/// Driver declines an offer; the order goes to the next nearest driver
pub async fn reject_offer(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<DriverActionRequest>,
) -> AppResult<Json<DispatchPlan>> {
    let excluded = release_order(
        &state,
        order_id,
        payload.driver_id,
        OrderStatus::Offered,
        payload.reason,
    )
    .await?
    .ok_or_else(|| AppError::Conflict("Offer expired or already taken".to_string()))?;

    tracing::info!(%order_id, driver_id = %payload.driver_id, "Driver rejected offer");
    let plan = redispatch(&state, order_id, excluded, 0).await?;
    Ok(Json(plan))
}

/// Driver drops an order they had accepted; it is offered to someone else
pub async fn driver_cancel(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<DriverActionRequest>,
) -> AppResult<Json<DispatchPlan>> {
    let excluded = release_order(
        &state,
        order_id,
        payload.driver_id,
        OrderStatus::Assigned,
        payload.reason,
    )
    .await?
    .ok_or_else(|| AppError::Conflict("No such order assigned to this driver".to_string()))?;

    tracing::info!(%order_id, driver_id = %payload.driver_id, "Driver cancelled assignment");
    let plan = redispatch(&state, order_id, excluded, 0).await?;
    Ok(Json(plan))
}

/// Driver has collected every pickup and is heading to the customer
pub async fn mark_picked_up(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<DriverActionRequest>,
) -> AppResult<Json<OrderStatusResponse>> {
    let status = driver_step(
        &state,
        order_id,
        payload.driver_id,
        OrderStatus::Assigned,
        OrderStatus::OutForDelivery,
        "Order is not assigned to this driver",
    )
    .await?;
    Ok(Json(status))
}

/// Driver handed the order over; frees the driver for the next one
pub async fn mark_delivered(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<DriverActionRequest>,
) -> AppResult<Json<OrderStatusResponse>> {
    let status = driver_step(
        &state,
        order_id,
        payload.driver_id,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        "Order is not out for delivery with this driver",
    )
    .await?;
    tracing::info!(%order_id, driver_id = %payload.driver_id, "Order delivered");
    Ok(Json(status))
}

/// Cancel an order that no driver has accepted yet
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderStatusResponse>> {
    let cancelled = transition(
        &state.db,
        order_id,
        &[OrderStatus::Paid, OrderStatus::Preparing, OrderStatus::Offered],
        None,
        OrderStatus::Cancelled,
        true,
    )
    .await?;

    if !cancelled {
        return Err(AppError::Conflict(
            "Order can no longer be cancelled".to_string(),
        ));
    }

    tracing::info!(%order_id, "Order cancelled");
    publish_status(&state, order_id, OrderStatus::Cancelled);
    Ok(Json(OrderStatusResponse {
        order_id,
        status: OrderStatus::Cancelled,
        driver_id: None,
    }))
}

#[derive(Debug, Serialize)]
pub struct EtaResponse {
    pub order_id: Uuid,
    pub eta_minutes: Option<u32>,
    pub distance_km: Option<f64>,
    pub message: Option<String>,
}

/// Estimated minutes until the order reaches the customer
pub async fn order_eta(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<EtaResponse>> {
    let order = find_order(&state, order_id).await?;

    let Some(driver_id) = order.driver_id else {
        return Ok(Json(EtaResponse {
            order_id,
            eta_minutes: None,
            distance_km: None,
            message: Some("No driver assigned".to_string()),
        }));
    };

    let driver_location = driver::Entity::find_by_id(driver_id)
        .one(&state.db)
        .await?
        .and_then(|d| d.location());

    let distance = if order.status == OrderStatus::OutForDelivery {
        distance_km(driver_location, order.dropoff())
    } else {
        let pickups = load_pickups(&state, order_id).await?;
        let first = pickups.first().and_then(|p| p.location);
        distance_km(driver_location, first) + route_distance_km(&pickups, order.dropoff())
    };

    Ok(Json(EtaResponse {
        order_id,
        eta_minutes: Some(estimate_eta_minutes(distance, state.planner.average_speed_kmh)),
        distance_km: Some((distance * 100.0).round() / 100.0),
        message: None,
    }))
}

/// An offer went unanswered: take it back and offer the order to the next
/// driver. Does nothing if the driver answered in the meantime.
pub(crate) async fn expire_offer(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
) -> AppResult<()> {
    let released = release_order(
        state,
        order_id,
        driver_id,
        OrderStatus::Offered,
        Some("Offer expired".to_string()),
    )
    .await?;

    let Some(excluded) = released else {
        return Ok(());
    };

    tracing::info!(%order_id, %driver_id, "Offer expired");
    redispatch(state, order_id, excluded, 0).await?;
    Ok(())
}

/// Try again to find a driver for an order still waiting on one.
pub(crate) async fn retry_dispatch(
    state: &AppState,
    order_id: Uuid,
    attempt: u32,
) -> AppResult<()> {
    let order = find_order(state, order_id).await?;
    if order.status != OrderStatus::Preparing || order.driver_id.is_some() {
        return Ok(());
    }

    tracing::debug!(%order_id, attempt, "Retrying dispatch");
    let pickups = load_dispatchable_pickups(state, order_id).await?;
    let excluded = rejected_drivers(state, order_id).await?;
    dispatch_order(state, &order, pickups, excluded, attempt).await?;
    Ok(())
}

async fn find_order(state: &AppState, order_id: Uuid) -> AppResult<delivery_order::Model> {
    delivery_order::Entity::find_by_id(order_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
}

/// Compare-and-set on the order status. Only rows still in one of `from`
/// (and held by `driver_id`, when given) move to `to`; returns whether the
/// order moved.
async fn transition<C: ConnectionTrait>(
    db: &C,
    order_id: Uuid,
    from: &[OrderStatus],
    driver_id: Option<Uuid>,
    to: OrderStatus,
    clear_driver: bool,
) -> AppResult<bool> {
    let changes = delivery_order::ActiveModel {
        status: Set(to),
        driver_id: if clear_driver { Set(None) } else { NotSet },
        ..Default::default()
    };

    let mut update = delivery_order::Entity::update_many()
        .set(changes)
        .filter(delivery_order::Column::Id.eq(order_id))
        .filter(delivery_order::Column::Status.is_in(from.iter().copied()));
    if let Some(driver_id) = driver_id {
        update = update.filter(delivery_order::Column::DriverId.eq(driver_id));
    }

    let result = update.exec(db).await?;
    Ok(result.rows_affected > 0)
}

/// A step only the order's own driver may take.
async fn driver_step(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
    refusal: &str,
) -> AppResult<OrderStatusResponse> {
    if !transition(&state.db, order_id, &[from], Some(driver_id), to, false).await? {
        return Err(AppError::Conflict(refusal.to_string()));
    }

    publish_status(state, order_id, to);
    Ok(OrderStatusResponse {
        order_id,
        status: to,
        driver_id: Some(driver_id),
    })
}

/// Take the order back from `driver_id` while it is in `from`, and record
/// the driver so they are not offered it again. Returns every driver that
/// has given this order up, or `None` if the driver no longer held it.
async fn release_order(
    state: &AppState,
    order_id: Uuid,
    driver_id: Uuid,
    from: OrderStatus,
    reason: Option<String>,
) -> AppResult<Option<Vec<Uuid>>> {
    let txn = state.db.begin().await?;

    let released = transition(
        &txn,
        order_id,
        &[from],
        Some(driver_id),
        OrderStatus::Preparing,
        true,
    )
    .await?;
    if !released {
        return Ok(None);
    }

    driver_rejection::ActiveModel {
        id: Set(Uuid::new_v4()),
        driver_id: Set(driver_id),
        order_id: Set(order_id),
        reason: Set(reason),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    publish_status(state, order_id, OrderStatus::Preparing);

    rejected_drivers(state, order_id).await.map(Some)
}

async fn rejected_drivers(state: &AppState, order_id: Uuid) -> AppResult<Vec<Uuid>> {
    Ok(driver_rejection::Entity::find()
        .filter(driver_rejection::Column::OrderId.eq(order_id))
        .all(&state.db)
        .await?
        .into_iter()
        .map(|r| r.driver_id)
        .collect())
}

async fn redispatch(
    state: &AppState,
    order_id: Uuid,
    excluded: Vec<Uuid>,
    attempt: u32,
) -> AppResult<DispatchPlan> {
    let order = find_order(state, order_id).await?;
    let pickups = load_dispatchable_pickups(state, order_id).await?;
    dispatch_order(state, &order, pickups, excluded, attempt).await
}

/// Pickups of an order in their stored visiting order.
async fn load_pickups(state: &AppState, order_id: Uuid) -> AppResult<Vec<PickupPoint>> {
    let stops = order_pickup::Entity::find()
        .filter(order_pickup::Column::OrderId.eq(order_id))
        .order_by_asc(order_pickup::Column::Position)
        .all(&state.db)
        .await?;

    let restaurant_ids: Vec<Uuid> = stops.iter().map(|s| s.restaurant_id).collect();
    let restaurants = restaurant::Entity::find()
        .filter(restaurant::Column::Id.is_in(restaurant_ids))
        .all(&state.db)
        .await?;

    stops
        .iter()
        .map(|stop| {
            restaurants
                .iter()
                .find(|r| r.id == stop.restaurant_id)
                .map(|r| r.pickup_point())
                .ok_or_else(|| {
                    AppError::Internal(format!("Restaurant {} not found", stop.restaurant_id))
                })
        })
        .collect()
}

/// Pickups of an order that can be dispatched: at least one, all within
/// the allowed spread of each other.
async fn load_dispatchable_pickups(
    state: &AppState,
    order_id: Uuid,
) -> AppResult<Vec<PickupPoint>> {
    let pickups = load_pickups(state, order_id).await?;
    if pickups.is_empty() {
        return Err(AppError::BadRequest("Order has no restaurants".to_string()));
    }

    let locations: Vec<Option<Coordinate>> = pickups.iter().map(|p| p.location).collect();
    if !validate_restaurant_group(&locations, state.config.max_restaurant_spread_km) {
        return Err(AppError::BadRequest(format!(
            "Restaurants must be within {} km of each other",
            state.config.max_restaurant_spread_km
        )));
    }

    Ok(pickups)
}

enum Persisted {
    Saved,
    DriverTaken(Uuid),
}

/// Price, sequence and offer `order`, persist the outcome, notify
/// subscribers and arm the follow-up timer. Drivers in `excluded` are never
/// offered the order.
async fn dispatch_order(
    state: &AppState,
    order: &delivery_order::Model,
    pickups: Vec<PickupPoint>,
    excluded: Vec<Uuid>,
    attempt: u32,
) -> AppResult<DispatchPlan> {
    let candidates = db::driver_candidates(&state.db).await?;
    let mut request = DispatchRequest {
        order_id: order.id,
        pickups,
        dropoff: order.dropoff(),
        driver_hint: None,
        excluded_drivers: excluded,
    };

    for _ in 0..MAX_ASSIGNMENT_ATTEMPTS {
        let road = fetch_road_distances(state, &request, &candidates).await;
        let plan = state.planner.plan(&request, &candidates, road.as_ref());

        match persist_plan(state, &plan).await? {
            Persisted::Saved => {
                publish_plan(state, &plan);
                schedule_follow_up(state, &plan, attempt);
                return Ok(plan);
            }
            Persisted::DriverTaken(driver_id) => {
                tracing::info!(
                    order_id = %order.id,
                    %driver_id,
                    "Driver taken by another order, replanning"
                );
                request.excluded_drivers.push(driver_id);
            }
        }
    }

    Err(AppError::Conflict(
        "Drivers kept being taken by other orders, try again".to_string(),
    ))
}

/// Road distances for eligible drivers, or `None` to fall back to straight
/// lines when no client is configured or the whole lookup fails.
async fn fetch_road_distances(
    state: &AppState,
    request: &DispatchRequest,
    candidates: &[DriverCandidate],
) -> Option<RoadDistances> {
    let client = state.road_distances.as_ref()?;
    let target = request
        .pickups
        .first()
        .and_then(|p| p.location)
        .or(request.dropoff)?;

    let eligible: Vec<DriverCandidate> = candidates
        .iter()
        .filter(|c| c.available && !request.excluded_drivers.contains(&c.driver_id))
        .copied()
        .collect();
    if eligible.is_empty() {
        return None;
    }

    match client.distances_to(target, &eligible).await {
        Ok(table) => Some(table),
        Err(e) => {
            tracing::warn!(
                order_id = %request.order_id,
                error = %e,
                "Road distance lookup failed, using straight-line distance"
            );
            None
        }
    }
}

/// Write the plan under a row lock on the order. The order must still be
/// waiting for a driver, and the chosen driver must still be free once their
/// row is locked too.
async fn persist_plan(state: &AppState, plan: &DispatchPlan) -> AppResult<Persisted> {
    let txn = state.db.begin().await?;

    let order = delivery_order::Entity::find_by_id(plan.order_id)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    if order.status != OrderStatus::Preparing || order.driver_id.is_some() {
        return Err(AppError::Conflict(format!(
            "Order is already {}",
            order.status.as_str()
        )));
    }

    if let Some(driver) = &plan.driver {
        if driver_unavailable(&txn, driver.driver_id).await? {
            return Ok(Persisted::DriverTaken(driver.driver_id));
        }
    }

    let mut active: delivery_order::ActiveModel = order.into();
    active.delivery_fee = Set(plan.fee.fee);
    active.delivery_distance_km = Set(plan.fee.distance_km);
    if let Some(driver) = &plan.driver {
        active.driver_id = Set(Some(driver.driver_id));
        active.status = Set(OrderStatus::Offered);
    }

    if let Err(e) = active.update(&txn).await {
        return match (e.sql_err(), &plan.driver) {
            (Some(SqlErr::UniqueConstraintViolation(_)), Some(driver)) => {
                Ok(Persisted::DriverTaken(driver.driver_id))
            }
            _ => Err(e.into()),
        };
    }

    let stops = order_pickup::Entity::find()
        .filter(order_pickup::Column::OrderId.eq(plan.order_id))
        .all(&txn)
        .await?;

    for (position, pickup) in plan.fee.pickup_order.iter().enumerate() {
        let Some(stop) = stops.iter().find(|s| s.restaurant_id == pickup.restaurant_id) else {
            continue;
        };
        if stop.position == position as i32 {
            continue;
        }
        let mut active: order_pickup::ActiveModel = stop.clone().into();
        active.position = Set(position as i32);
        active.update(&txn).await?;
    }

    txn.commit().await?;
    Ok(Persisted::Saved)
}

/// Lock the driver row, then check they are online and hold no live order.
async fn driver_unavailable(txn: &DatabaseTransaction, driver_id: Uuid) -> AppResult<bool> {
    let driver = driver::Entity::find_by_id(driver_id)
        .lock_exclusive()
        .one(txn)
        .await?;
    if !driver.is_some_and(|d| d.is_online) {
        return Ok(true);
    }

    let holding = delivery_order::Entity::find()
        .filter(delivery_order::Column::DriverId.eq(driver_id))
        .filter(delivery_order::Column::Status.is_in(OrderStatus::DRIVER_BUSY))
        .one(txn)
        .await?;
    Ok(holding.is_some())
}

fn schedule_follow_up(state: &AppState, plan: &DispatchPlan, attempt: u32) {
    let order_id = plan.order_id;
    match &plan.offer {
        Some(offer) => state.timers.schedule(
            DispatchTimer::OfferExpired {
                order_id,
                driver_id: offer.driver_id,
            },
            state.config.offer_timeout(),
        ),
        None if attempt < state.config.dispatch_max_retries => state.timers.schedule(
            DispatchTimer::Retry {
                order_id,
                attempt: attempt + 1,
            },
            state.config.dispatch_retry_interval(),
        ),
        None => tracing::warn!(%order_id, attempt, "Giving up on finding a driver"),
    }
}

fn publish_plan(state: &AppState, plan: &DispatchPlan) {
    state.events.publish(DispatchEvent::DeliveryFeeComputed {
        order_id: plan.order_id,
        fee: plan.fee.fee,
        distance_km: plan.fee.distance_km,
        pickup_order: plan.fee.pickup_order.iter().map(|p| p.restaurant_id).collect(),
    });

    match &plan.offer {
        Some(offer) => {
            tracing::info!(
                order_id = %plan.order_id,
                driver_id = %offer.driver_id,
                fee = plan.fee.fee,
                "Order offered to driver"
            );
            state.events.publish(DispatchEvent::DriverOffered {
                order_id: plan.order_id,
                offer: offer.clone(),
            });
            publish_status(state, plan.order_id, OrderStatus::Offered);
        }
        None => state.events.publish(DispatchEvent::NoDriversAvailable {
            order_id: plan.order_id,
            message: "No drivers available. We will keep trying.".to_string(),
        }),
    }
}

fn publish_status(state: &AppState, order_id: Uuid, status: OrderStatus) {
    state.events.publish(DispatchEvent::OrderStatusChanged {
        order_id,
        status: status.as_str().to_string(),
    });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};
    use serde_json::{Value, json};
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::handlers::testing::{send, state_with};
    use crate::scheduler::DispatchTimers;

    fn now() -> sea_orm::prelude::DateTimeWithTimeZone {
        chrono::Utc::now().fixed_offset()
    }

    fn order_row(id: Uuid, status: OrderStatus, driver_id: Option<Uuid>) -> delivery_order::Model {
        delivery_order::Model {
            id,
            status,
            delivery_lat: Some(-17.8292),
            delivery_lng: Some(31.0522),
            delivery_fee: 0.0,
            delivery_distance_km: 0.0,
            driver_id,
            created_at: now(),
        }
    }

    fn restaurant_row(lat: f64, lng: f64) -> restaurant::Model {
        restaurant::Model {
            id: Uuid::new_v4(),
            name: "Pizza Inn".to_string(),
            lat: Some(lat),
            lng: Some(lng),
        }
    }

    fn stop_row(order_id: Uuid, restaurant_id: Uuid, position: i32) -> order_pickup::Model {
        order_pickup::Model {
            id: Uuid::new_v4(),
            order_id,
            restaurant_id,
            position,
        }
    }

    fn driver_row(lat: f64, lng: f64) -> driver::Model {
        driver::Model {
            id: Uuid::new_v4(),
            name: "Farai".to_string(),
            is_online: true,
            lat: Some(lat),
            lng: Some(lng),
            created_at: now(),
        }
    }

    fn rows_affected(rows: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: rows,
        }
    }

    fn no_orders() -> Vec<delivery_order::Model> {
        Vec::new()
    }

    #[tokio::test]
    async fn test_preparing_rejects_scattered_restaurants_before_changing_status() {
        let order_id = Uuid::new_v4();
        let near = restaurant_row(-17.8252, 31.0335);
        let far = restaurant_row(-17.70, 31.10);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![order_row(order_id, OrderStatus::Paid, None)]])
            .append_query_results([vec![
                stop_row(order_id, near.id, 0),
                stop_row(order_id, far.id, 1),
            ]])
            .append_query_results([vec![near, far]])
            .into_connection();

        let state = state_with(db);
        let mut events = state.events.subscribe();
        let uri = format!("/api/orders/{order_id}/preparing");
        let (status, body) = send(state, "POST", &uri, Value::Null).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap_or_default().contains("within"));
        // Still paid: no status event went out
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_accept_only_succeeds_while_offer_is_open() {
        let order_id = Uuid::new_v4();
        let driver_id = Uuid::new_v4();
        let uri = format!("/api/orders/{order_id}/accept");

        let expired = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([rows_affected(0)])
            .into_connection();
        let body = json!({"driver_id": driver_id});
        let (status, _) = send(state_with(expired), "POST", &uri, body).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let open = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([rows_affected(1)])
            .into_connection();
        let state = state_with(open);
        let mut events = state.events.subscribe();
        let (status, body) = send(state, "POST", &uri, json!({"driver_id": driver_id})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "assigned");
        assert_eq!(body["driver_id"], json!(driver_id));
        assert_eq!(
            events.try_recv().expect("status event"),
            DispatchEvent::OrderStatusChanged {
                order_id,
                status: "assigned".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_driver_walks_order_to_delivered() {
        let order_id = Uuid::new_v4();
        let driver = json!({"driver_id": Uuid::new_v4()});
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([rows_affected(1), rows_affected(1)])
            .into_connection();
        let state = state_with(db);

        let uri = format!("/api/orders/{order_id}/picked-up");
        let (status, body) = send(state.clone(), "POST", &uri, driver.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "out_for_delivery");

        let uri = format!("/api/orders/{order_id}/delivered");
        let (status, body) = send(state, "POST", &uri, driver).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "delivered");
    }

    #[tokio::test]
    async fn test_cancel_refused_once_driver_accepted() {
        let order_id = Uuid::new_v4();
        let uri = format!("/api/orders/{order_id}/cancel");

        let waiting = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([rows_affected(1)])
            .into_connection();
        let (status, body) = send(state_with(waiting), "POST", &uri, Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "cancelled");
        assert!(body["driver_id"].is_null());

        let accepted = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([rows_affected(0)])
            .into_connection();
        let (status, _) = send(state_with(accepted), "POST", &uri, Value::Null).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_driver_taken_concurrently_is_skipped_and_retry_armed() {
        let order_id = Uuid::new_v4();
        let kfc = restaurant_row(-17.8252, 31.0335);
        let driver = driver_row(-17.8260, 31.0340);
        let waiting = order_row(order_id, OrderStatus::Preparing, None);
        let rival = order_row(Uuid::new_v4(), OrderStatus::Offered, Some(driver.id));

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![waiting.clone()]])
            .append_query_results([vec![stop_row(order_id, kfc.id, 0)]])
            .append_query_results([vec![kfc]])
            // Snapshot: nobody busy yet
            .append_query_results([no_orders()])
            .append_query_results([vec![driver.clone()]])
            // First write: the driver got another order in the meantime
            .append_query_results([vec![waiting.clone()]])
            .append_query_results([vec![driver]])
            .append_query_results([vec![rival]])
            // Second write, no driver left
            .append_query_results([vec![waiting.clone()]])
            .append_query_results([vec![waiting]])
            .append_query_results([Vec::<order_pickup::Model>::new()])
            .into_connection();

        let mut state = state_with(db);
        let (timers, mut fired) = DispatchTimers::new();
        state.timers = timers;
        state.config.dispatch_retry_secs = 0;
        let mut events = state.events.subscribe();

        let uri = format!("/api/orders/{order_id}/preparing");
        let (status, body) = send(state, "POST", &uri, Value::Null).await;

        assert_eq!(status, StatusCode::OK, "{body}");
        assert!(body["driver"].is_null());
        assert!(matches!(
            events.try_recv(),
            Ok(DispatchEvent::DeliveryFeeComputed { .. })
        ));
        assert!(matches!(
            events.try_recv(),
            Ok(DispatchEvent::NoDriversAvailable { .. })
        ));

        let timer = tokio::time::timeout(Duration::from_secs(2), fired.recv())
            .await
            .expect("retry armed");
        assert_eq!(
            timer,
            Some(DispatchTimer::Retry {
                order_id,
                attempt: 1
            })
        );
    }

    #[tokio::test]
    async fn test_order_offered_elsewhere_is_not_overwritten() {
        let order_id = Uuid::new_v4();
        let kfc = restaurant_row(-17.8252, 31.0335);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![order_row(order_id, OrderStatus::Preparing, None)]])
            .append_query_results([vec![stop_row(order_id, kfc.id, 0)]])
            .append_query_results([vec![kfc]])
            .append_query_results([no_orders()])
            .append_query_results([Vec::<driver::Model>::new()])
            // A concurrent dispatch offered it while this one was planning
            .append_query_results([vec![order_row(
                order_id,
                OrderStatus::Offered,
                Some(Uuid::new_v4()),
            )]])
            .into_connection();

        let state = state_with(db);
        let mut events = state.events.subscribe();
        let uri = format!("/api/orders/{order_id}/preparing");
        let (status, _) = send(state, "POST", &uri, Value::Null).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_expired_offer_goes_to_next_driver() {
        let order_id = Uuid::new_v4();
        let kfc = restaurant_row(-17.8252, 31.0335);
        let silent = driver_row(-17.8253, 31.0336);
        let next = driver_row(-17.8300, 31.0400);
        let rejection = driver_rejection::Model {
            id: Uuid::new_v4(),
            driver_id: silent.id,
            order_id,
            reason: Some("Offer expired".to_string()),
            rejected_at: now(),
        };
        let waiting = order_row(order_id, OrderStatus::Preparing, None);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([rows_affected(1)])
            .append_query_results([vec![rejection.clone()]])
            .append_query_results([vec![rejection]])
            .append_query_results([vec![waiting.clone()]])
            .append_query_results([vec![stop_row(order_id, kfc.id, 0)]])
            .append_query_results([vec![kfc]])
            .append_query_results([no_orders()])
            .append_query_results([vec![silent.clone(), next.clone()]])
            .append_query_results([vec![waiting]])
            .append_query_results([vec![next.clone()]])
            .append_query_results([no_orders()])
            .append_query_results([vec![order_row(
                order_id,
                OrderStatus::Offered,
                Some(next.id),
            )]])
            .append_query_results([Vec::<order_pickup::Model>::new()])
            .into_connection();

        let mut state = state_with(db);
        let (timers, mut fired) = DispatchTimers::new();
        state.timers = timers;
        state.config.offer_timeout_secs = 0;
        let mut events = state.events.subscribe();

        expire_offer(&state, order_id, silent.id).await.expect("expired");

        assert_eq!(
            events.try_recv().expect("released"),
            DispatchEvent::OrderStatusChanged {
                order_id,
                status: "preparing".to_string(),
            }
        );
        assert!(matches!(
            events.try_recv(),
            Ok(DispatchEvent::DeliveryFeeComputed { .. })
        ));
        match events.try_recv() {
            Ok(DispatchEvent::DriverOffered { offer, .. }) => assert_eq!(offer.driver_id, next.id),
            other => panic!("expected a new offer, got {other:?}"),
        }

        let timer = tokio::time::timeout(Duration::from_secs(2), fired.recv())
            .await
            .expect("expiry armed");
        assert_eq!(
            timer,
            Some(DispatchTimer::OfferExpired {
                order_id,
                driver_id: next.id
            })
        );
    }

    #[tokio::test]
    async fn test_answered_offer_does_not_expire() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([rows_affected(0)])
            .into_connection();
        let state = state_with(db);
        let mut events = state.events.subscribe();

        expire_offer(&state, Uuid::new_v4(), Uuid::new_v4())
            .await
            .expect("no-op");
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_retry_skips_order_that_found_a_driver() {
        let order_id = Uuid::new_v4();
        let db: DatabaseConnection = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![order_row(
                order_id,
                OrderStatus::Assigned,
                Some(Uuid::new_v4()),
            )]])
            .into_connection();

        retry_dispatch(&state_with(db), order_id, 3)
            .await
            .expect("skipped");
    }
}

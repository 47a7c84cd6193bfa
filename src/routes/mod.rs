use axum::{
    Router,
    routing::{get, post, put},
};

use crate::AppState;
use crate::handlers::{delivery, drivers, live, orders};

pub fn create_router(state: AppState) -> Router {
    // Pricing only, no database access
    let delivery_routes = Router::new().route("/quote", post(delivery::quote));

    // Order state transitions that drive dispatch
    let order_routes = Router::new()
        .route("/{id}/preparing", post(orders::mark_preparing))
        .route("/{id}/reject", post(orders::reject_offer))
        .route("/{id}/accept", post(orders::accept_offer))
        .route("/{id}/picked-up", post(orders::mark_picked_up))
        .route("/{id}/delivered", post(orders::mark_delivered))
        .route("/{id}/cancel", post(orders::cancel_order))
        .route("/{id}/driver-cancel", post(orders::driver_cancel))
        .route("/{id}/eta", get(orders::order_eta));

    // Driver registry updates from the driver app
    let driver_routes = Router::new()
        .route("/nearby", get(drivers::nearby))
        .route("/{id}/location", put(drivers::update_location))
        .route("/{id}/online", put(drivers::set_online));

    Router::new()
        .nest("/api/delivery", delivery_routes)
        .nest("/api/orders", order_routes)
        .nest("/api/drivers", driver_routes)
        .route("/ws/orders", get(live::order_events))
        .with_state(state)
}

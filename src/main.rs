use std::net::SocketAddr;
use std::sync::Arc;

use sea_orm_migration::MigratorTrait;
use tokio::net::TcpListener;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use delivery_dispatch::{
    AppState, config::Config, db, dispatch::DispatchPlanner, events::EventBus, routes,
    routing::RoadDistanceClient, scheduler, scheduler::DispatchTimers,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "delivery_dispatch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    tracing::info!("Starting server at {}", config.server_addr());

    // Connect to database
    let db = db::connect(&config)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Connected to database");

    // Run migrations
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    tracing::info!("Migrations complete");

    // Road distances are optional; without a key dispatch uses straight lines
    let road_distances = match &config.google_maps_api_key {
        Some(key) => {
            let client =
                RoadDistanceClient::new(&config.routing_api_url, key, config.routing_timeout())
                    .expect("Failed to build routing client");
            tracing::info!("Road distance lookups enabled");
            Some(client)
        }
        None => {
            tracing::warn!(
                "GOOGLE_MAPS_API_KEY not set, driver selection uses straight-line distance"
            );
            None
        }
    };

    let planner = DispatchPlanner::new(config.fee_schedule(), config.average_speed_kmh);
    tracing::info!(
        rate_per_km = planner.schedule.rate_per_km,
        min_fee = planner.schedule.min_fee,
        "Delivery fee schedule loaded"
    );

    // Create app state
    let (timers, fired) = DispatchTimers::new();
    let state = AppState {
        db,
        config: config.clone(),
        planner,
        events: EventBus::new(),
        road_distances,
        timers,
    };

    // Offer expiry and dispatch retries
    tokio::spawn(scheduler::run(state.clone(), fired));
    tracing::info!(
        offer_timeout_secs = config.offer_timeout_secs,
        retry_secs = config.dispatch_retry_secs,
        "Dispatch timers running"
    );

    // Per-IP rate limiting: one token every N seconds up to the burst size
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.rate_limit_replenish_secs)
            .burst_size(config.rate_limit_burst)
            .finish()
            .expect("Invalid rate limit configuration"),
    );

    // Create router with middleware
    let app = routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(GovernorLayer::new(governor_config));

    // Start server with socket address for rate limiting
    let addr: SocketAddr = config.server_addr().parse().expect("Invalid address");
    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}

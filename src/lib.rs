pub mod config;
pub mod db;
pub mod dispatch;
pub mod entities;
pub mod error;
pub mod events;
pub mod handlers;
pub mod routes;
pub mod routing;
pub mod scheduler;

use sea_orm::DatabaseConnection;

pub use config::Config;
pub use error::{AppError, AppResult};

use dispatch::DispatchPlanner;
use events::EventBus;
use routing::RoadDistanceClient;
use scheduler::DispatchTimers;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Config,
    pub planner: DispatchPlanner,
    pub events: EventBus,
    /// Present only when a routing API key is configured.
    pub road_distances: Option<RoadDistanceClient>,
    pub timers: DispatchTimers,
}

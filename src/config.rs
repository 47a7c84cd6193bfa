use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::dispatch::FeeSchedule;

const DEFAULT_ROUTING_API_URL: &str = "https://maps.googleapis.com/maps/api/distancematrix/json";

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub delivery_rate_per_km: f64,
    pub min_delivery_fee: f64,
    pub max_restaurant_spread_km: f64,
    pub average_speed_kmh: f64,
    pub google_maps_api_key: Option<String>,
    pub routing_api_url: String,
    pub routing_timeout_secs: u64,
    pub offer_timeout_secs: u64,
    pub dispatch_retry_secs: u64,
    pub dispatch_max_retries: u32,
    pub rate_limit_replenish_secs: u64,
    pub rate_limit_burst: u32,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_or("SERVER_PORT", 3000),
            delivery_rate_per_km: parse_or("DELIVERY_RATE_PER_KM", 0.35),
            min_delivery_fee: parse_or("MIN_DELIVERY_FEE", 1.50),
            max_restaurant_spread_km: parse_or("MAX_RESTAURANT_SPREAD_KM", 5.0),
            average_speed_kmh: parse_or("AVERAGE_SPEED_KMH", 30.0),
            google_maps_api_key: env::var("GOOGLE_MAPS_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            routing_api_url: env::var("ROUTING_API_URL")
                .unwrap_or_else(|_| DEFAULT_ROUTING_API_URL.to_string()),
            routing_timeout_secs: parse_or("ROUTING_TIMEOUT_SECS", 5),
            offer_timeout_secs: parse_or("OFFER_TIMEOUT_SECS", 30),
            dispatch_retry_secs: parse_or("DISPATCH_RETRY_SECS", 30),
            dispatch_max_retries: parse_or("DISPATCH_MAX_RETRIES", 20),
            rate_limit_replenish_secs: parse_or("RATE_LIMIT_REPLENISH_SECS", 1),
            rate_limit_burst: parse_or("RATE_LIMIT_BURST", 100),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule {
            rate_per_km: self.delivery_rate_per_km,
            min_fee: self.min_delivery_fee,
        }
    }

    pub fn routing_timeout(&self) -> Duration {
        Duration::from_secs(self.routing_timeout_secs)
    }

    /// How long a driver has to answer an offer.
    pub fn offer_timeout(&self) -> Duration {
        Duration::from_secs(self.offer_timeout_secs)
    }

    pub fn dispatch_retry_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch_retry_secs)
    }
}

/// Read an optional numeric variable, panicking on garbage like the rest of
/// startup configuration.
fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{} must be a number", key)),
        Err(_) => default,
    }
}

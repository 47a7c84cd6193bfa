use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Routing request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Routing API returned status {0}")]
    Api(String),
}

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(super) struct DistanceMatrixResponse {
    pub(super) status: String,
    #[serde(default)]
    pub(super) error_message: Option<String>,
    #[serde(default)]
    pub(super) rows: Vec<DistanceMatrixRow>,
}

#[derive(Debug, Deserialize)]
pub(super) struct DistanceMatrixRow {
    #[serde(default)]
    pub(super) elements: Vec<DistanceMatrixElement>,
}

#[derive(Debug, Deserialize)]
pub(super) struct DistanceMatrixElement {
    pub(super) status: String,
    pub(super) distance: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TextValue {
    /// Meters.
    pub(super) value: f64,
}

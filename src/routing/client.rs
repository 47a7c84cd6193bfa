use std::time::Duration;

use reqwest::{Client, Url};

use super::error::RoutingError;
use super::response::DistanceMatrixResponse;
use crate::dispatch::{Coordinate, DistanceLookupError, DriverCandidate, RoadDistances};

/// Thin HTTP client for driving distances between drivers and a pickup.
#[derive(Debug, Clone)]
pub struct RoadDistanceClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl RoadDistanceClient {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self, RoutingError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Driving distance from every candidate to `target`, in one request.
    ///
    /// Per-driver failures (no location, no route) land in the table as
    /// errors; only a failure of the whole request is returned as `Err`.
    pub async fn distances_to(
        &self,
        target: Coordinate,
        candidates: &[DriverCandidate],
    ) -> Result<RoadDistances, RoutingError> {
        let located: Vec<(&DriverCandidate, Coordinate)> = candidates
            .iter()
            .filter_map(|c| c.location.map(|loc| (c, loc)))
            .collect();

        let mut table: RoadDistances = candidates
            .iter()
            .filter(|c| c.location.is_none())
            .map(|c| (c.driver_id, Err(DistanceLookupError::MissingLocation)))
            .collect();

        if located.is_empty() {
            return Ok(table);
        }

        let origins = located
            .iter()
            .map(|(_, loc)| format_point(*loc))
            .collect::<Vec<_>>()
            .join("|");

        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| RoutingError::Api(format!("invalid routing endpoint: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("origins", &origins)
            .append_pair("destinations", &format_point(target))
            .append_pair("mode", "driving")
            .append_pair("key", &self.api_key);

        tracing::debug!(drivers = located.len(), "Requesting road distances");

        let response: DistanceMatrixResponse = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let ids: Vec<_> = located.iter().map(|(c, _)| c.driver_id).collect();
        table.extend(parse_matrix(response, &ids)?);
        Ok(table)
    }
}

fn format_point(point: Coordinate) -> String {
    format!("{:.6},{:.6}", point.lat, point.lng)
}

/// Map matrix rows back onto the drivers they were requested for, in order.
fn parse_matrix(
    response: DistanceMatrixResponse,
    driver_ids: &[uuid::Uuid],
) -> Result<RoadDistances, RoutingError> {
    if response.status != "OK" {
        let detail = response
            .error_message
            .map(|m| format!("{}: {}", response.status, m))
            .unwrap_or(response.status);
        return Err(RoutingError::Api(detail));
    }

    let mut rows = response.rows.into_iter();
    let table = driver_ids
        .iter()
        .map(|id| {
            let element = rows.next().and_then(|row| row.elements.into_iter().next());
            let distance = match element {
                Some(e) if e.status == "OK" => e
                    .distance
                    .map(|d| d.value / 1000.0)
                    .ok_or_else(|| DistanceLookupError::NoRoute("missing distance".to_string())),
                Some(e) => Err(DistanceLookupError::NoRoute(e.status)),
                None => Err(DistanceLookupError::NoRoute("missing row".to_string())),
            };
            (*id, distance)
        })
        .collect();

    Ok(table)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn parse(json: &str) -> DistanceMatrixResponse {
        serde_json::from_str(json).expect("valid matrix json")
    }

    #[test]
    fn test_parse_matrix_maps_rows_to_drivers() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let response = parse(
            r#"{
                "status": "OK",
                "rows": [
                    {"elements": [{"status": "OK", "distance": {"text": "2.4 km", "value": 2400}}]},
                    {"elements": [{"status": "ZERO_RESULTS"}]}
                ]
            }"#,
        );

        let table = parse_matrix(response, &[a, b, c]).expect("matrix");
        assert_eq!(table.len(), 3);
        assert_eq!(table[&a].as_ref().ok(), Some(&2.4));
        assert_eq!(
            table[&b],
            Err(DistanceLookupError::NoRoute("ZERO_RESULTS".to_string()))
        );
        assert!(matches!(&table[&c], Err(DistanceLookupError::NoRoute(_))));
    }

    #[test]
    fn test_parse_matrix_rejects_failed_request() {
        let response = parse(r#"{"status": "REQUEST_DENIED", "error_message": "bad key"}"#);
        let err = parse_matrix(response, &[Uuid::new_v4()]).unwrap_err();
        assert!(matches!(err, RoutingError::Api(s) if s == "REQUEST_DENIED: bad key"));
    }

    #[tokio::test]
    async fn test_drivers_without_location_never_hit_network() {
        // The endpoint is unroutable; the call must short-circuit.
        let client =
            RoadDistanceClient::new("http://127.0.0.1:9", "key", Duration::from_millis(50))
                .expect("client");
        let id = Uuid::new_v4();
        let candidates = [DriverCandidate {
            driver_id: id,
            location: None,
            available: true,
        }];

        let table = client
            .distances_to(Coordinate::new(-17.82, 31.03), &candidates)
            .await
            .expect("no request made");
        assert_eq!(table[&id], Err(DistanceLookupError::MissingLocation));
    }
}

//! Vehicle-location and stop-lookup calls against the transit API
//!
//! All calls carry a bearer token obtained by the caller. Incomplete or
//! wrong-typed records in otherwise valid responses are dropped, not errors;
//! an empty vehicle list is a normal quiet-period response.

use crate::domain::types::{
    BusRecord, BusStopRecord, LineVariantRecord, MonitoredStop, VehiclePosition,
};
use crate::error::FetchError;
use crate::infra::config::Config;
use std::time::Instant;
use tracing::debug;

/// Read-side client for the bus endpoints. Holds the monitored line filter
/// so every positions call asks only for the lines being watched.
pub struct PositionFetcher {
    client: reqwest::Client,
    base_url: String,
    lines: Vec<String>,
    line_variant_ids: Vec<String>,
    #[cfg(test)]
    mock: Option<MockFetch>,
}

#[cfg(test)]
#[derive(Debug)]
pub(crate) enum MockFetch {
    Positions(Vec<VehiclePosition>),
    Fail,
}

impl PositionFetcher {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.api_base_url().to_string(),
            lines: config.lines().to_vec(),
            line_variant_ids: config.line_variant_ids().to_vec(),
            #[cfg(test)]
            mock: None,
        }
    }

    /// Current positions of all vehicles on the monitored lines. Vehicles
    /// whose record fails to decode, or that lack an id or a usable
    /// coordinate pair, are skipped.
    pub async fn fetch_positions(&self, token: &str) -> Result<Vec<VehiclePosition>, FetchError> {
        #[cfg(test)]
        if let Some(ref mock) = self.mock {
            return match mock {
                MockFetch::Positions(positions) => Ok(positions.clone()),
                MockFetch::Fail => {
                    Err(FetchError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR))
                }
            };
        }

        let query = self.bus_query();
        let body = self.get(token, "/buses", &query).await?;
        parse_positions(&body)
    }

    /// Full stop directory. The API has no single-stop lookup, so resolving
    /// one stop means scanning this list.
    pub async fn fetch_stops(&self, token: &str) -> Result<Vec<MonitoredStop>, FetchError> {
        let body = self.get(token, "/buses/busstops", &[]).await?;
        parse_stops(&body)
    }

    pub async fn find_stop(
        &self,
        token: &str,
        stop_id: i64,
    ) -> Result<Option<MonitoredStop>, FetchError> {
        let stops = self.fetch_stops(token).await?;
        Ok(stops.into_iter().find(|stop| stop.external_id == stop_id))
    }

    /// All line variants known to the API, for picking direction-specific
    /// variant ids to put in the config.
    pub async fn fetch_line_variants(
        &self,
        token: &str,
    ) -> Result<Vec<LineVariantRecord>, FetchError> {
        let body = self.get(token, "/buses/linevariants", &[]).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<String, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let start = Instant::now();

        let response = self.client.get(&url).bearer_auth(token).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.text().await?;
        let latency_us = start.elapsed().as_micros() as u64;
        debug!(path = %path, latency_us = %latency_us, bytes = %body.len(), "api_get");
        Ok(body)
    }

    fn bus_query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![("lines", self.lines.join(","))];
        if !self.line_variant_ids.is_empty() {
            query.push(("lineVariantIds", self.line_variant_ids.join(",")));
        }
        query
    }

    #[cfg(test)]
    pub(crate) fn set_mock_positions(&mut self, positions: Vec<VehiclePosition>) {
        self.mock = Some(MockFetch::Positions(positions));
    }

    #[cfg(test)]
    pub(crate) fn set_mock_failure(&mut self) {
        self.mock = Some(MockFetch::Fail);
    }
}

fn parse_positions(body: &str) -> Result<Vec<VehiclePosition>, FetchError> {
    let values: Vec<serde_json::Value> = serde_json::from_str(body)?;
    let total = values.len();
    // Decode per element; a wrong-typed field drops that record, not the batch
    let positions: Vec<VehiclePosition> = values
        .into_iter()
        .filter_map(|value| serde_json::from_value::<BusRecord>(value).ok())
        .filter_map(VehiclePosition::from_record)
        .collect();
    let skipped = total - positions.len();
    if skipped > 0 {
        debug!(skipped = %skipped, "incomplete_bus_records");
    }
    Ok(positions)
}

fn parse_stops(body: &str) -> Result<Vec<MonitoredStop>, FetchError> {
    let values: Vec<serde_json::Value> = serde_json::from_str(body)?;
    Ok(values
        .into_iter()
        .filter_map(|value| serde_json::from_value::<BusStopRecord>(value).ok())
        .filter_map(MonitoredStop::from_record)
        .collect())
}

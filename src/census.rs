//! Client for the Bitnodes snapshot API.
//!
//! The census publishes one snapshot roughly every ten minutes. Each snapshot
//! lists every reachable node keyed by `address:port`, and every node is a
//! positional array (protocol version, user agent, connected since, services,
//! height, hostname, city, country code, ...). Only the country code is used
//! here, so records stay as raw JSON and are interpreted by the aggregator.
use crate::error::Error;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Position of the two letter country code inside a node record.
pub const COUNTRY_FIELD: usize = 7;

/// One point in time capture of the reachable network.
#[derive(serde::Deserialize, Debug, Clone, Default)]
pub struct Snapshot {
    /// Unix seconds at which the census took the snapshot.
    #[serde(default)]
    pub timestamp: Option<i64>,

    /// Node count as declared by the census.
    #[serde(default)]
    pub total_nodes: Option<u64>,

    pub nodes: HashMap<String, serde_json::Value>,
}

impl Snapshot {
    pub fn parse(body: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(body)?)
    }
}

/// Anything that can produce a snapshot for a report cycle.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<Snapshot, Error>;
}

pub struct CensusClient {
    http: reqwest::Client,
    url: String,
}

impl CensusClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| format!("Failed to build census http client: {}", err))?;
        Ok(CensusClient {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SnapshotSource for CensusClient {
    /// Single GET, no retry. The caller decides what a failure means.
    async fn fetch(&self) -> Result<Snapshot, Error> {
        let resp = self
            .http
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::network("census", e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                endpoint: "census",
                status,
            });
        }

        let body = resp.text().await.map_err(|e| Error::network("census", e))?;
        let snapshot = Snapshot::parse(&body)?;

        tracing::debug!(
            listed = snapshot.nodes.len(),
            declared = ?snapshot.total_nodes,
            timestamp = ?snapshot.timestamp,
            "fetched census snapshot"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_live_shaped_body() {
        let body = r#"{
            "timestamp": 1760600000,
            "total_nodes": 2,
            "latest_height": 917000,
            "nodes": {
                "1.2.3.4:8333": [70016, "/Satoshi:27.0.0/", 1760000000, 1033, 917000, "host", "Berlin", "DE", 52.5, 13.4, "Europe/Berlin", "AS3320", "DTAG"],
                "[2001:db8::1]:8333": [70016, "/Satoshi:26.0.0/", 1760000000, 1033, 917000, null, null, null, 0.0, 0.0, null, null, null]
            }
        }"#;
        let snapshot = Snapshot::parse(body).unwrap();
        assert_eq!(snapshot.timestamp, Some(1760600000));
        assert_eq!(snapshot.total_nodes, Some(2));
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.nodes["1.2.3.4:8333"][COUNTRY_FIELD], "DE");
    }

    #[test]
    fn optional_fields_may_be_missing() {
        let snapshot = Snapshot::parse(r#"{"nodes": {}}"#).unwrap();
        assert_eq!(snapshot.timestamp, None);
        assert_eq!(snapshot.total_nodes, None);
        assert!(snapshot.nodes.is_empty());
    }

    #[test]
    fn missing_nodes_is_a_parse_error() {
        let err = Snapshot::parse(r#"{"total_nodes": 10}"#).unwrap_err();
        assert_eq!(err.kind(), "parse");

        let err = Snapshot::parse("<html>502</html>").unwrap_err();
        assert_eq!(err.kind(), "parse");
    }
}

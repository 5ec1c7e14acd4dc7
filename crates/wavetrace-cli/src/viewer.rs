//! HTTP client for a waveform viewer's point-query endpoint.
//!
//! The viewer answers `POST {"uri", "time", "paths"}` with a JSON array of
//! `{path, value}` entries, where `value` is the current value or a
//! `[previous, current]` pair.

use reqwest::blocking::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, trace};
use wavetrace_core::{PointQuery, PointValue, WaveError};

/// Default timeout for one point query
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct ValuesRequest<'a> {
    uri: &'a str,
    time: u64,
    paths: &'a [String],
}

/// Point-query transport over HTTP
pub struct HttpPointQuery {
    client: Client,
    endpoint: String,
}

impl HttpPointQuery {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, WaveError> {
        let client = Client::builder()
            .timeout(DEFAULT_QUERY_TIMEOUT)
            .build()
            .map_err(|e| WaveError::Query(e.to_string()))?;
        let endpoint = endpoint.into();
        debug!(endpoint = %endpoint, "Viewer client ready");
        Ok(Self { client, endpoint })
    }
}

impl PointQuery for HttpPointQuery {
    fn values_at(
        &mut self,
        uri: &str,
        time: u64,
        paths: &[String],
    ) -> wavetrace_core::Result<Vec<PointValue>> {
        let request = ValuesRequest { uri, time, paths };
        trace!(time, paths = paths.len(), "Point query");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| WaveError::Query(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WaveError::Query(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().unwrap_or_default()
            )));
        }

        response
            .json::<Vec<PointValue>>()
            .map_err(|e| WaveError::Query(format!("invalid viewer response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let paths = vec!["tb.clk".to_string()];
        let request = ValuesRequest {
            uri: "file:///sim.vcd",
            time: 40,
            paths: &paths,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"uri": "file:///sim.vcd", "time": 40, "paths": ["tb.clk"]})
        );
    }

    #[test]
    fn test_response_shape() {
        let body = r#"[{"path": "tb.clk", "value": "[\"0\",\"1\"]"}, {"path": "tb.d"}]"#;
        let points: Vec<PointValue> = serde_json::from_str(body).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].value, serde_json::Value::Null);
    }

    #[test]
    fn test_unreachable_viewer_is_query_error() {
        let mut viewer = HttpPointQuery::new("http://127.0.0.1:9/values").unwrap();
        let err = viewer
            .values_at("file:///sim.vcd", 0, &["tb.clk".to_string()])
            .unwrap_err();
        assert!(matches!(err, WaveError::Query(_)));
    }
}

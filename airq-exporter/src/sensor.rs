// AirQ Exporter - Sensor API client
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Vendor sensor API client.
//!
//! Every reading is fetched by tag with a single POST:
//!
//! ```text
//! POST <api_url>
//! Authorization: Basic <api_key>
//! {"Tags":[{"Name":"<tag>"}]}
//!
//! 200 OK
//! {"Values":[{"Value":12.3, ...}], ...}
//! ```

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Source of raw readings, one tag at a time.
#[async_trait]
pub trait SensorClient: Send + Sync {
    /// Latest value of one API tag.
    async fn fetch(&self, tag: &str) -> Result<f64, FetchError>;
}

#[derive(Debug, Serialize)]
struct TagQuery<'a> {
    #[serde(rename = "Tags")]
    tags: [TagName<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TagName<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct TagResponse {
    #[serde(rename = "Values", default)]
    values: Vec<TagValue>,
}

#[derive(Debug, Deserialize)]
struct TagValue {
    #[serde(rename = "Value")]
    value: Option<f64>,
}

/// HTTP client for the vendor tag API.
pub struct HttpSensorClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpSensorClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, FetchError> {
        Self::with_timeout(api_url, api_key, Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl SensorClient for HttpSensorClient {
    async fn fetch(&self, tag: &str) -> Result<f64, FetchError> {
        let query = TagQuery {
            tags: [TagName { name: tag }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header(AUTHORIZATION, format!("Basic {}", self.api_key))
            .header("charset", "utf-8")
            .json(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        debug!("Tag {}: {}", tag, body);
        parse_value(&body)
    }
}

/// First value of a tag API response body.
pub fn parse_value(body: &str) -> Result<f64, FetchError> {
    let response: TagResponse =
        serde_json::from_str(body).map_err(|e| FetchError::InvalidResponse(e.to_string()))?;

    response
        .values
        .first()
        .and_then(|v| v.value)
        .ok_or_else(|| FetchError::InvalidResponse(format!("no value in {}", body)))
}

/// Sensor fetch errors.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {0}")]
    Status(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Fetch task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_body() {
        let query = TagQuery {
            tags: [TagName { name: "B1F.PM25" }],
        };
        assert_eq!(
            serde_json::to_string(&query).unwrap(),
            r#"{"Tags":[{"Name":"B1F.PM25"}]}"#
        );
    }

    #[test]
    fn test_parse_value() {
        let body = r#"{"Values":[{"Name":"B1F.PM25","Value":12.5,"Quality":"Good"}]}"#;
        assert_eq!(parse_value(body).unwrap(), 12.5);
    }

    #[test]
    fn test_parse_sentinel_passes_through() {
        // Sentinel detection happens at ingestion, not here.
        assert_eq!(parse_value(r#"{"Values":[{"Value":-1}]}"#).unwrap(), -1.0);
    }

    #[test]
    fn test_parse_empty_values() {
        assert!(matches!(
            parse_value(r#"{"Values":[]}"#),
            Err(FetchError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_value(r#"{"Values":[{"Name":"x"}]}"#),
            Err(FetchError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_value("{}"),
            Err(FetchError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_value("<html>"),
            Err(FetchError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_client_builds() {
        let client = HttpSensorClient::new("http://localhost:1/api", "secret").unwrap();
        assert_eq!(client.api_url, "http://localhost:1/api");
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::fetch::{HttpClient, fetch_bytes};
use crate::parser::parse_report;
use crate::services::telemetry_api::{RawReport, TelemetrySource};

/// Reads the latest report with a GET against a JSON endpoint, such as a
/// realtime database path (`https://<db>.firebaseio.com/gpsdata.json`).
pub struct HttpTelemetry<C> {
    client: C,
    url: String,
}

impl<C: HttpClient> HttpTelemetry<C> {
    pub fn new(client: C, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl<C: HttpClient> TelemetrySource for HttpTelemetry<C> {
    async fn latest(&self) -> Result<Option<RawReport>> {
        let bytes = fetch_bytes(&self.client, &self.url)
            .await
            .with_context(|| format!("telemetry fetch from {} failed", self.url))?;
        debug!(bytes = bytes.len(), "Telemetry bytes received");
        parse_report(&bytes).context("telemetry report could not be decoded")
    }
}

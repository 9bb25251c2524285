//! Environment-driven settings for the telemetry endpoint.
//!
//! Endpoint and secrets come from the environment (a `.env` file is loaded by
//! the binary); everything else is a CLI flag.

use anyhow::{Context, Result, bail};
use std::time::Duration;

use crate::fetch::auth::{ApiKey, UrlParam};
use crate::fetch::{BasicClient, HttpClient};
use crate::infra::telemetry::HttpTelemetry;

pub const TELEMETRY_URL: &str = "TELEMETRY_URL";
pub const TELEMETRY_AUTH_PARAM: &str = "TELEMETRY_AUTH_PARAM";
pub const TELEMETRY_AUTH_KEY: &str = "TELEMETRY_AUTH_KEY";
pub const TELEMETRY_BEARER_TOKEN: &str = "TELEMETRY_BEARER_TOKEN";

const DEFAULT_AUTH_PARAM: &str = "auth";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryAuth {
    None,
    /// Secret appended as `?<param_name>=<key>`.
    UrlParam { param_name: String, key: String },
    /// `Authorization: Bearer <token>`.
    Bearer(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub url: String,
    pub auth: TelemetryAuth,
}

impl TelemetryConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let url = get(TELEMETRY_URL).with_context(|| format!("{TELEMETRY_URL} must be set"))?;
        reqwest::Url::parse(&url).with_context(|| format!("{TELEMETRY_URL} is not a valid URL"))?;

        let auth = match (get(TELEMETRY_AUTH_KEY), get(TELEMETRY_BEARER_TOKEN)) {
            (Some(_), Some(_)) => bail!(
                "set only one of {TELEMETRY_AUTH_KEY} and {TELEMETRY_BEARER_TOKEN}"
            ),
            (Some(key), None) => TelemetryAuth::UrlParam {
                param_name: get(TELEMETRY_AUTH_PARAM)
                    .unwrap_or_else(|| DEFAULT_AUTH_PARAM.to_string()),
                key,
            },
            (None, Some(token)) => TelemetryAuth::Bearer(token),
            (None, None) => TelemetryAuth::None,
        };

        Ok(Self { url, auth })
    }

    /// An HTTP telemetry source with the configured credentials and a
    /// per-request `timeout`.
    pub fn source(&self, timeout: Duration) -> Result<HttpTelemetry<Box<dyn HttpClient>>> {
        let basic = BasicClient::new(timeout)?;
        let client: Box<dyn HttpClient> = match &self.auth {
            TelemetryAuth::None => Box::new(basic),
            TelemetryAuth::UrlParam { param_name, key } => {
                Box::new(UrlParam::new(basic, param_name.clone(), key.clone()))
            }
            TelemetryAuth::Bearer(token) => Box::new(ApiKey::bearer(basic, token)?),
        };
        Ok(HttpTelemetry::new(client, self.url.clone()))
    }
}

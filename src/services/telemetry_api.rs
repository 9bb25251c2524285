//! Trait and types for reading vehicle telemetry.

use anyhow::Result;
use serde::Deserialize;

/// The latest report as published by the tracking device. Any field may be
/// missing.
///
/// Speed is read from `speedkmph`, falling back to `speed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(from = "WireReport")]
pub struct RawReport {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed: Option<f64>,
}

#[derive(Deserialize)]
struct WireReport {
    latitude: Option<f64>,
    longitude: Option<f64>,
    speedkmph: Option<f64>,
    speed: Option<f64>,
}

impl From<WireReport> for RawReport {
    fn from(wire: WireReport) -> Self {
        Self {
            latitude: wire.latitude,
            longitude: wire.longitude,
            speed: wire.speedkmph.or(wire.speed),
        }
    }
}

/// A report with every field present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub latitude: f64,
    pub longitude: f64,
    /// km/h
    pub speed: f64,
}

impl RawReport {
    /// `None` unless latitude, longitude and speed are all present.
    pub fn complete(&self) -> Option<Reading> {
        Some(Reading {
            latitude: self.latitude?,
            longitude: self.longitude?,
            speed: self.speed?,
        })
    }
}

/// Abstraction over a source that holds only the most recent report
/// (not a queue).
#[async_trait::async_trait]
pub trait TelemetrySource: Send + Sync {
    /// The current report, or `None` when nothing has been published.
    async fn latest(&self) -> Result<Option<RawReport>>;
}

//! Reference data and tracked state for the bus network.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geo::Coord;

pub type StopId = u32;
pub type RouteId = u32;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(pub String);

impl BusId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fixed physical waypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: StopId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Average minutes to the next stop on the route.
    pub time_to_next: u32,
}

impl Stop {
    pub fn coord(&self) -> Coord {
        Coord::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub name: String,
}

/// Membership of a stop in a route. `position` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStop {
    pub route_id: RouteId,
    pub stop_id: StopId,
    pub position: u32,
}

/// Where a bus was last snapped to. Only the stop matcher commits a new value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehiclePosition {
    pub current_stop: Option<StopId>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl VehiclePosition {
    pub fn at(stop: StopId, updated_at: DateTime<Utc>) -> Self {
        Self {
            current_stop: Some(stop),
            updated_at: Some(updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bus {
    pub id: BusId,
    pub route_id: RouteId,
    pub position: VehiclePosition,
}

impl Bus {
    pub fn current_stop(&self) -> Option<StopId> {
        self.position.current_stop
    }
}

/// One raw telemetry reading, ordered by `seq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub seq: u64,
    pub bus_id: BusId,
    pub latitude: f64,
    pub longitude: f64,
    /// km/h
    pub speed: f64,
    pub received_at: DateTime<Utc>,
}

impl PositionSample {
    pub fn coord(&self) -> Coord {
        Coord::new(self.latitude, self.longitude)
    }
}

/// A sample before the store has assigned it a sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSample {
    pub bus_id: BusId,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub received_at: DateTime<Utc>,
}

impl NewSample {
    pub fn coord(&self) -> Coord {
        Coord::new(self.latitude, self.longitude)
    }
}

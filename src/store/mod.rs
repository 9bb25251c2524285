//! Storage seam for reference data, bus state and the sample log.
//!
//! [`Store`] is the only way the rest of the crate touches persisted data.
//! [`MemoryStore`] keeps everything in process and can mirror the sample log
//! to CSV. [`Network`] is the seed file format used to populate it.

mod memory;
mod seed;

pub use memory::MemoryStore;
pub use seed::{Network, SeedBus, SeedRoute};

use anyhow::Result;

use crate::model::{
    Bus, BusId, NewSample, PositionSample, Route, RouteId, RouteStop, Stop, StopId,
    VehiclePosition,
};

/// Each call is atomic on its own; readers get owned snapshots.
pub trait Store: Send + Sync {
    /// All stops in ascending id order.
    fn stops(&self) -> Result<Vec<Stop>>;

    fn stop(&self, id: StopId) -> Result<Option<Stop>>;

    fn route(&self, id: RouteId) -> Result<Option<Route>>;

    /// Memberships of `route`, ordered by position.
    fn route_stops(&self, route: RouteId) -> Result<Vec<RouteStop>>;

    fn bus(&self, id: &BusId) -> Result<Option<Bus>>;

    /// All buses in ascending id order.
    fn buses(&self) -> Result<Vec<Bus>>;

    /// Appends to the sample log and, when `position` is given, replaces the
    /// sample's bus position in the same step. Nothing is written unless both
    /// parts succeed.
    fn record_sample(
        &self,
        sample: NewSample,
        position: Option<VehiclePosition>,
    ) -> Result<PositionSample>;

    /// Most recent sample for `bus` by insertion order.
    fn latest_sample(&self, bus: &BusId) -> Result<Option<PositionSample>>;

    /// Every sample for `bus` in insertion order.
    fn samples(&self, bus: &BusId) -> Result<Vec<PositionSample>>;

    /// Replaces the bus's position. Fails if the bus does not exist.
    fn commit_position(&self, bus: &BusId, position: VehiclePosition) -> Result<()>;
}

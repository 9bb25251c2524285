use anyhow::{Context, Result, anyhow, bail};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use super::{Network, Store};
use crate::model::{
    Bus, BusId, NewSample, PositionSample, Route, RouteId, RouteStop, Stop, StopId,
    VehiclePosition,
};
use crate::output::{append_record, read_records};

#[derive(Default)]
struct State {
    stops: BTreeMap<StopId, Stop>,
    routes: BTreeMap<RouteId, Route>,
    route_stops: BTreeMap<RouteId, Vec<RouteStop>>,
    buses: BTreeMap<BusId, Bus>,
    samples: Vec<PositionSample>,
    next_seq: u64,
}

/// In-process [`Store`] behind a single `RwLock`.
///
/// When a sample log path is set, every appended sample is also written as a
/// CSV row so the history survives restarts (see [`MemoryStore::load_sample_log`]).
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    sample_log: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from validated seed data. Every bus starts without a position.
    pub fn from_network(network: &Network) -> Result<Self> {
        network.validate()?;

        let mut state = State {
            next_seq: 1,
            ..Default::default()
        };

        for stop in &network.stops {
            state.stops.insert(stop.id, stop.clone());
        }

        let by_name: BTreeMap<&str, StopId> = network
            .stops
            .iter()
            .map(|s| (s.name.as_str(), s.id))
            .collect();

        for route in &network.routes {
            state.routes.insert(
                route.id,
                Route {
                    id: route.id,
                    name: route.name.clone(),
                },
            );

            let mut members = Vec::with_capacity(route.stops.len());
            for (position, name) in (1u32..).zip(&route.stops) {
                let stop_id = *by_name
                    .get(name.as_str())
                    .ok_or_else(|| anyhow!("unknown stop '{name}'"))?;
                members.push(RouteStop {
                    route_id: route.id,
                    stop_id,
                    position,
                });
            }
            state.route_stops.insert(route.id, members);
        }

        for bus in &network.buses {
            state.buses.insert(
                bus.id.clone(),
                Bus {
                    id: bus.id.clone(),
                    route_id: bus.route,
                    position: VehiclePosition::default(),
                },
            );
        }

        info!(
            stops = state.stops.len(),
            routes = state.routes.len(),
            buses = state.buses.len(),
            "Network loaded"
        );

        Ok(Self {
            state: RwLock::new(state),
            sample_log: None,
        })
    }

    /// Mirrors appended samples to a CSV file at `path`.
    pub fn with_sample_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.sample_log = Some(path.into());
        self
    }

    /// Loads previously logged samples from `path` into memory without
    /// re-writing them. Rows for unknown buses are dropped.
    ///
    /// Returns the number of samples loaded.
    pub fn load_sample_log(&self, path: &Path) -> Result<usize> {
        let rows: Vec<PositionSample> = read_records(path)
            .with_context(|| format!("failed to read sample log '{}'", path.display()))?;

        let mut state = self.write()?;
        let mut loaded = 0;
        for row in rows {
            if !state.buses.contains_key(&row.bus_id) {
                debug!(bus = %row.bus_id, seq = row.seq, "Skipping logged sample for unknown bus");
                continue;
            }
            state.next_seq = state.next_seq.max(row.seq + 1);
            state.samples.push(row);
            loaded += 1;
        }
        state.samples.sort_by_key(|s| s.seq);

        Ok(loaded)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| anyhow!("store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| anyhow!("store lock poisoned"))
    }
}

impl Store for MemoryStore {
    fn stops(&self) -> Result<Vec<Stop>> {
        Ok(self.read()?.stops.values().cloned().collect())
    }

    fn stop(&self, id: StopId) -> Result<Option<Stop>> {
        Ok(self.read()?.stops.get(&id).cloned())
    }

    fn route(&self, id: RouteId) -> Result<Option<Route>> {
        Ok(self.read()?.routes.get(&id).cloned())
    }

    fn route_stops(&self, route: RouteId) -> Result<Vec<RouteStop>> {
        let mut members = self
            .read()?
            .route_stops
            .get(&route)
            .cloned()
            .unwrap_or_default();
        members.sort_by_key(|rs| rs.position);
        Ok(members)
    }

    fn bus(&self, id: &BusId) -> Result<Option<Bus>> {
        Ok(self.read()?.buses.get(id).cloned())
    }

    fn buses(&self) -> Result<Vec<Bus>> {
        Ok(self.read()?.buses.values().cloned().collect())
    }

    fn record_sample(
        &self,
        sample: NewSample,
        position: Option<VehiclePosition>,
    ) -> Result<PositionSample> {
        let mut state = self.write()?;
        if position.is_some() && !state.buses.contains_key(&sample.bus_id) {
            bail!("bus {} not found", sample.bus_id);
        }
        if state.next_seq == 0 {
            state.next_seq = 1;
        }

        let stored = PositionSample {
            seq: state.next_seq,
            bus_id: sample.bus_id,
            latitude: sample.latitude,
            longitude: sample.longitude,
            speed: sample.speed,
            received_at: sample.received_at,
        };

        // A failed log write leaves memory untouched.
        if let Some(path) = &self.sample_log {
            append_record(path, &stored)
                .with_context(|| format!("failed to append to sample log '{}'", path.display()))?;
        }

        state.next_seq += 1;
        if let Some(position) = position {
            if let Some(bus) = state.buses.get_mut(&stored.bus_id) {
                bus.position = position;
            }
        }
        state.samples.push(stored.clone());
        Ok(stored)
    }

    fn latest_sample(&self, bus: &BusId) -> Result<Option<PositionSample>> {
        Ok(self
            .read()?
            .samples
            .iter()
            .rev()
            .find(|s| &s.bus_id == bus)
            .cloned())
    }

    fn samples(&self, bus: &BusId) -> Result<Vec<PositionSample>> {
        Ok(self
            .read()?
            .samples
            .iter()
            .filter(|s| &s.bus_id == bus)
            .cloned()
            .collect())
    }

    fn commit_position(&self, bus: &BusId, position: VehiclePosition) -> Result<()> {
        let mut state = self.write()?;
        let entry = state
            .buses
            .get_mut(bus)
            .ok_or_else(|| anyhow!("bus {bus} not found"))?;
        entry.position = position;
        Ok(())
    }
}

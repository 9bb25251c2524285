//! Read-side queries served to riders: a bus dashboard and the list of buses
//! covering a trip.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::eta::{self, Arrival, Clock, SystemClock};
use crate::model::{Bus, BusId};
use crate::route::{self, Progress, RouteCache, RouteSequence};
use crate::store::Store;

pub const BUS_NOT_FOUND: &str = "Bus not found";
pub const POSITIONING: &str = "Positioning...";
pub const SELECT_A_STOP: &str = "Select a stop to see arrival time";
pub const WAITING_FOR_GPS_LABEL: &str = "Waiting for GPS...";
pub const PASSED_LABEL: &str = "Passed";
pub const CURRENT_LABEL: &str = "Current location";

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub bus_id: BusId,
    pub current_stop: String,
    pub has_location: bool,
    pub route: Vec<String>,
    /// One label per entry of `route`.
    pub stop_status: Vec<String>,
    pub user_stop: Option<String>,
    pub estimated_time: String,
    pub remaining_time: String,
    pub current_time: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DashboardView {
    NotFound { error: String },
    Ready(Dashboard),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableBus {
    pub bus: BusId,
    pub current_stop: String,
    pub arrival_time: String,
    pub remaining_time: String,
    pub destination: String,
}

/// Answers rider queries from store snapshots. Never writes.
pub struct Tracker<S: ?Sized, C = SystemClock> {
    store: Arc<S>,
    routes: RouteCache,
    clock: C,
}

impl<S: Store + ?Sized> Tracker<S, SystemClock> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: Store + ?Sized, C: Clock> Tracker<S, C> {
    pub fn with_clock(store: Arc<S>, clock: C) -> Self {
        Self {
            store,
            routes: RouteCache::new(),
            clock,
        }
    }

    /// Stop names in id order.
    pub fn stop_names(&self) -> Result<Vec<String>> {
        Ok(self.store.stops()?.into_iter().map(|s| s.name).collect())
    }

    fn sequence(&self, bus: &Bus) -> Result<Arc<RouteSequence>> {
        self.routes.get(self.store.as_ref(), bus.route_id)
    }

    fn latest_speed(&self, bus: &Bus) -> Result<Option<f64>> {
        Ok(self.store.latest_sample(&bus.id)?.map(|s| s.speed))
    }

    /// Where `bus` stands relative to the stop named `target`.
    pub fn progress(&self, bus: &Bus, target: &str) -> Result<Progress> {
        let sequence = self.sequence(bus)?;
        Ok(route::resolve(&sequence, bus, target))
    }

    /// Rider-facing arrival text for `bus` reaching `target`.
    pub fn arrival(&self, bus: &Bus, target: &str) -> Result<Arrival> {
        let progress = self.progress(bus, target)?;
        let speed = match progress {
            Progress::EnRoute(_) => self.latest_speed(bus)?,
            _ => None,
        };
        Ok(eta::arrival(&progress, speed, &self.clock))
    }

    fn current_stop_label(&self, bus: &Bus) -> Result<String> {
        let label = match bus.current_stop() {
            Some(id) => self
                .store
                .stop(id)?
                .map(|s| s.name)
                .unwrap_or_else(|| POSITIONING.to_string()),
            None => POSITIONING.to_string(),
        };
        Ok(label)
    }

    #[tracing::instrument(skip(self), fields(bus = %bus_id))]
    pub fn dashboard(&self, bus_id: &BusId, user_stop: Option<&str>) -> Result<DashboardView> {
        let Some(bus) = self.store.bus(bus_id)? else {
            return Ok(DashboardView::NotFound {
                error: BUS_NOT_FOUND.to_string(),
            });
        };

        let arrival = match user_stop {
            Some(stop) => self.arrival(&bus, stop)?,
            None => Arrival::status(SELECT_A_STOP),
        };

        let sequence = self.sequence(&bus)?;
        let now = self.clock.now();
        let current = bus.current_stop().and_then(|id| sequence.index_of_stop(id));

        let mut stop_status = Vec::with_capacity(sequence.stops().len());
        let mut cumulative = 0u32;
        for (i, _) in sequence.stops().iter().enumerate() {
            let label = match current {
                None => WAITING_FOR_GPS_LABEL.to_string(),
                Some(c) if i < c => PASSED_LABEL.to_string(),
                Some(c) if i == c => CURRENT_LABEL.to_string(),
                Some(_) => {
                    cumulative += sequence.stops()[i - 1].time_to_next;
                    eta::format_clock(eta::add_minutes(now, f64::from(cumulative)))
                }
            };
            stop_status.push(label);
        }

        debug!(estimated_time = %arrival.estimated_time, "Dashboard built");

        Ok(DashboardView::Ready(Dashboard {
            bus_id: bus.id.clone(),
            current_stop: self.current_stop_label(&bus)?,
            has_location: bus.current_stop().is_some(),
            route: sequence.names(),
            stop_status,
            user_stop: user_stop.map(str::to_string),
            estimated_time: arrival.estimated_time,
            remaining_time: arrival.remaining_time,
            current_time: eta::format_clock(now),
        }))
    }

    /// Buses whose route visits `start` strictly before `end`, with their
    /// arrival at `start`.
    #[tracing::instrument(skip(self))]
    pub fn available_buses(&self, start: &str, end: &str) -> Result<Vec<AvailableBus>> {
        let mut available = Vec::new();

        for bus in self.store.buses()? {
            let sequence = self.sequence(&bus)?;
            if !sequence.serves(start, end) {
                continue;
            }

            let arrival = self.arrival(&bus, start)?;
            available.push(AvailableBus {
                bus: bus.id.clone(),
                current_stop: self.current_stop_label(&bus)?,
                arrival_time: arrival.estimated_time,
                remaining_time: arrival.remaining_time,
                destination: end.to_string(),
            });
        }

        debug!(count = available.len(), "Available buses resolved");
        Ok(available)
    }
}

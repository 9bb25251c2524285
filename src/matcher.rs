//! Snaps raw GPS positions to the nearest stop on the bus's route.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::geo::Coord;
use crate::model::{Bus, BusId, NewSample, PositionSample, Stop, StopId, VehiclePosition};
use crate::route::RouteCache;
use crate::store::Store;

/// Radius within which a position counts as being at a stop. The boundary
/// itself is outside.
pub const GEOFENCE_KM: f64 = 0.2;

/// What a single match did to the bus's position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchOutcome {
    Moved {
        from: Option<StopId>,
        to: StopId,
        distance_km: f64,
    },
    Unchanged {
        stop: StopId,
    },
    /// No stop inside the geofence; the last known stop is kept.
    BetweenStops,
}

impl MatchOutcome {
    pub fn moved(&self) -> bool {
        matches!(self, MatchOutcome::Moved { .. })
    }
}

/// Nearest stop strictly inside `radius_km` of `at`.
///
/// `stops` must be in ascending id order; among equally distant stops the
/// first one wins.
pub fn nearest_stop<'a>(stops: &'a [Stop], at: Coord, radius_km: f64) -> Option<(&'a Stop, f64)> {
    let mut best: Option<(&Stop, f64)> = None;
    for stop in stops {
        let distance = at.distance_km(&stop.coord());
        if distance >= radius_km {
            continue;
        }
        match best {
            Some((_, d)) if distance >= d => {}
            _ => best = Some((stop, distance)),
        }
    }
    best
}

/// Result of matching one sample: the stored record and what it did to the
/// bus's position.
#[derive(Debug, Clone, PartialEq)]
pub struct Matched {
    pub sample: PositionSample,
    pub outcome: MatchOutcome,
}

/// Snaps positions to stops on the bus's own route.
#[derive(Debug)]
pub struct StopMatcher {
    radius_km: f64,
    routes: RouteCache,
}

impl Default for StopMatcher {
    fn default() -> Self {
        Self::with_radius_km(GEOFENCE_KM)
    }
}

impl StopMatcher {
    pub fn with_radius_km(radius_km: f64) -> Self {
        Self {
            radius_km,
            routes: RouteCache::new(),
        }
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    /// Stops of the bus's route in ascending id order.
    fn candidates<S: Store + ?Sized>(&self, store: &S, bus: &Bus) -> Result<Vec<Stop>> {
        let mut stops = self.routes.get(store, bus.route_id)?.stops().to_vec();
        stops.sort_by_key(|s| s.id);
        Ok(stops)
    }

    /// Matches `sample` against the stops of `bus`'s route and records it.
    ///
    /// The sample and a changed position are written in one store call, so
    /// a failed tick leaves neither behind.
    pub fn apply<S: Store + ?Sized>(&self, store: &S, bus: &Bus, sample: NewSample) -> Result<Matched> {
        let stops = self.candidates(store, bus)?;
        let outcome = self.decide(&stops, bus.current_stop(), sample.coord());

        let position = match outcome {
            MatchOutcome::Moved { to, .. } => Some(VehiclePosition::at(to, sample.received_at)),
            _ => None,
        };
        let sample = store.record_sample(sample, position)?;

        if let MatchOutcome::Moved { to, distance_km, .. } = outcome {
            let name = stops
                .iter()
                .find(|s| s.id == to)
                .map(|s| s.name.as_str())
                .unwrap_or_default();
            info!(bus = %bus.id, stop = name, distance_km, "Updated current stop");
        } else {
            debug!(bus = %bus.id, ?outcome, "Current stop unchanged");
        }

        Ok(Matched { sample, outcome })
    }

    /// Rebuilds a bus's snapped stop by matching its logged samples in order.
    ///
    /// Used after loading a sample log so a restart resumes from the last
    /// known stop instead of "awaiting position".
    pub fn replay<S: Store + ?Sized>(&self, store: &S, bus_id: &BusId) -> Result<Option<StopId>> {
        let Some(bus) = store.bus(bus_id)? else {
            return Ok(None);
        };
        let stops = self.candidates(store, &bus)?;

        let mut current = bus.current_stop();
        let mut last_change = None;
        for sample in store.samples(bus_id)? {
            if let MatchOutcome::Moved { to, .. } = self.decide(&stops, current, sample.coord()) {
                current = Some(to);
                last_change = Some(sample.received_at);
            }
        }

        if let (Some(stop), Some(at)) = (current, last_change) {
            store.commit_position(bus_id, VehiclePosition::at(stop, at))?;
            info!(bus = %bus_id, stop, "Restored current stop from sample log");
        }

        Ok(current)
    }

    fn decide(&self, stops: &[Stop], current: Option<StopId>, at: Coord) -> MatchOutcome {
        match nearest_stop(stops, at, self.radius_km) {
            None => MatchOutcome::BetweenStops,
            Some((stop, _)) if Some(stop.id) == current => MatchOutcome::Unchanged { stop: stop.id },
            Some((stop, distance_km)) => MatchOutcome::Moved {
                from: current,
                to: stop.id,
                distance_km,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Network, SeedBus, SeedRoute};
    use chrono::Utc;

    fn stop(id: StopId, name: &str, lat: f64, lon: f64) -> Stop {
        Stop {
            id,
            name: name.to_string(),
            latitude: lat,
            longitude: lon,
            time_to_next: 2,
        }
    }

    fn store() -> MemoryStore {
        let network = Network {
            stops: vec![
                stop(1, "A", 10.0, 78.0),
                stop(2, "B", 10.0, 78.0020),
                stop(3, "C", 10.0, 78.0100),
            ],
            routes: vec![SeedRoute {
                id: 1,
                name: "Main".to_string(),
                stops: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            }],
            buses: vec![SeedBus {
                id: BusId::new("101"),
                route: 1,
            }],
        };
        MemoryStore::from_network(&network).unwrap()
    }

    fn bus(store: &MemoryStore) -> Bus {
        store.bus(&BusId::new("101")).unwrap().unwrap()
    }

    fn fix(bus: &str, lon: f64) -> NewSample {
        NewSample {
            bus_id: BusId::new(bus),
            latitude: 10.0,
            longitude: lon,
            speed: 20.0,
            received_at: Utc::now(),
        }
    }

    fn apply_at(matcher: &StopMatcher, store: &MemoryStore, lon: f64) -> MatchOutcome {
        matcher.apply(store, &bus(store), fix("101", lon)).unwrap().outcome
    }

    #[test]
    fn test_snaps_to_stop_inside_geofence() {
        let store = store();
        let matched = StopMatcher::default()
            .apply(&store, &bus(&store), fix("101", 78.0001))
            .unwrap();
        assert_eq!(store.latest_sample(&BusId::new("101")).unwrap(), Some(matched.sample));

        match matched.outcome {
            MatchOutcome::Moved { from, to, distance_km } => {
                assert_eq!(from, None);
                assert_eq!(to, 1);
                assert!(distance_km < 0.012);
            }
            other => panic!("expected a move, got {other:?}"),
        }
        assert_eq!(bus(&store).current_stop(), Some(1));
    }

    #[test]
    fn test_same_coordinate_twice_writes_once() {
        let store = store();
        let matcher = StopMatcher::default();

        let first = apply_at(&matcher, &store, 78.0019);
        let stamped = bus(&store).position;
        let second = apply_at(&matcher, &store, 78.0019);

        assert!(first.moved());
        assert_eq!(second, MatchOutcome::Unchanged { stop: 2 });
        assert_eq!(bus(&store).position, stamped);
    }

    #[test]
    fn test_between_stops_keeps_last_known() {
        let store = store();
        let matcher = StopMatcher::default();
        apply_at(&matcher, &store, 78.0);

        let outcome = apply_at(&matcher, &store, 78.0060);

        assert_eq!(outcome, MatchOutcome::BetweenStops);
        assert_eq!(bus(&store).current_stop(), Some(1));
    }

    #[test]
    fn test_never_assigns_outside_geofence() {
        let stops = vec![stop(1, "A", 10.0, 78.0)];
        for step in 0..400 {
            let at = Coord::new(10.0, 78.0 + step as f64 * 0.00001);
            if let Some((s, d)) = nearest_stop(&stops, at, GEOFENCE_KM) {
                assert!(d < GEOFENCE_KM);
                assert!(at.distance_km(&s.coord()) < GEOFENCE_KM);
            }
        }
    }

    #[test]
    fn test_exact_radius_is_excluded() {
        let stops = vec![stop(1, "A", 10.0, 78.0)];
        let at = Coord::new(10.0, 78.001);
        let d = at.distance_km(&stops[0].coord());

        assert!(nearest_stop(&stops, at, d).is_none());
        assert!(nearest_stop(&stops, at, d + 1e-9).is_some());
    }

    #[test]
    fn test_custom_radius() {
        let store = store();
        let wide = StopMatcher::with_radius_km(0.5);
        assert_eq!(wide.radius_km(), 0.5);

        let outcome = apply_at(&wide, &store, 78.0050);
        assert!(matches!(outcome, MatchOutcome::Moved { to: 2, .. }));
    }

    #[test]
    fn test_equal_distance_prefers_lower_id() {
        let stops = vec![stop(4, "Gate 1", 10.0, 78.001), stop(9, "Gate 2", 10.0, 78.001)];
        let (winner, _) = nearest_stop(&stops, Coord::new(10.0, 78.0), GEOFENCE_KM).unwrap();
        assert_eq!(winner.id, 4);
    }

    #[test]
    fn test_replay_restores_last_snapped_stop() {
        let store = store();
        let id = BusId::new("101");
        for lon in [78.0, 78.0060, 78.0100, 78.0070] {
            store.record_sample(fix("101", lon), None).unwrap();
        }

        let restored = StopMatcher::default().replay(&store, &id).unwrap();
        assert_eq!(restored, Some(3));
        assert_eq!(bus(&store).current_stop(), Some(3));
    }

    fn two_routes() -> MemoryStore {
        let network = Network {
            stops: vec![
                stop(1, "A", 10.0, 78.0),
                stop(2, "B", 10.0, 78.0020),
                stop(3, "C", 10.0, 78.0100),
                stop(4, "X", 10.0, 78.0106),
                stop(5, "Y", 10.0, 78.0300),
            ],
            routes: vec![
                SeedRoute {
                    id: 1,
                    name: "Main".to_string(),
                    stops: vec!["A".to_string(), "B".to_string(), "C".to_string()],
                },
                SeedRoute {
                    id: 2,
                    name: "Spur".to_string(),
                    stops: vec!["X".to_string(), "Y".to_string()],
                },
            ],
            buses: vec![
                SeedBus {
                    id: BusId::new("101"),
                    route: 1,
                },
                SeedBus {
                    id: BusId::new("202"),
                    route: 2,
                },
            ],
        };
        MemoryStore::from_network(&network).unwrap()
    }

    #[test]
    fn test_only_stops_on_own_route_are_candidates() {
        let store = two_routes();
        let matcher = StopMatcher::default();
        apply_at(&matcher, &store, 78.0020);

        // X is nearer, but only C is on route 1
        let outcome = apply_at(&matcher, &store, 78.0105);
        assert!(matches!(outcome, MatchOutcome::Moved { from: Some(2), to: 3, .. }));

        // Y is the only stop in range and belongs to route 2
        assert_eq!(apply_at(&matcher, &store, 78.0300), MatchOutcome::BetweenStops);
        assert_eq!(bus(&store).current_stop(), Some(3));

        let spur = store.bus(&BusId::new("202")).unwrap().unwrap();
        let other = matcher.apply(&store, &spur, fix("202", 78.0105)).unwrap();
        assert!(matches!(other.outcome, MatchOutcome::Moved { to: 4, .. }));
    }

    #[test]
    fn test_replay_ignores_other_routes() {
        let store = two_routes();
        let id = BusId::new("101");
        for lon in [78.0020, 78.0300] {
            store.record_sample(fix("101", lon), None).unwrap();
        }

        assert_eq!(StopMatcher::default().replay(&store, &id).unwrap(), Some(2));
    }
}

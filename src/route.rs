//! Ordered stop sequences and where a bus is along them.

use anyhow::{Result, anyhow, bail};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::model::{Bus, RouteId, Stop, StopId};
use crate::store::Store;

/// A route's stops in travel order, built once and shared.
#[derive(Debug, Clone)]
pub struct RouteSequence {
    route_id: RouteId,
    stops: Vec<Stop>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<StopId, usize>,
}

impl RouteSequence {
    /// `stops` must already be sorted by route position.
    pub fn new(route_id: RouteId, stops: Vec<Stop>) -> Self {
        let mut by_name = HashMap::with_capacity(stops.len());
        let mut by_id = HashMap::with_capacity(stops.len());
        for (i, stop) in stops.iter().enumerate() {
            by_name.entry(stop.name.clone()).or_insert(i);
            by_id.entry(stop.id).or_insert(i);
        }
        Self {
            route_id,
            stops,
            by_name,
            by_id,
        }
    }

    /// Resolves memberships through the store, ordered by position.
    pub fn load<S: Store + ?Sized>(store: &S, route_id: RouteId) -> Result<Self> {
        if store.route(route_id)?.is_none() {
            bail!("route {route_id} not found");
        }
        let members = store.route_stops(route_id)?;
        let mut stops = Vec::with_capacity(members.len());
        for member in members {
            let stop = store
                .stop(member.stop_id)?
                .ok_or_else(|| anyhow!("route {route_id} references missing stop {}", member.stop_id))?;
            stops.push(stop);
        }
        Ok(Self::new(route_id, stops))
    }

    pub fn route_id(&self) -> RouteId {
        self.route_id
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn names(&self) -> Vec<String> {
        self.stops.iter().map(|s| s.name.clone()).collect()
    }

    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn index_of_stop(&self, id: StopId) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    /// True when both names are on the route and `from` comes strictly before `to`.
    pub fn serves(&self, from: &str, to: &str) -> bool {
        match (self.index_of_name(from), self.index_of_name(to)) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }
}

/// Per-route cache of [`RouteSequence`]s. Route membership is static at
/// runtime, so entries live until explicitly invalidated.
#[derive(Debug, Default)]
pub struct RouteCache {
    entries: RwLock<HashMap<RouteId, Arc<RouteSequence>>>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<S: Store + ?Sized>(&self, store: &S, route_id: RouteId) -> Result<Arc<RouteSequence>> {
        if let Some(hit) = self
            .entries
            .read()
            .map_err(|_| anyhow!("route cache lock poisoned"))?
            .get(&route_id)
        {
            return Ok(Arc::clone(hit));
        }

        let built = Arc::new(RouteSequence::load(store, route_id)?);
        debug!(route_id, stops = built.stops().len(), "Built route sequence");

        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("route cache lock poisoned"))?;
        Ok(Arc::clone(entries.entry(route_id).or_insert(built)))
    }

    /// Drops the cached sequence for `route_id`; the next lookup rebuilds it.
    pub fn invalidate(&self, route_id: RouteId) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&route_id);
        }
    }
}

/// Where a bus stands relative to a rider's stop.
#[derive(Debug, Clone)]
pub enum Progress {
    InvalidStop,
    AwaitingPosition,
    AlreadyPassed,
    Arrived,
    EnRoute(Span),
}

/// The stretch of route between the bus's snapped stop and the target.
#[derive(Debug, Clone)]
pub struct Span {
    pub sequence: Arc<RouteSequence>,
    pub current: usize,
    pub target: usize,
}

impl Span {
    /// Stops from the current one up to and including the target.
    pub fn stops(&self) -> &[Stop] {
        &self.sequence.stops()[self.current..=self.target]
    }
}

/// Locates `bus` and `target` on the bus's route.
pub fn resolve(sequence: &Arc<RouteSequence>, bus: &Bus, target: &str) -> Progress {
    let Some(target) = sequence.index_of_name(target) else {
        return Progress::InvalidStop;
    };
    let Some(current_stop) = bus.current_stop() else {
        return Progress::AwaitingPosition;
    };
    let Some(current) = sequence.index_of_stop(current_stop) else {
        return Progress::InvalidStop;
    };

    if target < current {
        Progress::AlreadyPassed
    } else if target == current {
        Progress::Arrived
    } else {
        Progress::EnRoute(Span {
            sequence: Arc::clone(sequence),
            current,
            target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BusId, VehiclePosition};
    use crate::store::{MemoryStore, Network, SeedBus, SeedRoute};

    fn stop(id: StopId, name: &str) -> Stop {
        Stop {
            id,
            name: name.to_string(),
            latitude: 10.0,
            longitude: 78.0 + id as f64 * 0.01,
            time_to_next: 5,
        }
    }

    fn sequence() -> Arc<RouteSequence> {
        Arc::new(RouteSequence::new(
            1,
            vec![stop(10, "A"), stop(20, "B"), stop(30, "C"), stop(40, "D")],
        ))
    }

    fn bus_at(stop: Option<StopId>) -> Bus {
        Bus {
            id: BusId::new("101"),
            route_id: 1,
            position: VehiclePosition {
                current_stop: stop,
                updated_at: None,
            },
        }
    }

    #[test]
    fn test_unknown_target_is_invalid() {
        let progress = resolve(&sequence(), &bus_at(Some(10)), "Z");
        assert!(matches!(progress, Progress::InvalidStop));
    }

    #[test]
    fn test_unknown_target_wins_over_missing_position() {
        let progress = resolve(&sequence(), &bus_at(None), "Z");
        assert!(matches!(progress, Progress::InvalidStop));
    }

    #[test]
    fn test_no_position_is_awaiting() {
        let progress = resolve(&sequence(), &bus_at(None), "C");
        assert!(matches!(progress, Progress::AwaitingPosition));
    }

    #[test]
    fn test_current_stop_off_route_is_invalid() {
        let progress = resolve(&sequence(), &bus_at(Some(99)), "C");
        assert!(matches!(progress, Progress::InvalidStop));
    }

    #[test]
    fn test_same_index_is_arrived() {
        let progress = resolve(&sequence(), &bus_at(Some(30)), "C");
        assert!(matches!(progress, Progress::Arrived));
    }

    #[test]
    fn test_earlier_target_is_passed() {
        let progress = resolve(&sequence(), &bus_at(Some(30)), "A");
        assert!(matches!(progress, Progress::AlreadyPassed));
    }

    #[test]
    fn test_later_target_is_en_route() {
        match resolve(&sequence(), &bus_at(Some(20)), "D") {
            Progress::EnRoute(span) => {
                assert_eq!(span.current, 1);
                assert_eq!(span.target, 3);
                let names: Vec<&str> = span.stops().iter().map(|s| s.name.as_str()).collect();
                assert_eq!(names, vec!["B", "C", "D"]);
            }
            other => panic!("expected en route, got {other:?}"),
        }
    }

    #[test]
    fn test_serves_requires_forward_order() {
        let seq = sequence();
        assert!(seq.serves("A", "C"));
        assert!(!seq.serves("C", "A"));
        assert!(!seq.serves("B", "B"));
        assert!(!seq.serves("A", "Z"));
    }

    #[test]
    fn test_cache_reuses_and_invalidates() {
        let network = Network {
            stops: vec![stop(1, "A"), stop(2, "B")],
            routes: vec![SeedRoute {
                id: 5,
                name: "Loop".to_string(),
                stops: vec!["B".to_string(), "A".to_string()],
            }],
            buses: vec![SeedBus {
                id: BusId::new("101"),
                route: 5,
            }],
        };
        let store = MemoryStore::from_network(&network).unwrap();
        let cache = RouteCache::new();

        let first = cache.get(&store, 5).unwrap();
        let second = cache.get(&store, 5).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.names(), vec!["B", "A"]);

        cache.invalidate(5);
        let rebuilt = cache.get(&store, 5).unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(rebuilt.route_id(), 5);

        assert!(cache.get(&store, 6).is_err());
    }
}

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashSet;

use crate::model::{BusId, RouteId, Stop};

/// Reference data for a bus network, stored as JSON on disk:
/// ```json
/// {
///   "stops": [{ "id": 1, "name": "GCE Thanjavur", "latitude": 10.69478,
///               "longitude": 78.97539, "time_to_next": 6 }],
///   "routes": [{ "id": 1, "name": "Main City Route", "stops": ["GCE Thanjavur"] }],
///   "buses": [{ "id": "101", "route": 1 }]
/// }
/// ```
/// Route stops are listed by name in travel order; positions start at 1.
#[derive(Debug, Clone, Deserialize)]
pub struct Network {
    pub stops: Vec<Stop>,
    pub routes: Vec<SeedRoute>,
    #[serde(default)]
    pub buses: Vec<SeedBus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedRoute {
    pub id: RouteId,
    pub name: String,
    pub stops: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedBus {
    pub id: BusId,
    pub route: RouteId,
}

impl Network {
    /// Loads and validates a network from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read network file '{path}'"))?;
        Self::from_json(&content).with_context(|| format!("invalid network file '{path}'"))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let network: Network = serde_json::from_str(content)?;
        network.validate()?;
        Ok(network)
    }

    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for stop in &self.stops {
            if !ids.insert(stop.id) {
                bail!("duplicate stop id {}", stop.id);
            }
            if !names.insert(stop.name.as_str()) {
                bail!("duplicate stop name '{}'", stop.name);
            }
        }

        let mut route_ids = HashSet::new();
        for route in &self.routes {
            if !route_ids.insert(route.id) {
                bail!("duplicate route id {}", route.id);
            }
            let mut seen = HashSet::new();
            for name in &route.stops {
                if !names.contains(name.as_str()) {
                    bail!("route '{}' references unknown stop '{name}'", route.name);
                }
                if !seen.insert(name.as_str()) {
                    bail!("route '{}' visits stop '{name}' twice", route.name);
                }
            }
        }

        let mut bus_ids = HashSet::new();
        for bus in &self.buses {
            if !bus_ids.insert(&bus.id) {
                bail!("duplicate bus id {}", bus.id);
            }
            if !route_ids.contains(&bus.route) {
                bail!("bus {} assigned to unknown route {}", bus.id, bus.route);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "stops": [
            {"id": 1, "name": "A", "latitude": 10.0, "longitude": 78.0, "time_to_next": 4},
            {"id": 2, "name": "B", "latitude": 10.0, "longitude": 78.002, "time_to_next": 0}
        ],
        "routes": [{"id": 1, "name": "Main", "stops": ["A", "B"]}],
        "buses": [{"id": "101", "route": 1}]
    }"#;

    #[test]
    fn test_parse_minimal_network() {
        let network = Network::from_json(MINIMAL).unwrap();
        assert_eq!(network.stops.len(), 2);
        assert_eq!(network.routes[0].stops, vec!["A", "B"]);
        assert_eq!(network.buses[0].id, BusId::new("101"));
    }

    #[test]
    fn test_rejects_unknown_route_stop() {
        let json = MINIMAL.replace(r#"["A", "B"]"#, r#"["A", "C"]"#);
        let err = Network::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("unknown stop 'C'"));
    }

    #[test]
    fn test_rejects_duplicate_stop_name() {
        let json = MINIMAL.replace(r#""name": "B""#, r#""name": "A""#);
        assert!(Network::from_json(&json).is_err());
    }

    #[test]
    fn test_rejects_bus_on_unknown_route() {
        let json = MINIMAL.replace(r#""route": 1"#, r#""route": 9"#);
        let err = Network::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("unknown route 9"));
    }

    #[test]
    fn test_buses_default_to_empty() {
        let json = r#"{"stops": [], "routes": []}"#;
        let network = Network::from_json(json).unwrap();
        assert!(network.buses.is_empty());
    }
}

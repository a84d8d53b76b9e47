// AirQ Exporter - Station registry
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Station registry loading.
//!
//! The registry is a JSON document listing every monitoring station, where it
//! is, whether it is in service, and which vendor API tag carries each of its
//! pollutants:
//!
//! ```json
//! {
//!   "AirQualityStation": [
//!     {
//!       "station_id": "B1F",
//!       "station_name": "Basement 1",
//!       "location": { "latitude": 25.04, "longitude": 121.56 },
//!       "status": "UP",
//!       "api_names": { "pm25": "B1F.PM25", "o3": "None" }
//!     }
//!   ]
//! }
//! ```
//!
//! A tag of `"None"` means the station does not report that pollutant.

use airq::{Pollutant, Station};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

/// Tag value marking an unsubscribed pollutant.
const NO_TAG: &str = "None";

/// Operational status of a station.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StationStatus {
    #[default]
    Up,
    Down,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(rename = "AirQualityStation", default)]
    stations: Vec<StationEntry>,
}

#[derive(Debug, Deserialize)]
struct StationEntry {
    station_id: String,
    #[serde(default)]
    station_name: Option<String>,
    location: Location,
    #[serde(default)]
    status: StationStatus,
    #[serde(default)]
    api_names: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    latitude: f64,
    longitude: f64,
}

/// A station plus the API tags it is polled through.
#[derive(Debug, Clone)]
pub struct RegisteredStation {
    pub station: Station,
    pub status: StationStatus,
    /// API tag per subscribed pollutant.
    pub tags: BTreeMap<Pollutant, String>,
}

impl RegisteredStation {
    pub fn is_up(&self) -> bool {
        self.status == StationStatus::Up
    }
}

/// All configured stations, in file order.
#[derive(Debug, Clone, Default)]
pub struct StationRegistry {
    stations: Vec<RegisteredStation>,
}

impl StationRegistry {
    /// Load the registry from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Parse the registry from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: RegistryFile = serde_json::from_str(json)?;

        let mut seen = HashSet::new();
        let mut stations = Vec::with_capacity(file.stations.len());

        for entry in file.stations {
            if !seen.insert(entry.station_id.clone()) {
                return Err(ConfigError::DuplicateStation(entry.station_id));
            }

            let mut tags = BTreeMap::new();
            for (name, tag) in entry.api_names {
                if tag == NO_TAG {
                    continue;
                }
                let pollutant: Pollutant =
                    name.parse().map_err(|_| ConfigError::UnknownPollutant {
                        station: entry.station_id.clone(),
                        name: name.clone(),
                    })?;
                tags.insert(pollutant, tag);
            }

            let mut station = Station::new(
                entry.station_id,
                entry.location.latitude,
                entry.location.longitude,
            )
            .with_pollutants(tags.keys().copied());
            if let Some(name) = entry.station_name {
                station = station.with_name(name);
            }

            debug!(
                "Registered station {} ({:?}, {} tags)",
                station.id,
                entry.status,
                tags.len()
            );

            stations.push(RegisteredStation {
                station,
                status: entry.status,
                tags,
            });
        }

        if stations.is_empty() {
            warn!("Station registry is empty");
        }

        Ok(Self { stations })
    }

    pub fn stations(&self) -> &[RegisteredStation] {
        &self.stations
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Number of stations currently in service.
    pub fn up_count(&self) -> usize {
        self.stations.iter().filter(|s| s.is_up()).count()
    }
}

/// Registry loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Station {station}: unknown pollutant {name}")]
    UnknownPollutant { station: String, name: String },

    #[error("Duplicate station id: {0}")]
    DuplicateStation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const REGISTRY: &str = r#"{
        "AirQualityStation": [
            {
                "station_id": "B1F",
                "station_name": "Basement 1",
                "location": {"latitude": 25.04, "longitude": 121.56},
                "status": "UP",
                "api_names": {"pm25": "B1F.PM25", "co": "B1F.CO", "o3": "None"}
            },
            {
                "station_id": "ROOF",
                "location": {"latitude": 25.05, "longitude": 121.57},
                "status": "DOWN",
                "api_names": {"temperature": "ROOF.T"}
            }
        ]
    }"#;

    #[test]
    fn test_parse_registry() {
        let registry = StationRegistry::from_json(REGISTRY).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.up_count(), 1);

        let b1f = &registry.stations()[0];
        assert!(b1f.is_up());
        assert_eq!(b1f.station.name, "Basement 1");
        assert_eq!(b1f.tags.len(), 2);
        assert_eq!(b1f.tags[&Pollutant::Pm25], "B1F.PM25");
        assert!(b1f.station.subscribes(Pollutant::Co));
        assert!(!b1f.station.subscribes(Pollutant::O3));

        let roof = &registry.stations()[1];
        assert_eq!(roof.status, StationStatus::Down);
        assert_eq!(roof.station.name, "ROOF");
    }

    #[test]
    fn test_unknown_pollutant() {
        let json = r#"{"AirQualityStation": [{
            "station_id": "X",
            "location": {"latitude": 0, "longitude": 0},
            "api_names": {"so2": "X.SO2"}
        }]}"#;
        let err = StationRegistry::from_json(json).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnknownPollutant { ref station, ref name } if station == "X" && name == "so2"
        ));
    }

    #[test]
    fn test_duplicate_station() {
        let json = r#"{"AirQualityStation": [
            {"station_id": "X", "location": {"latitude": 0, "longitude": 0}},
            {"station_id": "X", "location": {"latitude": 1, "longitude": 1}}
        ]}"#;
        assert!(matches!(
            StationRegistry::from_json(json),
            Err(ConfigError::DuplicateStation(_))
        ));
    }

    #[test]
    fn test_status_defaults_to_up() {
        let json = r#"{"AirQualityStation": [
            {"station_id": "X", "location": {"latitude": 0, "longitude": 0}}
        ]}"#;
        let registry = StationRegistry::from_json(json).unwrap();
        assert!(registry.stations()[0].is_up());
        assert!(registry.stations()[0].tags.is_empty());
    }

    #[test]
    fn test_empty_registry() {
        let registry = StationRegistry::from_json("{}").unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(REGISTRY.as_bytes()).unwrap();
        file.flush().unwrap();

        let registry = StationRegistry::from_file(file.path()).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            StationRegistry::from_file("/nonexistent/stations.json"),
            Err(ConfigError::FileNotFound(_))
        ));
    }
}

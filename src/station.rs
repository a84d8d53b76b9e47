// AirQ - Air Quality Index engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Station identity.

use crate::pollutant::Pollutant;
use crate::rolling::StationId;
use std::collections::BTreeSet;

/// A monitoring station. Identity is fixed once created; its rolling state
/// lives in the [`RollingAggregator`](crate::RollingAggregator).
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub pollutants: BTreeSet<Pollutant>,
}

impl Station {
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            latitude,
            longitude,
            pollutants: BTreeSet::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_pollutants(mut self, pollutants: impl IntoIterator<Item = Pollutant>) -> Self {
        self.pollutants.extend(pollutants);
        self
    }

    pub fn subscribes(&self, pollutant: Pollutant) -> bool {
        self.pollutants.contains(&pollutant)
    }

    /// Label values `(station_id, latitude, longitude)` for published series.
    ///
    /// Coordinates always carry a fractional part (`121.0`, not `121`).
    pub fn labels(&self) -> [String; 3] {
        [
            self.id.clone(),
            format!("{:?}", self.latitude),
            format!("{:?}", self.longitude),
        ]
    }
}

// AirQ - Air Quality Index engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Pollutant identifiers and invalid-reading detection
//!
//! Every species a station can report maps to one [`Pollutant`] variant.
//! Parsing an identifier that is not listed here is an error, never a
//! silently ignored reading.

use crate::error::AqiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel codes the sensor API reports instead of a reading.
pub const SENTINEL_CODES: [f64; 2] = [-1.0, -2.0];

/// Returns true if `value` is one of the vendor's "no valid reading" codes.
///
/// The codes are the same for every pollutant.
pub fn is_sentinel(value: f64) -> bool {
    SENTINEL_CODES.iter().any(|code| *code == value)
}

/// A measured species reported by a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    Temperature,
    Humidity,
    Co2,
    Co,
    Pm25,
    Pm10,
    O3,
    Voc,
    Hc,
}

impl Pollutant {
    /// All pollutants, in publication order.
    pub const ALL: [Pollutant; 9] = [
        Pollutant::Temperature,
        Pollutant::Humidity,
        Pollutant::Co2,
        Pollutant::Co,
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::O3,
        Pollutant::Voc,
        Pollutant::Hc,
    ];

    /// Identifier used in station configs and log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Pollutant::Temperature => "temperature",
            Pollutant::Humidity => "humidity",
            Pollutant::Co2 => "co2",
            Pollutant::Co => "co",
            Pollutant::Pm25 => "pm25",
            Pollutant::Pm10 => "pm10",
            Pollutant::O3 => "o3",
            Pollutant::Voc => "voc",
            Pollutant::Hc => "hc",
        }
    }

    /// Unit the sensor API reports this pollutant in.
    pub fn unit(&self) -> &'static str {
        match self {
            Pollutant::Temperature => "celsius",
            Pollutant::Humidity => "percentage",
            Pollutant::Co2 | Pollutant::Co => "ppm",
            Pollutant::Pm25 | Pollutant::Pm10 => "microgram_cubic_meter",
            Pollutant::O3 | Pollutant::Voc | Pollutant::Hc => "ppb",
        }
    }

    /// Gauge name, `air_quality_<pollutant>_<unit>`.
    pub fn metric_name(&self) -> String {
        format!("air_quality_{}_{}", self.as_str(), self.unit())
    }

    /// Gauge help text.
    pub fn description(&self) -> &'static str {
        match self {
            Pollutant::Temperature => "Temperature in Celsius",
            Pollutant::Humidity => "Relative humidity in percentage",
            Pollutant::Co2 => "CO2 concentration in parts per million",
            Pollutant::Co => "CO concentration in parts per million",
            Pollutant::Pm25 => "PM2.5 concentration in micrograms per cubic meter",
            Pollutant::Pm10 => "PM10 concentration in micrograms per cubic meter",
            Pollutant::O3 => "O3 concentration in parts per billion",
            Pollutant::Voc => "VOC concentration in parts per billion",
            Pollutant::Hc => "HC concentration in parts per billion",
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pollutant {
    type Err = AqiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pollutant::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AqiError::UnknownPollutant(s.to_string()))
    }
}

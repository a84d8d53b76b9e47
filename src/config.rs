// AirQ - Air Quality Index engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Engine configuration.

use crate::breakpoint::UnitScales;
use crate::error::{AqiError, Result};
use crate::pollutant::Pollutant;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Milliseconds per hour.
pub const HOUR_MS: u64 = 3_600_000;

/// Default AQI at or above which a station is flagged abnormal.
pub const DEFAULT_ABNORMAL_THRESHOLD: f64 = 151.0;

/// Master configuration for the index engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// AQI at or above this value sets the abnormal flag.
    pub abnormal_threshold: f64,

    /// Sub-index definitions, one per breakpoint-table column used.
    pub indicators: Vec<IndicatorConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            abnormal_threshold: DEFAULT_ABNORMAL_THRESHOLD,
            indicators: vec![
                IndicatorConfig::new("O3_8", Pollutant::O3, 8).with_scale(1000.0),
                IndicatorConfig::new("O3_1", Pollutant::O3, 1).with_scale(1000.0),
                IndicatorConfig::new("PM25", Pollutant::Pm25, 24),
                IndicatorConfig::new("PM10", Pollutant::Pm10, 24),
                IndicatorConfig::new("CO", Pollutant::Co, 8),
            ],
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Replace the abnormal threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.abnormal_threshold = threshold;
        self
    }

    /// Override the horizon of one indicator.
    pub fn set_horizon(&mut self, name: &str, hours: u32) -> Result<()> {
        let indicator = self
            .indicators
            .iter_mut()
            .find(|i| i.name == name)
            .ok_or_else(|| AqiError::UnknownPollutant(name.to_string()))?;
        indicator.horizon_hours = hours;
        Ok(())
    }

    /// Check the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.abnormal_threshold.is_finite() {
            return Err(AqiError::InvalidConfig(format!(
                "abnormal_threshold must be finite, got {}",
                self.abnormal_threshold
            )));
        }

        let mut seen = HashSet::new();
        for indicator in &self.indicators {
            if !seen.insert(indicator.name.as_str()) {
                return Err(AqiError::InvalidConfig(format!(
                    "duplicate indicator {}",
                    indicator.name
                )));
            }
            if indicator.horizon_hours == 0 {
                return Err(AqiError::InvalidConfig(format!(
                    "indicator {} has a zero horizon",
                    indicator.name
                )));
            }
            if !(indicator.scale.is_finite() && indicator.scale > 0.0) {
                return Err(AqiError::InvalidConfig(format!(
                    "indicator {} has invalid scale {}",
                    indicator.name, indicator.scale
                )));
            }
        }
        Ok(())
    }

    /// Per-column multipliers handed to the breakpoint loader.
    pub fn unit_scales(&self) -> UnitScales {
        self.indicators
            .iter()
            .map(|i| (i.name.clone(), i.scale))
            .collect()
    }

    /// Longest horizon any indicator asks of `pollutant`, in milliseconds.
    pub fn retention_ms(&self, pollutant: Pollutant) -> Option<u64> {
        self.indicators
            .iter()
            .filter(|i| i.pollutant == pollutant)
            .map(IndicatorConfig::horizon_ms)
            .max()
    }
}

/// One AQI sub-index: a breakpoint column fed by a pollutant's trailing mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    /// Breakpoint-table column name (e.g. `O3_8`).
    pub name: String,

    /// Pollutant whose buffer feeds the trailing mean.
    pub pollutant: Pollutant,

    /// Trailing-mean horizon in hours.
    pub horizon_hours: u32,

    /// Multiplier from the table's unit to the sample unit, applied at load.
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl IndicatorConfig {
    pub fn new(name: impl Into<String>, pollutant: Pollutant, horizon_hours: u32) -> Self {
        Self {
            name: name.into(),
            pollutant,
            horizon_hours,
            scale: 1.0,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn horizon_ms(&self) -> u64 {
        u64::from(self.horizon_hours) * HOUR_MS
    }
}

// AirQ - Air Quality Index engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Per-station, per-pollutant rolling sample buffers.
//!
//! Buffers only ever hold validated readings: sentinel codes, non-finite
//! values and values outside the pollutant's physical domain are dropped at
//! ingestion. The averaging horizon is chosen per query, so a single ozone
//! buffer serves both the 1 h and the 8 h mean. Retention per pollutant is
//! the longest horizon any query will ask for.

use crate::config::{EngineConfig, HOUR_MS};
use crate::pollutant::{is_sentinel, Pollutant};
use std::collections::{HashMap, VecDeque};

/// Unique identifier for a station
pub type StationId = String;

/// Retention for pollutants without a configured horizon.
pub const DEFAULT_RETENTION_MS: u64 = 24 * HOUR_MS;

/// A timestamped reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp_ms: u64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp_ms: u64, value: f64) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }
}

/// What happened to an ingested sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IngestOutcome {
    Accepted,
    /// Vendor "no valid reading" code.
    Sentinel,
    /// NaN or infinite.
    NonFinite,
    /// Outside `[min, max]` for the pollutant.
    OutOfDomain { min: f64, max: f64 },
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Accepted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IngestOutcome::Accepted => "accepted",
            IngestOutcome::Sentinel => "sentinel",
            IngestOutcome::NonFinite => "non_finite",
            IngestOutcome::OutOfDomain { .. } => "out_of_domain",
        }
    }
}

/// Keyed store of rolling buffers, one per (station, pollutant).
#[derive(Debug, Default)]
pub struct RollingAggregator {
    /// Samples per key, ordered by timestamp.
    buffers: HashMap<(StationId, Pollutant), VecDeque<Sample>>,
    /// Physical domain per pollutant; pollutants without one accept any finite value.
    domains: HashMap<Pollutant, (f64, f64)>,
    /// Retention per pollutant in milliseconds.
    retention: HashMap<Pollutant, u64>,
}

impl RollingAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregator with retention taken from the engine's indicator horizons.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut aggregator = Self::new();
        for pollutant in Pollutant::ALL {
            if let Some(ms) = config.retention_ms(pollutant) {
                aggregator.set_retention(pollutant, ms);
            }
        }
        aggregator
    }

    /// Declare the valid `[min, max]` range for a pollutant.
    pub fn set_domain(&mut self, pollutant: Pollutant, min: f64, max: f64) {
        self.domains.insert(pollutant, (min, max));
    }

    pub fn with_domain(mut self, pollutant: Pollutant, min: f64, max: f64) -> Self {
        self.set_domain(pollutant, min, max);
        self
    }

    pub fn domain(&self, pollutant: Pollutant) -> Option<(f64, f64)> {
        self.domains.get(&pollutant).copied()
    }

    /// Keep samples of `pollutant` for at least `retention_ms`.
    pub fn set_retention(&mut self, pollutant: Pollutant, retention_ms: u64) {
        self.retention.insert(pollutant, retention_ms);
    }

    pub fn retention_ms(&self, pollutant: Pollutant) -> u64 {
        self.retention
            .get(&pollutant)
            .copied()
            .unwrap_or(DEFAULT_RETENTION_MS)
    }

    /// Validate a reading and append it to its buffer.
    ///
    /// Rejected readings are logged and dropped; they never reach the buffer.
    pub fn ingest(&mut self, station_id: &str, pollutant: Pollutant, sample: Sample) -> IngestOutcome {
        let outcome = self.validate(pollutant, sample.value);
        if !outcome.is_accepted() {
            log::warn!(
                "Station {}: dropped {} = {} ({})",
                station_id,
                pollutant,
                sample.value,
                outcome.as_str()
            );
            return outcome;
        }

        log::debug!("Station {}: {} = {}", station_id, pollutant, sample.value);

        let samples = self
            .buffers
            .entry((station_id.to_string(), pollutant))
            .or_default();

        // Keep time order even if a late reading arrives.
        let position = samples.partition_point(|s| s.timestamp_ms <= sample.timestamp_ms);
        samples.insert(position, sample);

        let newest = samples.back().map_or(sample.timestamp_ms, |s| s.timestamp_ms);
        let retention = self.retention_ms(pollutant);
        self.prune(station_id, pollutant, newest, retention);

        outcome
    }

    /// Unweighted mean of the readings in `(now - horizon, now]`.
    ///
    /// Entries older than the pollutant's retention are evicted first. `None`
    /// when the window holds no reading.
    pub fn trailing_mean(
        &mut self,
        station_id: &str,
        pollutant: Pollutant,
        horizon_ms: u64,
        now_ms: u64,
    ) -> Option<f64> {
        let retention = self.retention_ms(pollutant);
        self.prune(station_id, pollutant, now_ms, retention);

        let samples = self.buffers.get(&(station_id.to_string(), pollutant))?;
        let cutoff = now_ms.checked_sub(horizon_ms);

        let (sum, count) = samples
            .iter()
            .filter(|s| s.timestamp_ms <= now_ms && cutoff.map_or(true, |c| s.timestamp_ms > c))
            .fold((0.0, 0usize), |(sum, count), s| (sum + s.value, count + 1));

        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }

    /// Samples currently buffered for one key.
    pub fn samples(&self, station_id: &str, pollutant: Pollutant) -> Option<&VecDeque<Sample>> {
        self.buffers.get(&(station_id.to_string(), pollutant))
    }

    /// Buffer length for one key (zero if never written).
    pub fn len(&self, station_id: &str, pollutant: Pollutant) -> usize {
        self.samples(station_id, pollutant).map_or(0, VecDeque::len)
    }

    /// Total sample count across all buffers.
    pub fn total_samples(&self) -> usize {
        self.buffers.values().map(VecDeque::len).sum()
    }

    /// Check if every buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffers.values().all(VecDeque::is_empty)
    }

    /// Drop every buffer of one station.
    pub fn remove_station(&mut self, station_id: &str) {
        self.buffers.retain(|(id, _), _| id != station_id);
    }

    /// Clear all data.
    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    fn validate(&self, pollutant: Pollutant, value: f64) -> IngestOutcome {
        if is_sentinel(value) {
            return IngestOutcome::Sentinel;
        }
        if !value.is_finite() {
            return IngestOutcome::NonFinite;
        }
        match self.domains.get(&pollutant) {
            Some(&(min, max)) if value < min || value > max => {
                IngestOutcome::OutOfDomain { min, max }
            }
            _ => IngestOutcome::Accepted,
        }
    }

    fn prune(&mut self, station_id: &str, pollutant: Pollutant, current_time_ms: u64, retention_ms: u64) {
        let Some(cutoff) = current_time_ms.checked_sub(retention_ms) else {
            return;
        };
        if let Some(samples) = self.buffers.get_mut(&(station_id.to_string(), pollutant)) {
            while let Some(front) = samples.front() {
                if front.timestamp_ms <= cutoff {
                    samples.pop_front();
                } else {
                    break;
                }
            }
        }
    }
}

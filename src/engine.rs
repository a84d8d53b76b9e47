// AirQ - Air Quality Index engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Index engine context.
//!
//! [`IndexContext`] is built once at startup from an [`EngineConfig`] and a
//! [`BreakpointTable`] and never mutated afterwards. Each evaluation borrows
//! it immutably alongside the caller's [`RollingAggregator`].
//!
//! ```text
//! samples ──▶ RollingAggregator ──trailing mean──▶ IndexInterpolator
//!                                                        │ sub-indices
//!                                                        ▼
//!                                   CompositeResult ◀── IndexCombiner
//! ```

use crate::breakpoint::BreakpointTable;
use crate::combine::{CompositeResult, IndexCombiner, SubIndices};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::interpolate::IndexInterpolator;
use crate::pollutant::Pollutant;
use crate::rolling::RollingAggregator;
use crate::station::Station;
use std::collections::HashMap;
use std::path::Path;

/// Immutable engine state: table, bands, indicators and validation domains.
#[derive(Debug, Clone)]
pub struct IndexContext {
    config: EngineConfig,
    table: BreakpointTable,
    combiner: IndexCombiner,
    domains: HashMap<Pollutant, (f64, f64)>,
}

impl IndexContext {
    /// Build a context, checking every configured indicator against the table.
    pub fn new(config: EngineConfig, table: BreakpointTable) -> Result<Self> {
        config.validate()?;

        let mut domains: HashMap<Pollutant, (f64, f64)> = HashMap::new();
        for indicator in &config.indicators {
            let (min, max) = table.domain(&indicator.name)?;
            domains
                .entry(indicator.pollutant)
                .and_modify(|d| *d = (d.0.min(min), d.1.max(max)))
                .or_insert((min, max));
        }

        let combiner = IndexCombiner::new(table.risk_table().clone(), config.abnormal_threshold);

        Ok(Self {
            config,
            table,
            combiner,
            domains,
        })
    }

    /// Context over the embedded breakpoint table.
    pub fn builtin(config: EngineConfig) -> Result<Self> {
        let table = BreakpointTable::builtin(&config.unit_scales())?;
        Self::new(config, table)
    }

    /// Context over a breakpoint table CSV file.
    pub fn from_path(config: EngineConfig, path: impl AsRef<Path>) -> Result<Self> {
        let table = BreakpointTable::from_path(path, &config.unit_scales())?;
        Self::new(config, table)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn table(&self) -> &BreakpointTable {
        &self.table
    }

    pub fn combiner(&self) -> &IndexCombiner {
        &self.combiner
    }

    /// Physical domain of a pollutant: the union of its indicators' ranges.
    pub fn domain(&self, pollutant: Pollutant) -> Option<(f64, f64)> {
        self.domains.get(&pollutant).copied()
    }

    /// An empty aggregator with this context's domains and retention.
    pub fn new_aggregator(&self) -> RollingAggregator {
        let mut aggregator = RollingAggregator::from_config(&self.config);
        for (pollutant, (min, max)) in &self.domains {
            aggregator.set_domain(*pollutant, *min, *max);
        }
        aggregator
    }

    /// Trailing mean and sub-index of every configured indicator for one station.
    ///
    /// Indicators whose pollutant the station does not report come out missing.
    pub fn sub_indices(
        &self,
        aggregator: &mut RollingAggregator,
        station: &Station,
        now_ms: u64,
    ) -> SubIndices {
        let interpolator = IndexInterpolator::new(&self.table);

        self.config
            .indicators
            .iter()
            .map(|indicator| {
                let mean = aggregator.trailing_mean(
                    &station.id,
                    indicator.pollutant,
                    indicator.horizon_ms(),
                    now_ms,
                );
                let index = match interpolator.interpolate(&indicator.name, mean) {
                    Ok(index) => index,
                    Err(e) => {
                        log::error!("Station {}: {}", station.id, e);
                        None
                    }
                };
                (indicator.name.clone(), index)
            })
            .collect()
    }

    /// Full evaluation pass for one station.
    pub fn evaluate(
        &self,
        aggregator: &mut RollingAggregator,
        station: &Station,
        now_ms: u64,
    ) -> CompositeResult {
        let sub_indices = self.sub_indices(aggregator, station, now_ms);
        let result = self.combiner.combine(&station.id, sub_indices);

        match result.aqi {
            Some(aqi) => log::info!("Station {}: AQI = {:.1}", station.id, aqi),
            None => log::warn!("Station {}: AQI = NaN", station.id),
        }
        result
    }

    /// Evaluate every station at the same instant.
    pub fn evaluate_all(
        &self,
        aggregator: &mut RollingAggregator,
        stations: &[Station],
        now_ms: u64,
    ) -> Vec<CompositeResult> {
        stations
            .iter()
            .map(|station| self.evaluate(aggregator, station, now_ms))
            .collect()
    }
}

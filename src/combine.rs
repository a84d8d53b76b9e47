// AirQ - Air Quality Index engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sub-index combination, risk classification and the abnormal flag.

use crate::risk::{RiskLevel, RiskTable};
use std::collections::BTreeMap;

/// Sub-indices keyed by indicator name. `None` means missing.
pub type SubIndices = BTreeMap<String, Option<f64>>;

/// Per-station result of one evaluation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeResult {
    pub station_id: String,
    pub sub_indices: SubIndices,
    /// Worst present sub-index, `None` when every sub-index is missing.
    pub aqi: Option<f64>,
    /// `None` exactly when `aqi` is `None`.
    pub risk: Option<RiskLevel>,
    /// `aqi >= threshold`; never set for a missing AQI.
    pub abnormal: bool,
}

impl CompositeResult {
    /// AQI as published: NaN when missing.
    pub fn aqi_value(&self) -> f64 {
        self.aqi.unwrap_or(f64::NAN)
    }

    /// Risk bucket ordinal as published: NaN when missing.
    pub fn risk_value(&self) -> f64 {
        self.risk.as_ref().map_or(f64::NAN, |r| r.ordinal as f64)
    }

    pub fn risk_label(&self) -> Option<&str> {
        self.risk.as_ref().map(|r| r.label.as_str())
    }
}

/// Worst-pollutant-wins combiner.
#[derive(Debug, Clone)]
pub struct IndexCombiner {
    risk: RiskTable,
    threshold: f64,
}

impl IndexCombiner {
    pub fn new(risk: RiskTable, threshold: f64) -> Self {
        Self { risk, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn risk_table(&self) -> &RiskTable {
        &self.risk
    }

    /// Combine one station's sub-indices.
    ///
    /// Any single present sub-index is enough to produce an AQI.
    pub fn combine(&self, station_id: &str, sub_indices: SubIndices) -> CompositeResult {
        let aqi = sub_indices
            .values()
            .filter_map(|v| v.filter(|x| !x.is_nan()))
            .reduce(f64::max);

        let risk = aqi.and_then(|a| self.risk.classify(a));
        let abnormal = aqi.map_or(false, |a| a >= self.threshold);

        CompositeResult {
            station_id: station_id.to_string(),
            sub_indices,
            aqi,
            risk,
            abnormal,
        }
    }
}

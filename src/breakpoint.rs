// AirQ - Air Quality Index engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Breakpoint table loading and lookup
//!
//! The table is a CSV file. The first column holds the AQI band as
//! `<int>～<int>`, every other column is one indicator with cells of the
//! form `<number> - <number>`. A `0 - 0` cell means the band does not apply
//! to that indicator.
//!
//! ```text
//! AQI,PM25,CO
//! 0～50,0.0 - 15.4,0 - 4.4
//! 51～100,15.5 - 35.4,4.5 - 9.4
//! ```
//!
//! Unit multipliers are applied once here, so every later lookup is already
//! in the unit the samples arrive in.

use crate::error::{AqiError, ParseError, Result};
use crate::risk::{RiskBucket, RiskTable};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// Taiwan MOENV AQI breakpoints (O3 columns in ppm).
pub const TAIWAN_AQI_CSV: &str = include_str!("../data/aqi_taiwan.csv");

/// Per-column multipliers from the table's unit to the sample unit.
pub type UnitScales = HashMap<String, f64>;

/// One segment of an indicator's piecewise-linear mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakpointEntry {
    pub concentration_low: f64,
    pub concentration_high: f64,
    pub index_low: f64,
    pub index_high: f64,
}

impl BreakpointEntry {
    pub fn new(
        concentration_low: f64,
        concentration_high: f64,
        index_low: f64,
        index_high: f64,
    ) -> Self {
        Self {
            concentration_low,
            concentration_high,
            index_low,
            index_high,
        }
    }

    /// Closed-interval membership.
    pub fn contains(&self, concentration: f64) -> bool {
        concentration >= self.concentration_low && concentration <= self.concentration_high
    }

    /// Linear interpolation inside this segment.
    pub fn interpolate(&self, concentration: f64) -> f64 {
        self.index_low
            + (concentration - self.concentration_low) * (self.index_high - self.index_low)
                / (self.concentration_high - self.concentration_low)
    }
}

/// Immutable per-indicator breakpoints plus the AQI bands they index into.
#[derive(Debug, Clone)]
pub struct BreakpointTable {
    /// Column names in file order.
    names: Vec<String>,
    columns: HashMap<String, Vec<BreakpointEntry>>,
    risk: RiskTable,
}

impl BreakpointTable {
    /// Build a table from already-decoded segments.
    ///
    /// Runs the same ordering checks as the CSV loader.
    pub fn from_entries(
        columns: Vec<(String, Vec<BreakpointEntry>)>,
        risk: RiskTable,
    ) -> Result<Self> {
        let mut names = Vec::with_capacity(columns.len());
        let mut map = HashMap::with_capacity(columns.len());
        for (name, entries) in columns {
            validate_column(&name, &entries)?;
            names.push(name.clone());
            map.insert(name, entries);
        }
        Ok(Self {
            names,
            columns: map,
            risk,
        })
    }

    /// The embedded Taiwan table.
    pub fn builtin(scales: &UnitScales) -> Result<Self> {
        Self::from_csv_str(TAIWAN_AQI_CSV, scales)
    }

    /// Load a table from a CSV file.
    pub fn from_path(path: impl AsRef<Path>, scales: &UnitScales) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, scales)
    }

    /// Load a table from CSV text.
    pub fn from_csv_str(csv: &str, scales: &UnitScales) -> Result<Self> {
        Self::from_reader(csv.as_bytes(), scales)
    }

    /// Load a table from any CSV source.
    pub fn from_reader<R: Read>(reader: R, scales: &UnitScales) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        if headers.len() < 2 {
            return Err(ParseError::EmptyTable.into());
        }
        let names: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

        let mut buckets = Vec::new();
        let mut columns: Vec<Vec<BreakpointEntry>> = vec![Vec::new(); names.len()];

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() != headers.len() {
                return Err(ParseError::CountMismatch {
                    row,
                    expected: headers.len(),
                    actual: record.len(),
                }
                .into());
            }

            let key = &record[0];
            let (index_low, index_high) = parse_bucket_key(key)?;
            buckets.push(RiskBucket::new(index_low, index_high, key));

            for (col, name) in names.iter().enumerate() {
                let cell = &record[col + 1];
                let Some((low, high)) = parse_range(name, cell)? else {
                    continue;
                };
                let scale = scales.get(name).copied().unwrap_or(1.0);
                columns[col].push(BreakpointEntry::new(
                    low * scale,
                    high * scale,
                    index_low,
                    index_high,
                ));
            }
        }

        if buckets.is_empty() {
            return Err(ParseError::EmptyTable.into());
        }

        // Bands come from row keys; the last one is open-ended.
        if let Some(last) = buckets.last_mut() {
            last.index_high = f64::INFINITY;
        }
        let risk = RiskTable::new(buckets)?;

        let table = Self::from_entries(names.into_iter().zip(columns).collect(), risk)?;
        log::debug!(
            "Loaded breakpoint table: {} indicators, {} bands",
            table.names.len(),
            table.risk.len()
        );
        Ok(table)
    }

    /// Segments of one indicator, lowest first.
    pub fn lookup(&self, indicator: &str) -> Result<&[BreakpointEntry]> {
        self.columns
            .get(indicator)
            .map(Vec::as_slice)
            .ok_or_else(|| AqiError::UnknownPollutant(indicator.to_string()))
    }

    /// Valid concentration domain of one indicator: `[first low, last high]`.
    pub fn domain(&self, indicator: &str) -> Result<(f64, f64)> {
        let entries = self.lookup(indicator)?;
        // validate_column guarantees at least one entry
        let first = entries[0];
        let last = entries[entries.len() - 1];
        Ok((first.concentration_low, last.concentration_high))
    }

    /// Indicator names in file order.
    pub fn indicators(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn contains(&self, indicator: &str) -> bool {
        self.columns.contains_key(indicator)
    }

    pub fn risk_table(&self) -> &RiskTable {
        &self.risk
    }
}

fn validate_column(name: &str, entries: &[BreakpointEntry]) -> Result<()> {
    if entries.is_empty() {
        return Err(ParseError::EmptyColumn(name.to_string()).into());
    }

    for (row, entry) in entries.iter().enumerate() {
        if !(entry.concentration_low < entry.concentration_high) {
            return Err(ParseError::DegenerateRange {
                column: name.to_string(),
                low: entry.concentration_low,
                high: entry.concentration_high,
            }
            .into());
        }
        if !(entry.index_low < entry.index_high) {
            return Err(ParseError::DegenerateRange {
                column: name.to_string(),
                low: entry.index_low,
                high: entry.index_high,
            }
            .into());
        }
        if row > 0 {
            let prev = &entries[row - 1];
            if entry.concentration_low < prev.concentration_high
                || entry.index_low < prev.index_high
            {
                return Err(ParseError::NonMonotonic {
                    column: name.to_string(),
                    row,
                }
                .into());
            }
        }
    }
    Ok(())
}

/// Parse `<int>～<int>` (fullwidth or ASCII tilde).
fn parse_bucket_key(key: &str) -> Result<(f64, f64)> {
    let invalid = || AqiError::from(ParseError::InvalidBucketKey(key.to_string()));

    let (low, high) = key
        .split_once('～')
        .or_else(|| key.split_once('~'))
        .ok_or_else(invalid)?;
    let low: u32 = low.trim().parse().map_err(|_| invalid())?;
    let high: u32 = high.trim().parse().map_err(|_| invalid())?;
    if low >= high {
        return Err(invalid());
    }
    Ok((f64::from(low), f64::from(high)))
}

/// Parse `<number> - <number>`. `None` for the `0 - 0` not-applicable marker.
fn parse_range(column: &str, cell: &str) -> Result<Option<(f64, f64)>> {
    let invalid = || {
        AqiError::from(ParseError::InvalidRange {
            column: column.to_string(),
            value: cell.to_string(),
        })
    };

    let (low, high) = cell.split_once('-').ok_or_else(invalid)?;
    let low: f64 = low.trim().parse().map_err(|_| invalid())?;
    let high: f64 = high.trim().parse().map_err(|_| invalid())?;
    if !low.is_finite() || !high.is_finite() || low < 0.0 {
        return Err(invalid());
    }

    if low == 0.0 && high == 0.0 {
        return Ok(None);
    }
    if low >= high {
        return Err(ParseError::DegenerateRange {
            column: column.to_string(),
            low,
            high,
        }
        .into());
    }
    Ok(Some((low, high)))
}

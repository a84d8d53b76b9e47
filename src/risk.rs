// AirQ - Air Quality Index engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Risk buckets and AQI classification.

use crate::error::{ParseError, Result};

/// One named AQI band.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskBucket {
    pub index_low: f64,
    pub index_high: f64,
    pub label: String,
}

impl RiskBucket {
    pub fn new(index_low: f64, index_high: f64, label: impl Into<String>) -> Self {
        Self {
            index_low,
            index_high,
            label: label.into(),
        }
    }
}

/// Classification result: the bucket position and its label.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskLevel {
    /// Zero-based position of the bucket, published as the risk gauge value.
    pub ordinal: usize,
    pub label: String,
}

/// Ordered, contiguous AQI bands. The last band is open-ended upward.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskTable {
    buckets: Vec<RiskBucket>,
}

impl RiskTable {
    /// Build a table, checking that bands are non-empty and increasing.
    pub fn new(buckets: Vec<RiskBucket>) -> Result<Self> {
        if buckets.is_empty() {
            return Err(ParseError::EmptyTable.into());
        }

        for (row, bucket) in buckets.iter().enumerate() {
            if !(bucket.index_low < bucket.index_high) {
                return Err(ParseError::DegenerateRange {
                    column: "AQI".to_string(),
                    low: bucket.index_low,
                    high: bucket.index_high,
                }
                .into());
            }
            if row > 0 && bucket.index_low < buckets[row - 1].index_high {
                return Err(ParseError::NonMonotonic {
                    column: "AQI".to_string(),
                    row,
                }
                .into());
            }
        }

        Ok(Self { buckets })
    }

    pub fn buckets(&self) -> &[RiskBucket] {
        &self.buckets
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Classify an AQI value.
    ///
    /// Bucket `i` owns `(high_{i-1}, high_i]`, so fractional values between an
    /// integer high bound and the next low bound go to the upper band.
    /// Values under the first bound clamp to the first bucket and anything past
    /// the last bound lands in the last. `None` only for a NaN input.
    pub fn classify(&self, aqi: f64) -> Option<RiskLevel> {
        if aqi.is_nan() {
            return None;
        }

        let ordinal = self
            .buckets
            .iter()
            .position(|b| aqi <= b.index_high)
            .unwrap_or(self.buckets.len() - 1);

        Some(RiskLevel {
            ordinal,
            label: self.buckets[ordinal].label.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epa_like() -> RiskTable {
        RiskTable::new(vec![
            RiskBucket::new(0.0, 50.0, "Good"),
            RiskBucket::new(51.0, 100.0, "Moderate"),
            RiskBucket::new(101.0, 150.0, "Unhealthy-Sensitive"),
            RiskBucket::new(151.0, f64::INFINITY, "Unhealthy"),
        ])
        .unwrap()
    }

    #[test]
    fn test_classify_edges() {
        let table = epa_like();
        assert_eq!(table.classify(0.0).unwrap().label, "Good");
        assert_eq!(table.classify(50.0).unwrap().label, "Good");
        assert_eq!(table.classify(50.5).unwrap().label, "Moderate");
        assert_eq!(table.classify(51.0).unwrap().label, "Moderate");
        assert_eq!(table.classify(150.0).unwrap().label, "Unhealthy-Sensitive");
        assert_eq!(table.classify(150.5).unwrap().label, "Unhealthy");
        assert_eq!(table.classify(150.9).unwrap().label, "Unhealthy");
        assert_eq!(table.classify(151.0).unwrap().label, "Unhealthy");
    }

    #[test]
    fn test_classify_clamps() {
        let table = epa_like();
        let high = table.classify(10_000.0).unwrap();
        assert_eq!(high.ordinal, 3);
        assert_eq!(table.classify(-5.0).unwrap().ordinal, 0);

        let capped = RiskTable::new(vec![
            RiskBucket::new(0.0, 50.0, "Good"),
            RiskBucket::new(51.0, 500.0, "Bad"),
        ])
        .unwrap();
        assert_eq!(capped.classify(600.0).unwrap().ordinal, 1);
    }

    #[test]
    fn test_classify_nan_is_missing() {
        assert!(epa_like().classify(f64::NAN).is_none());
    }

    #[test]
    fn test_rejects_overlap() {
        let result = RiskTable::new(vec![
            RiskBucket::new(0.0, 50.0, "a"),
            RiskBucket::new(40.0, 100.0, "b"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_empty() {
        assert!(RiskTable::new(Vec::new()).is_err());
    }
}

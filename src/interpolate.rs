// AirQ - Air Quality Index engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Concentration to sub-index interpolation.

use crate::breakpoint::{BreakpointEntry, BreakpointTable};
use crate::error::Result;

/// Maps trailing-mean concentrations to sub-indices through a breakpoint table.
#[derive(Debug, Clone, Copy)]
pub struct IndexInterpolator<'a> {
    table: &'a BreakpointTable,
}

impl<'a> IndexInterpolator<'a> {
    pub fn new(table: &'a BreakpointTable) -> Self {
        Self { table }
    }

    /// Sub-index for `concentration` on `indicator`'s breakpoints.
    ///
    /// Missing (or NaN) in gives missing out. Values outside the indicator's
    /// global range are missing too; there is no extrapolation. Fails only when
    /// the indicator has no column in the table.
    pub fn interpolate(&self, indicator: &str, concentration: Option<f64>) -> Result<Option<f64>> {
        let entries = self.table.lookup(indicator)?;
        Ok(concentration
            .filter(|c| c.is_finite())
            .and_then(|c| interpolate_entries(entries, c)))
    }
}

/// Piecewise-linear lookup over ordered segments.
///
/// A value that falls between the high bound of one segment and the low bound
/// of the next (the rounding gap of tables like `0 - 4.4`, `4.5 - 9.4`) is
/// bridged linearly between the two boundary points.
pub fn interpolate_entries(entries: &[BreakpointEntry], concentration: f64) -> Option<f64> {
    let first = entries.first()?;
    let last = entries.last()?;
    if concentration < first.concentration_low || concentration > last.concentration_high {
        return None;
    }

    if let Some(segment) = entries.iter().find(|e| e.contains(concentration)) {
        return Some(segment.interpolate(concentration));
    }

    entries.windows(2).find_map(|pair| {
        let (lower, upper) = (&pair[0], &pair[1]);
        if concentration > lower.concentration_high && concentration < upper.concentration_low {
            let bridge = BreakpointEntry::new(
                lower.concentration_high,
                upper.concentration_low,
                lower.index_high,
                upper.index_low,
            );
            Some(bridge.interpolate(concentration))
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoint::UnitScales;
    use crate::error::AqiError;
    use approx::assert_relative_eq;

    fn co_table() -> BreakpointTable {
        BreakpointTable::from_csv_str(
            "AQI,CO\n0～50,0 - 4.4\n51～100,4.5 - 9.4\n",
            &UnitScales::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_interpolate_inside_segment() {
        let table = co_table();
        let interp = IndexInterpolator::new(&table);
        let index = interp.interpolate("CO", Some(2.0)).unwrap().unwrap();
        assert_relative_eq!(index, 2.0 * 50.0 / 4.4, epsilon = 1e-9);
        assert_relative_eq!(index, 22.727, epsilon = 1e-3);
    }

    #[test]
    fn test_interpolate_at_boundaries() {
        let table = co_table();
        let interp = IndexInterpolator::new(&table);
        assert_relative_eq!(
            interp.interpolate("CO", Some(0.0)).unwrap().unwrap(),
            0.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            interp.interpolate("CO", Some(4.4)).unwrap().unwrap(),
            50.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            interp.interpolate("CO", Some(4.5)).unwrap().unwrap(),
            51.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            interp.interpolate("CO", Some(9.4)).unwrap().unwrap(),
            100.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_interpolate_bridges_gap() {
        let table = co_table();
        let interp = IndexInterpolator::new(&table);
        let index = interp.interpolate("CO", Some(4.45)).unwrap().unwrap();
        assert_relative_eq!(index, 50.5, epsilon = 1e-9);
    }

    #[test]
    fn test_interpolate_out_of_range_is_missing() {
        let table = co_table();
        let interp = IndexInterpolator::new(&table);
        assert_eq!(interp.interpolate("CO", Some(50.0)).unwrap(), None);
        assert_eq!(interp.interpolate("CO", Some(-0.1)).unwrap(), None);
    }

    #[test]
    fn test_interpolate_missing_propagates() {
        let table = co_table();
        let interp = IndexInterpolator::new(&table);
        assert_eq!(interp.interpolate("CO", None).unwrap(), None);
        assert_eq!(interp.interpolate("CO", Some(f64::NAN)).unwrap(), None);
    }

    #[test]
    fn test_interpolate_unknown_indicator() {
        let table = co_table();
        let interp = IndexInterpolator::new(&table);
        assert!(matches!(
            interp.interpolate("NO2", Some(1.0)),
            Err(AqiError::UnknownPollutant(_))
        ));
    }

    #[test]
    fn test_shared_boundary_is_continuous() {
        let entries = [
            BreakpointEntry::new(0.0, 10.0, 0.0, 50.0),
            BreakpointEntry::new(10.0, 20.0, 50.0, 100.0),
        ];
        assert_relative_eq!(
            interpolate_entries(&entries, 10.0).unwrap(),
            50.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            interpolate_entries(&entries, 15.0).unwrap(),
            75.0,
            epsilon = 1e-9
        );
    }
}

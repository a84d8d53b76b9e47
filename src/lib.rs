//! # AirQ - Air Quality Index engine
//!
//! Turns raw pollutant readings from monitoring stations into a composite
//! Air Quality Index, a categorical risk level and an abnormal flag.
//!
//! ## Key Features
//!
//! - **Breakpoint tables**: Piecewise-linear concentration to index mapping loaded from CSV
//! - **Rolling means**: Per-station, per-pollutant trailing averages over hour horizons
//! - **Worst pollutant wins**: The composite AQI is the maximum present sub-index
//! - **Missing-aware**: Sentinels, out-of-range values and empty windows propagate as missing
//!
//! ## Quick Start
//!
//! ```rust
//! use airq::{EngineConfig, IndexContext, Pollutant, Sample, Station, HOUR_MS};
//!
//! // Build the engine over the embedded breakpoint table
//! let context = IndexContext::builtin(EngineConfig::default()).unwrap();
//! let mut aggregator = context.new_aggregator();
//!
//! // Feed one CO reading (ppm)
//! let station = Station::new("B1F", 25.04, 121.56).with_pollutants([Pollutant::Co]);
//! let now = 10 * HOUR_MS;
//! aggregator.ingest("B1F", Pollutant::Co, Sample::new(now, 2.0));
//!
//! // Evaluate
//! let result = context.evaluate(&mut aggregator, &station, now);
//! assert!((result.aqi.unwrap() - 22.727).abs() < 0.01);
//! assert!(!result.abnormal);
//! ```
//!
//! ## Modules
//!
//! - [`breakpoint`]: Breakpoint table and its CSV loader
//! - [`interpolate`]: Concentration to sub-index mapping
//! - [`rolling`]: Trailing-mean buffers
//! - [`combine`]: Composite AQI, risk level and abnormal flag
//! - [`engine`]: Immutable context tying the pieces together

// Modules
pub mod breakpoint;
pub mod combine;
pub mod config;
pub mod engine;
pub mod error;
pub mod interpolate;
pub mod pollutant;
pub mod risk;
pub mod rolling;
pub mod station;

// Re-exports for convenient access
pub use breakpoint::{BreakpointEntry, BreakpointTable, UnitScales, TAIWAN_AQI_CSV};
pub use combine::{CompositeResult, IndexCombiner, SubIndices};
pub use config::{EngineConfig, IndicatorConfig, DEFAULT_ABNORMAL_THRESHOLD, HOUR_MS};
pub use engine::IndexContext;
pub use error::{AqiError, ParseError, Result};
pub use interpolate::IndexInterpolator;
pub use pollutant::{is_sentinel, Pollutant};
pub use risk::{RiskBucket, RiskLevel, RiskTable};
pub use rolling::{IngestOutcome, RollingAggregator, Sample, StationId};
pub use station::Station;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

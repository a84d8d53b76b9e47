// AirQ Exporter - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for air quality monitoring.
//!
//! Every station series carries `station_id`, `latitude` and `longitude`
//! labels. Missing values are published as NaN, never skipped.

use airq::{CompositeResult, IngestOutcome, Pollutant, Station};
use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_gauge_vec, register_int_counter, register_int_counter_vec, Encoder,
    Gauge, GaugeVec, IntCounter, IntCounterVec, TextEncoder,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::error;

/// Labels shared by every per-station series.
pub const STATION_LABELS: [&str; 3] = ["station_id", "latitude", "longitude"];

lazy_static! {
    // ============================================================
    // Station Readings
    // ============================================================

    /// One gauge per pollutant, e.g. `air_quality_pm25_microgram_cubic_meter`.
    pub static ref POLLUTANT_GAUGES: HashMap<Pollutant, GaugeVec> = Pollutant::ALL
        .iter()
        .map(|p| {
            let gauge = register_gauge_vec!(p.metric_name(), p.description(), &STATION_LABELS)
                .unwrap();
            (*p, gauge)
        })
        .collect();

    // ============================================================
    // Index Metrics
    // ============================================================

    /// Composite AQI.
    pub static ref AQI: GaugeVec = register_gauge_vec!(
        "air_quality_aqi",
        "Air Quality Index",
        &STATION_LABELS
    ).unwrap();

    /// Per-indicator sub-index (O3_8, O3_1, PM25, PM10, CO).
    pub static ref SUBINDEX: GaugeVec = register_gauge_vec!(
        "air_quality_subindex",
        "AQI sub-index per indicator",
        &["station_id", "latitude", "longitude", "indicator"]
    ).unwrap();

    /// Risk band ordinal (0 = lowest band).
    pub static ref RISK_LEVEL: GaugeVec = register_gauge_vec!(
        "air_quality_risk_level",
        "AQI risk band ordinal (0 = lowest band)",
        &STATION_LABELS
    ).unwrap();

    /// Abnormal flag (1 = AQI at or above threshold).
    pub static ref ABNORMAL: GaugeVec = register_gauge_vec!(
        "air_quality_abnormal",
        "AQI at or above the abnormal threshold (1=abnormal, 0=normal)",
        &STATION_LABELS
    ).unwrap();

    // ============================================================
    // Exporter Metrics
    // ============================================================

    /// Completed collection cycles.
    pub static ref CYCLES_TOTAL: IntCounter = register_int_counter!(
        "air_quality_exporter_cycles_total",
        "Completed collection cycles"
    ).unwrap();

    /// Failed tag fetches.
    pub static ref FETCH_ERRORS_TOTAL: IntCounter = register_int_counter!(
        "air_quality_exporter_fetch_errors_total",
        "Failed sensor API requests"
    ).unwrap();

    /// Readings dropped at ingestion (labeled by pollutant and reason).
    pub static ref REJECTED_SAMPLES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "air_quality_exporter_rejected_samples_total",
        "Readings dropped at ingestion",
        &["pollutant", "reason"]
    ).unwrap();

    /// Wall time of the last collection cycle.
    pub static ref LAST_CYCLE_DURATION_SECONDS: Gauge = register_gauge!(
        "air_quality_exporter_last_cycle_duration_seconds",
        "Duration of the last collection cycle in seconds"
    ).unwrap();
}

/// Destination for everything a collection cycle produces.
pub trait MetricsSink: Send + Sync {
    /// Raw reading of one pollutant; NaN when unavailable.
    fn publish_reading(&self, station: &Station, pollutant: Pollutant, value: f64);

    /// Sub-indices, AQI, risk band and abnormal flag of one station.
    fn publish_result(&self, station: &Station, result: &CompositeResult);

    fn record_rejected(&self, pollutant: Pollutant, outcome: IngestOutcome);

    fn record_fetch_error(&self);

    fn record_cycle(&self, duration: Duration);
}

/// Sink writing to the process-wide Prometheus registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusSink;

impl MetricsSink for PrometheusSink {
    fn publish_reading(&self, station: &Station, pollutant: Pollutant, value: f64) {
        let labels = station.labels();
        if let Some(gauge) = POLLUTANT_GAUGES.get(&pollutant) {
            gauge
                .with_label_values(&[labels[0].as_str(), labels[1].as_str(), labels[2].as_str()])
                .set(value);
        }
    }

    fn publish_result(&self, station: &Station, result: &CompositeResult) {
        let labels = station.labels();
        let station_labels = [labels[0].as_str(), labels[1].as_str(), labels[2].as_str()];

        for (indicator, value) in &result.sub_indices {
            SUBINDEX
                .with_label_values(&[
                    station_labels[0],
                    station_labels[1],
                    station_labels[2],
                    indicator.as_str(),
                ])
                .set(value.unwrap_or(f64::NAN));
        }

        AQI.with_label_values(&station_labels)
            .set(result.aqi_value());
        RISK_LEVEL
            .with_label_values(&station_labels)
            .set(result.risk_value());
        ABNORMAL
            .with_label_values(&station_labels)
            .set(if result.abnormal { 1.0 } else { 0.0 });
    }

    fn record_rejected(&self, pollutant: Pollutant, outcome: IngestOutcome) {
        REJECTED_SAMPLES_TOTAL
            .with_label_values(&[pollutant.as_str(), outcome.as_str()])
            .inc();
    }

    fn record_fetch_error(&self) {
        FETCH_ERRORS_TOTAL.inc();
    }

    fn record_cycle(&self, duration: Duration) {
        CYCLES_TOTAL.inc();
        LAST_CYCLE_DURATION_SECONDS.set(duration.as_secs_f64());
    }
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

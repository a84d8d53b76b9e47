// AirQ Exporter - Collection loop
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Periodic collection: fetch every reading, feed the engine, publish.
//!
//! A cycle runs in three phases. All tag fetches are issued concurrently and
//! joined; the joined readings are then ingested in registry order; finally
//! every station is evaluated at the same instant and published.

use crate::config::StationRegistry;
use crate::metrics::MetricsSink;
use crate::sensor::{FetchError, SensorClient};
use airq::{is_sentinel, CompositeResult, IndexContext, RollingAggregator, Sample};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Collector progress, shared with the HTTP handlers.
#[derive(Debug, Default)]
pub struct CollectorStatus {
    /// Completed cycles.
    pub cycles: AtomicU64,
    /// Failed fetches across all cycles.
    pub fetch_errors: AtomicU64,
    /// Evaluation instant of the last completed cycle (ms since epoch, 0 = none).
    pub last_cycle_ms: AtomicU64,
    /// Whether the loop is running.
    pub running: AtomicBool,
    shutdown: Notify,
}

impl CollectorStatus {
    /// Ready once the first cycle has published.
    pub fn is_ready(&self) -> bool {
        self.cycles.load(Ordering::SeqCst) > 0
    }

    /// Ask the loop to exit before its next cycle.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }
}

/// Summary of one collection cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub fetched: usize,
    pub fetch_errors: usize,
    pub rejected: usize,
    pub results: Vec<CompositeResult>,
}

/// Owns the rolling state and drives collection cycles.
pub struct Collector {
    context: IndexContext,
    registry: StationRegistry,
    aggregator: RollingAggregator,
    client: Arc<dyn SensorClient>,
    sink: Arc<dyn MetricsSink>,
    interval: Duration,
    status: Arc<CollectorStatus>,
}

impl Collector {
    pub fn new(
        context: IndexContext,
        registry: StationRegistry,
        client: Arc<dyn SensorClient>,
        sink: Arc<dyn MetricsSink>,
        interval: Duration,
    ) -> Self {
        let aggregator = context.new_aggregator();
        Self {
            context,
            registry,
            aggregator,
            client,
            sink,
            interval,
            status: Arc::new(CollectorStatus::default()),
        }
    }

    /// Get the shared status handle.
    pub fn status(&self) -> Arc<CollectorStatus> {
        Arc::clone(&self.status)
    }

    #[allow(dead_code)]
    pub fn aggregator(&self) -> &RollingAggregator {
        &self.aggregator
    }

    /// Run one fetch, ingest, evaluate, publish pass at `now_ms`.
    pub async fn run_cycle(&mut self, now_ms: u64) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();

        // Phase 1: fetch everything concurrently.
        let mut tasks = JoinSet::new();
        let mut spawned = HashMap::new();
        for (idx, entry) in self.registry.stations().iter().enumerate() {
            if !entry.is_up() {
                debug!("Station {} is down, not polling", entry.station.id);
                for pollutant in entry.tags.keys() {
                    self.sink.publish_reading(&entry.station, *pollutant, f64::NAN);
                }
                continue;
            }
            for (pollutant, tag) in &entry.tags {
                let client = Arc::clone(&self.client);
                let pollutant = *pollutant;
                let tag = tag.clone();
                let handle = tasks.spawn(async move {
                    let fetched = client.fetch(&tag).await;
                    (idx, pollutant, fetched)
                });
                spawned.insert(handle.id(), (idx, pollutant));
            }
        }

        let mut readings = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, reading)) => readings.push(reading),
                Err(e) => match spawned.get(&e.id()) {
                    // Still published below, as a failed reading.
                    Some(&(idx, pollutant)) => {
                        readings.push((idx, pollutant, Err(FetchError::Task(e.to_string()))))
                    }
                    None => {
                        error!("Fetch task failed: {}", e);
                        self.sink.record_fetch_error();
                        report.fetch_errors += 1;
                    }
                },
            }
        }
        readings.sort_by_key(|(idx, pollutant, _)| (*idx, *pollutant));

        // Phase 2: ingest and publish raw readings.
        let stations = self.registry.stations();
        for (idx, pollutant, fetched) in readings {
            let station = &stations[idx].station;
            let published = match fetched {
                Ok(value) => {
                    report.fetched += 1;
                    let outcome =
                        self.aggregator
                            .ingest(&station.id, pollutant, Sample::new(now_ms, value));
                    if outcome.is_accepted() {
                        info!("Station {}: {} = {}", station.id, pollutant, value);
                    } else {
                        self.sink.record_rejected(pollutant, outcome);
                        report.rejected += 1;
                    }
                    raw_gauge_value(value)
                }
                Err(e) => {
                    error!("Station {}: request failed for {}: {}", station.id, pollutant, e);
                    self.sink.record_fetch_error();
                    report.fetch_errors += 1;
                    f64::NAN
                }
            };
            self.sink.publish_reading(station, pollutant, published);
        }

        // Phase 3: evaluate every station at the same instant.
        for entry in stations {
            let result = self
                .context
                .evaluate(&mut self.aggregator, &entry.station, now_ms);
            self.sink.publish_result(&entry.station, &result);
            report.results.push(result);
        }

        let elapsed = started.elapsed();
        self.sink.record_cycle(elapsed);
        self.status.cycles.fetch_add(1, Ordering::SeqCst);
        self.status
            .fetch_errors
            .fetch_add(report.fetch_errors as u64, Ordering::SeqCst);
        self.status.last_cycle_ms.store(now_ms, Ordering::SeqCst);

        if report.fetch_errors > 0 {
            warn!(
                "Cycle finished with {} fetch errors ({} fetched, {:?})",
                report.fetch_errors, report.fetched, elapsed
            );
        } else {
            debug!(
                "Cycle finished: {} fetched, {} rejected in {:?}",
                report.fetched, report.rejected, elapsed
            );
        }

        report
    }

    /// Start the collection loop (runs until stopped).
    ///
    /// The first cycle runs immediately; ticks missed by a slow cycle are skipped.
    pub async fn run(mut self) {
        self.status.running.store(true, Ordering::SeqCst);
        info!(
            "Starting collection: {} stations ({} up), every {:?}",
            self.registry.len(),
            self.registry.up_count(),
            self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.status.shutdown.notified() => {}
            }
            if !self.status.running.load(Ordering::SeqCst) {
                info!("Collection stopped");
                break;
            }
            let report = self.run_cycle(now_ms()).await;
            let abnormal: Vec<&str> = report
                .results
                .iter()
                .filter(|r| r.abnormal)
                .map(|r| r.station_id.as_str())
                .collect();
            if !abnormal.is_empty() {
                warn!("Abnormal AQI at {} stations: {}", abnormal.len(), abnormal.join(", "));
            }
        }
    }
}

/// Raw gauge value for a fetched reading: sentinel codes publish as NaN.
pub fn raw_gauge_value(value: f64) -> f64 {
    if is_sentinel(value) {
        f64::NAN
    } else {
        value
    }
}

/// Wall clock in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsSink;
    use airq::{EngineConfig, IngestOutcome, Pollutant, Station, HOUR_MS};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves fixed values per tag; unknown tags fail.
    struct FakeClient {
        values: Mutex<HashMap<String, f64>>,
    }

    impl FakeClient {
        fn new(values: &[(&str, f64)]) -> Self {
            Self {
                values: Mutex::new(
                    values
                        .iter()
                        .map(|(tag, v)| (tag.to_string(), *v))
                        .collect(),
                ),
            }
        }

        fn set(&self, tag: &str, value: f64) {
            self.values.lock().unwrap().insert(tag.to_string(), value);
        }
    }

    #[async_trait]
    impl SensorClient for FakeClient {
        async fn fetch(&self, tag: &str) -> Result<f64, FetchError> {
            self.values
                .lock()
                .unwrap()
                .get(tag)
                .copied()
                .ok_or_else(|| FetchError::Status(404))
        }
    }

    /// Panics while fetching one tag, serves the rest from `inner`.
    struct PanickingClient {
        inner: FakeClient,
        panic_tag: &'static str,
    }

    #[async_trait]
    impl SensorClient for PanickingClient {
        async fn fetch(&self, tag: &str) -> Result<f64, FetchError> {
            if tag == self.panic_tag {
                panic!("sensor client crashed on {}", tag);
            }
            self.inner.fetch(tag).await
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        readings: Mutex<Vec<(String, Pollutant, f64)>>,
        results: Mutex<Vec<CompositeResult>>,
        rejected: Mutex<Vec<(Pollutant, IngestOutcome)>>,
        fetch_errors: AtomicU64,
        cycles: AtomicU64,
    }

    impl RecordingSink {
        fn reading(&self, station: &str, pollutant: Pollutant) -> Option<f64> {
            self.readings
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(s, p, _)| s == station && *p == pollutant)
                .map(|(_, _, v)| *v)
        }
    }

    impl MetricsSink for RecordingSink {
        fn publish_reading(&self, station: &Station, pollutant: Pollutant, value: f64) {
            self.readings
                .lock()
                .unwrap()
                .push((station.id.clone(), pollutant, value));
        }

        fn publish_result(&self, _station: &Station, result: &CompositeResult) {
            self.results.lock().unwrap().push(result.clone());
        }

        fn record_rejected(&self, pollutant: Pollutant, outcome: IngestOutcome) {
            self.rejected.lock().unwrap().push((pollutant, outcome));
        }

        fn record_fetch_error(&self) {
            self.fetch_errors.fetch_add(1, Ordering::SeqCst);
        }

        fn record_cycle(&self, _duration: Duration) {
            self.cycles.fetch_add(1, Ordering::SeqCst);
        }
    }

    const REGISTRY: &str = r#"{
        "AirQualityStation": [
            {
                "station_id": "B1F",
                "location": {"latitude": 25.04, "longitude": 121.56},
                "status": "UP",
                "api_names": {"co": "B1F.CO", "pm25": "B1F.PM25", "temperature": "B1F.T"}
            },
            {
                "station_id": "ROOF",
                "location": {"latitude": 25.05, "longitude": 121.57},
                "status": "DOWN",
                "api_names": {"pm25": "ROOF.PM25"}
            }
        ]
    }"#;

    fn collector(client: Arc<FakeClient>, sink: Arc<RecordingSink>) -> Collector {
        let context = IndexContext::builtin(EngineConfig::default()).unwrap();
        let registry = StationRegistry::from_json(REGISTRY).unwrap();
        Collector::new(context, registry, client, sink, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_cycle_publishes_readings_and_aqi() {
        let client = Arc::new(FakeClient::new(&[
            ("B1F.CO", 2.0),
            ("B1F.PM25", 10.0),
            ("B1F.T", 23.5),
            ("ROOF.PM25", 99.0),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let mut collector = collector(client, Arc::clone(&sink));

        let report = collector.run_cycle(10 * HOUR_MS).await;
        assert_eq!(report.fetched, 3);
        assert_eq!(report.fetch_errors, 0);
        assert_eq!(report.results.len(), 2);

        assert_eq!(sink.reading("B1F", Pollutant::Co), Some(2.0));
        assert_eq!(sink.reading("B1F", Pollutant::Temperature), Some(23.5));

        // CO 2.0 → 22.7, PM2.5 10 → 32.5; worst wins
        let b1f = &report.results[0];
        assert_eq!(b1f.station_id, "B1F");
        let aqi = b1f.aqi.unwrap();
        assert!((aqi - 10.0 * 50.0 / 15.4).abs() < 1e-9);
        assert!(!b1f.abnormal);

        assert_eq!(sink.cycles.load(Ordering::SeqCst), 1);
        assert!(collector.status().is_ready());
        assert_eq!(collector.status().last_cycle_ms.load(Ordering::SeqCst), 10 * HOUR_MS);
    }

    #[tokio::test]
    async fn test_down_station_publishes_nan() {
        let client = Arc::new(FakeClient::new(&[("ROOF.PM25", 99.0)]));
        let sink = Arc::new(RecordingSink::default());
        let mut collector = collector(client, Arc::clone(&sink));

        let report = collector.run_cycle(HOUR_MS).await;

        let roof = sink.reading("ROOF", Pollutant::Pm25).unwrap();
        assert!(roof.is_nan());
        assert_eq!(report.results[1].aqi, None);
        assert_eq!(collector.aggregator().len("ROOF", Pollutant::Pm25), 0);
    }

    #[tokio::test]
    async fn test_sentinel_published_as_nan_and_not_buffered() {
        let client = Arc::new(FakeClient::new(&[
            ("B1F.CO", -1.0),
            ("B1F.PM25", -2.0),
            ("B1F.T", 20.0),
        ]));
        let sink = Arc::new(RecordingSink::default());
        let mut collector = collector(client, Arc::clone(&sink));

        let report = collector.run_cycle(HOUR_MS).await;
        assert_eq!(report.rejected, 2);
        assert!(sink.reading("B1F", Pollutant::Co).unwrap().is_nan());
        assert!(sink.reading("B1F", Pollutant::Pm25).unwrap().is_nan());
        assert_eq!(collector.aggregator().len("B1F", Pollutant::Co), 0);

        let rejected = sink.rejected.lock().unwrap();
        assert!(rejected
            .iter()
            .all(|(_, outcome)| *outcome == IngestOutcome::Sentinel));

        // Nothing valid for any indicator: AQI missing, never abnormal
        assert_eq!(report.results[0].aqi, None);
        assert!(!report.results[0].abnormal);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_per_reading() {
        let client = Arc::new(FakeClient::new(&[("B1F.CO", 2.0)]));
        let sink = Arc::new(RecordingSink::default());
        let mut collector = collector(client, Arc::clone(&sink));

        let report = collector.run_cycle(HOUR_MS).await;
        assert_eq!(report.fetch_errors, 2);
        assert_eq!(sink.fetch_errors.load(Ordering::SeqCst), 2);
        assert!(sink.reading("B1F", Pollutant::Pm25).unwrap().is_nan());

        // CO alone still drives the AQI
        let aqi = report.results[0].aqi.unwrap();
        assert!((aqi - 2.0 * 50.0 / 4.4).abs() < 1e-9);
        assert_eq!(collector.status().fetch_errors.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicked_fetch_still_published() {
        let client = Arc::new(PanickingClient {
            inner: FakeClient::new(&[("B1F.CO", 2.0), ("B1F.T", 21.0)]),
            panic_tag: "B1F.PM25",
        });
        let sink = Arc::new(RecordingSink::default());
        let context = IndexContext::builtin(EngineConfig::default()).unwrap();
        let registry = StationRegistry::from_json(REGISTRY).unwrap();
        let mut collector = Collector::new(
            context,
            registry,
            client,
            Arc::clone(&sink) as Arc<dyn MetricsSink>,
            Duration::from_secs(300),
        );

        let report = collector.run_cycle(HOUR_MS).await;
        assert_eq!(report.fetch_errors, 1);
        assert_eq!(report.fetched, 2);
        assert_eq!(sink.fetch_errors.load(Ordering::SeqCst), 1);
        assert!(sink.reading("B1F", Pollutant::Pm25).unwrap().is_nan());
        assert_eq!(sink.reading("B1F", Pollutant::Co), Some(2.0));

        let aqi = report.results[0].aqi.unwrap();
        assert!((aqi - 2.0 * 50.0 / 4.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rolling_mean_across_cycles() {
        let client = Arc::new(FakeClient::new(&[("B1F.CO", 1.0)]));
        let sink = Arc::new(RecordingSink::default());
        let mut collector = collector(Arc::clone(&client), Arc::clone(&sink));

        collector.run_cycle(HOUR_MS).await;
        client.set("B1F.CO", 3.0);
        let report = collector.run_cycle(2 * HOUR_MS).await;

        // 8 h CO mean of 1.0 and 3.0
        let co = report.results[0].sub_indices["CO"].unwrap();
        assert!((co - 2.0 * 50.0 / 4.4).abs() < 1e-9);
        assert_eq!(sink.cycles.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_out_of_domain_kept_on_raw_gauge() {
        let client = Arc::new(FakeClient::new(&[("B1F.CO", 75.0)]));
        let sink = Arc::new(RecordingSink::default());
        let mut collector = collector(client, Arc::clone(&sink));

        let report = collector.run_cycle(HOUR_MS).await;
        assert_eq!(report.rejected, 1);
        assert_eq!(sink.reading("B1F", Pollutant::Co), Some(75.0));
        assert_eq!(collector.aggregator().len("B1F", Pollutant::Co), 0);
    }

    #[test]
    fn test_raw_gauge_value() {
        assert!(raw_gauge_value(-1.0).is_nan());
        assert!(raw_gauge_value(-2.0).is_nan());
        assert_eq!(raw_gauge_value(-3.0), -3.0);
        assert_eq!(raw_gauge_value(12.0), 12.0);
    }

    #[test]
    fn test_status_not_ready_initially() {
        let status = CollectorStatus::default();
        assert!(!status.is_ready());
    }

    #[tokio::test]
    async fn test_stopped_loop_exits() {
        let client = Arc::new(FakeClient::new(&[]));
        let sink = Arc::new(RecordingSink::default());
        let collector = collector(client, Arc::clone(&sink));
        let status = collector.status();

        let handle = tokio::spawn(collector.run());
        // First tick fires immediately.
        while !status.is_ready() {
            tokio::task::yield_now().await;
        }
        status.stop();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(sink.cycles.load(Ordering::SeqCst) >= 1);
    }
}

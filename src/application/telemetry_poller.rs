// Telemetry poller - single-flight polling of /data with connectivity tracking
use crate::application::device_api::{DeviceApi, DeviceError, HistoryPoint};
use crate::domain::charts::{time_label, ChartView, TrendCharts};
use crate::domain::connectivity::{ConnectivityState, Indicator, StalenessThresholds};
use crate::domain::sample::{Metric, OptimisticPatch, Sample, SampleStore};
use chrono::{Local, TimeZone, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub refresh_interval: Duration,
    pub request_timeout: Duration,
    pub startup_retry_delay: Duration,
    pub startup_retry_limit: u32,
    pub offline_after_failures: u32,
    pub watchdog_interval: Duration,
    pub staleness: StalenessThresholds,
    pub series_capacity: usize,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            startup_retry_delay: Duration::from_secs(2),
            startup_retry_limit: 3,
            offline_after_failures: 3,
            watchdog_interval: Duration::from_secs(5),
            staleness: StalenessThresholds {
                degraded_after: Duration::from_secs(75),
                offline_after: Duration::from_secs(150),
            },
            series_capacity: crate::domain::series::DEFAULT_CAPACITY,
        }
    }
}

/// Who asked for a poll, and whether a fresh cached sample may answer it.
#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    pub force: bool,
    pub source: &'static str,
}

impl PollOptions {
    pub fn forced(source: &'static str) -> Self {
        Self {
            force: true,
            source,
        }
    }

    pub fn if_stale(source: &'static str) -> Self {
        Self {
            force: false,
            source,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryStatus {
    pub connectivity: ConnectivityState,
    pub indicator: Indicator,
    pub consecutive_failures: u32,
    pub sample_age_secs: Option<f64>,
    pub last_error: Option<String>,
    pub sample: Option<Sample>,
}

#[derive(Debug)]
struct PollerState {
    connectivity: ConnectivityState,
    consecutive_failures: u32,
    last_success: Option<Instant>,
    /// Set by calibration commits so the next non-forced poll goes out.
    invalidated: bool,
    started_at: Instant,
    retry_pending: bool,
    last_error: Option<DeviceError>,
}

type InFlight = Shared<BoxFuture<'static, Result<Sample, DeviceError>>>;

struct PollerInner {
    device: Arc<dyn DeviceApi>,
    settings: PollerSettings,
    store: SampleStore,
    charts: Mutex<TrendCharts>,
    state: Mutex<PollerState>,
    in_flight: Mutex<Option<InFlight>>,
}

/// Cheap to clone; all clones drive the same poller.
#[derive(Clone)]
pub struct TelemetryPoller {
    inner: Arc<PollerInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TelemetryPoller {
    pub fn new(device: Arc<dyn DeviceApi>, settings: PollerSettings) -> Self {
        let charts = TrendCharts::new(settings.series_capacity);
        Self {
            inner: Arc::new(PollerInner {
                device,
                settings,
                store: SampleStore::new(),
                charts: Mutex::new(charts),
                state: Mutex::new(PollerState {
                    connectivity: ConnectivityState::Connecting,
                    consecutive_failures: 0,
                    last_success: None,
                    invalidated: false,
                    started_at: Instant::now(),
                    retry_pending: false,
                    last_error: None,
                }),
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn store(&self) -> &SampleStore {
        &self.inner.store
    }

    pub fn connectivity(&self) -> ConnectivityState {
        lock(&self.inner.state).connectivity
    }

    pub fn consecutive_failures(&self) -> u32 {
        lock(&self.inner.state).consecutive_failures
    }

    pub fn status(&self) -> TelemetryStatus {
        let state = lock(&self.inner.state);
        TelemetryStatus {
            connectivity: state.connectivity,
            indicator: state.connectivity.indicator(),
            consecutive_failures: state.consecutive_failures,
            sample_age_secs: state.last_success.map(|at| at.elapsed().as_secs_f64()),
            last_error: state.last_error.as_ref().map(ToString::to_string),
            sample: self.inner.store.latest(),
        }
    }

    pub fn chart_view(&self, metric: Metric) -> ChartView {
        lock(&self.inner.charts).chart(metric).view()
    }

    /// Fetches a sample, or joins the request already in flight.
    ///
    /// A non-forced poll is answered from the store while the last success
    /// is younger than the refresh interval and nothing invalidated it.
    pub async fn poll(&self, options: PollOptions) -> Result<Sample, DeviceError> {
        let request = {
            let mut slot = lock(&self.inner.in_flight);
            match slot.as_ref() {
                Some(in_flight) => {
                    tracing::debug!(source = options.source, "joining in-flight poll");
                    in_flight.clone()
                }
                None => {
                    if !options.force {
                        if let Some(sample) = self.fresh_sample() {
                            tracing::debug!(source = options.source, "poll answered from cache");
                            return Ok(sample);
                        }
                    }

                    let this = self.clone();
                    let source = options.source;
                    let task = tokio::spawn(async move { this.fetch(source).await });
                    let request = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(DeviceError::Network(format!("poll task aborted: {}", e)))
                        })
                    }
                    .boxed()
                    .shared();
                    *slot = Some(request.clone());
                    request
                }
            }
        };

        request.await
    }

    fn fresh_sample(&self) -> Option<Sample> {
        let state = lock(&self.inner.state);
        let last_success = state.last_success?;
        if state.invalidated || last_success.elapsed() >= self.inner.settings.refresh_interval {
            return None;
        }
        drop(state);
        self.inner.store.latest()
    }

    async fn fetch(&self, source: &'static str) -> Result<Sample, DeviceError> {
        let cache_buster = Utc::now().timestamp_millis().max(0) as u64;
        tracing::debug!(source, cache_buster, "polling device sample");

        let outcome = match tokio::time::timeout(
            self.inner.settings.request_timeout,
            self.inner.device.fetch_sample(cache_buster),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DeviceError::Network(format!(
                "no answer within {:?}",
                self.inner.settings.request_timeout
            ))),
        };

        match &outcome {
            Ok(sample) => self.record_success(sample),
            Err(error) => self.record_failure(error, source),
        }

        lock(&self.inner.in_flight).take();
        outcome
    }

    fn record_success(&self, sample: &Sample) {
        self.inner.store.replace(sample.clone());
        lock(&self.inner.charts).push_sample(sample, &time_label(sample.timestamp));

        let mut state = lock(&self.inner.state);
        if state.connectivity != ConnectivityState::Online {
            tracing::info!(
                previous = ?state.connectivity,
                "device reachable, connectivity online"
            );
        }
        state.consecutive_failures = 0;
        state.connectivity = ConnectivityState::Online;
        state.last_success = Some(Instant::now());
        state.invalidated = false;
        state.last_error = None;
    }

    fn record_failure(&self, error: &DeviceError, source: &'static str) {
        let mut state = lock(&self.inner.state);
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_error = Some(error.clone());

        let next = ConnectivityState::after_failures(
            state.consecutive_failures,
            self.inner.settings.offline_after_failures,
        );
        tracing::warn!(
            source,
            kind = error.kind(),
            failures = state.consecutive_failures,
            "poll failed: {}",
            error
        );
        if next != state.connectivity {
            tracing::info!(from = ?state.connectivity, to = ?next, "connectivity changed");
            state.connectivity = next;
        }

        // Only push for a first paint; afterwards the interval loop retries.
        let never_succeeded = state.last_success.is_none();
        if never_succeeded
            && !state.retry_pending
            && state.consecutive_failures <= self.inner.settings.startup_retry_limit
        {
            state.retry_pending = true;
            drop(state);
            self.schedule_startup_retry();
        }
    }

    fn schedule_startup_retry(&self) {
        let this = self.clone();
        let delay = self.inner.settings.startup_retry_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            lock(&this.inner.state).retry_pending = false;
            let _ = this.poll(PollOptions::forced("startup-retry")).await;
        });
    }

    /// Makes the next non-forced poll go to the device.
    pub fn invalidate(&self) {
        lock(&self.inner.state).invalidated = true;
    }

    /// Forced poll after `delay`, so the device's own values replace any
    /// optimistic patch even if nobody else polls.
    pub fn schedule_reconcile(&self, delay: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = this.poll(PollOptions::forced("reconcile")).await {
                tracing::debug!("reconcile poll failed: {}", e);
            }
        })
    }

    /// Shows a just-committed calibration before the device confirms it.
    pub fn apply_optimistic(&self, patch: &OptimisticPatch) {
        let now = Utc::now();
        self.inner.store.patch(patch, now);
        lock(&self.inner.charts).push(patch.metric, patch.value, &time_label(now));
        tracing::debug!(metric = ?patch.metric, value = patch.value, "optimistic sample patch");
    }

    /// Replaces chart contents with stored history, newest `capacity` points.
    pub fn seed_history(&self, points: &[HistoryPoint]) {
        let capacity = self.inner.settings.series_capacity;
        let skip = points.len().saturating_sub(capacity);

        let mut charts = lock(&self.inner.charts);
        charts.clear();
        for point in &points[skip..] {
            let label = Local
                .timestamp_opt(point.timestamp, 0)
                .single()
                .map(|at| at.format("%d/%m %H:%M").to_string())
                .unwrap_or_default();
            let sample = Sample {
                timestamp: Utc::now(),
                temperature: point.temperature,
                temperature_raw: None,
                ph: point.ph,
                orp: point.orp,
                orp_raw: None,
                filtration_running: false,
                time_synced: true,
            };
            charts.push_sample(&sample, &label);
        }
        tracing::info!(points = points.len() - skip, "charts seeded from history");
    }

    /// Seeds the charts from device history. Gives up after the request
    /// timeout so a stalled device cannot hold back startup.
    pub async fn load_history(&self, range: &str) {
        let limit = self.inner.settings.request_timeout;
        match tokio::time::timeout(limit, self.inner.device.fetch_history(range)).await {
            Ok(Ok(points)) => self.seed_history(&points),
            Ok(Err(e)) => tracing::warn!(range, "history unavailable: {}", e),
            Err(_) => tracing::warn!(range, "history unavailable: no answer within {:?}", limit),
        }
    }

    /// One watchdog pass: downgrade connectivity from sample age alone.
    pub fn check_staleness(&self) -> ConnectivityState {
        let mut state = lock(&self.inner.state);
        let reference = state.last_success.unwrap_or(state.started_at);
        let next = state
            .connectivity
            .downgrade_for_age(reference.elapsed(), &self.inner.settings.staleness);
        if next != state.connectivity {
            tracing::info!(from = ?state.connectivity, to = ?next, "sample too old, connectivity changed");
            state.connectivity = next;
        }
        next
    }

    pub fn spawn_interval_loop(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            // The startup poll already covers the first period.
            let period = this.inner.settings.refresh_interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let _ = this.poll(PollOptions::forced("interval")).await;
            }
        })
    }

    pub fn spawn_watchdog(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.inner.settings.watchdog_interval);
            loop {
                ticker.tick().await;
                this.check_staleness();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::FakeDevice;

    fn poller(device: &Arc<FakeDevice>) -> TelemetryPoller {
        TelemetryPoller::new(device.clone(), PollerSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_go_offline_and_success_recovers() {
        let device = FakeDevice::arc();
        let poller = poller(&device);

        device.push_sample(FakeDevice::sample(24.0));
        poller.poll(PollOptions::forced("test")).await.unwrap();
        assert_eq!(poller.connectivity(), ConnectivityState::Online);

        for expected in [
            ConnectivityState::Degraded,
            ConnectivityState::Degraded,
            ConnectivityState::Offline,
        ] {
            device.push_error(DeviceError::Network("unreachable".into()));
            assert!(poller.poll(PollOptions::forced("test")).await.is_err());
            assert_eq!(poller.connectivity(), expected);
        }
        assert_eq!(poller.consecutive_failures(), 3);

        device.push_sample(FakeDevice::sample(24.5));
        poller.poll(PollOptions::forced("test")).await.unwrap();
        assert_eq!(poller.consecutive_failures(), 0);
        assert_eq!(poller.connectivity(), ConnectivityState::Online);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_polls_share_one_request() {
        let device = FakeDevice::arc();
        device.set_latency(Duration::from_millis(500));
        device.push_sample(FakeDevice::sample(24.0));
        let poller = poller(&device);

        let (a, b, c) = tokio::join!(
            poller.poll(PollOptions::forced("timer")),
            poller.poll(PollOptions::forced("navigation")),
            poller.poll(PollOptions::forced("manual")),
        );

        assert_eq!(device.sample_requests(), 1);
        assert_eq!(a.unwrap(), b.clone().unwrap());
        assert_eq!(b.unwrap(), c.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_sample_is_a_cache_hit() {
        let device = FakeDevice::arc();
        device.push_sample(FakeDevice::sample(24.0));
        let poller = poller(&device);

        poller.poll(PollOptions::forced("test")).await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        let cached = poller.poll(PollOptions::if_stale("navigation")).await.unwrap();
        assert_eq!(cached.temperature, Some(24.0));
        assert_eq!(device.sample_requests(), 1);

        tokio::time::advance(Duration::from_secs(25)).await;
        device.push_sample(FakeDevice::sample(25.0));
        poller.poll(PollOptions::if_stale("navigation")).await.unwrap();
        assert_eq!(device.sample_requests(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_next_poll() {
        let device = FakeDevice::arc();
        device.push_sample(FakeDevice::sample(24.0));
        let poller = poller(&device);
        poller.poll(PollOptions::forced("test")).await.unwrap();

        poller.invalidate();
        device.push_sample(FakeDevice::sample(24.2));
        let sample = poller.poll(PollOptions::if_stale("navigation")).await.unwrap();
        assert_eq!(sample.temperature, Some(24.2));
        assert_eq!(device.sample_requests(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_network_error() {
        let device = FakeDevice::arc();
        device.set_latency(Duration::from_secs(30));
        device.push_sample(FakeDevice::sample(24.0));
        let poller = poller(&device);

        let result = poller.poll(PollOptions::forced("test")).await;
        assert!(matches!(result, Err(DeviceError::Network(_))));
        assert_eq!(poller.connectivity(), ConnectivityState::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_failure_schedules_quick_retry() {
        let device = FakeDevice::arc();
        device.push_error(DeviceError::Protocol {
            status: 503,
            message: "busy".into(),
        });
        device.push_sample(FakeDevice::sample(24.0));
        let poller = poller(&device);

        assert!(poller.poll(PollOptions::forced("startup")).await.is_err());
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(device.sample_requests(), 2);
        assert_eq!(poller.connectivity(), ConnectivityState::Online);
        assert_eq!(poller.store().latest().unwrap().temperature, Some(24.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_state_failure_does_not_retry() {
        let device = FakeDevice::arc();
        device.push_sample(FakeDevice::sample(24.0));
        let poller = poller(&device);
        poller.poll(PollOptions::forced("test")).await.unwrap();

        device.push_error(DeviceError::Decode("truncated".into()));
        assert!(poller.poll(PollOptions::forced("test")).await.is_err());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(device.sample_requests(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_downgrades_from_age() {
        let device = FakeDevice::arc();
        device.push_sample(FakeDevice::sample(24.0));
        let poller = poller(&device);
        poller.poll(PollOptions::forced("test")).await.unwrap();

        tokio::time::advance(Duration::from_secs(80)).await;
        assert_eq!(poller.check_staleness(), ConnectivityState::Degraded);
        tokio::time::advance(Duration::from_secs(80)).await;
        assert_eq!(poller.check_staleness(), ConnectivityState::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_overwrites_optimistic_patch() {
        let device = FakeDevice::arc();
        device.push_sample(FakeDevice::sample(23.4));
        let poller = poller(&device);
        poller.poll(PollOptions::forced("test")).await.unwrap();

        poller.apply_optimistic(&OptimisticPatch {
            metric: Metric::Temperature,
            value: 25.0,
            raw: Some(23.4),
        });
        assert_eq!(poller.store().latest().unwrap().temperature, Some(25.0));
        assert_eq!(poller.chart_view(Metric::Temperature).values.len(), 2);

        device.push_sample(FakeDevice::sample(24.9));
        poller.schedule_reconcile(Duration::from_secs(2)).await.unwrap();
        assert_eq!(poller.store().latest().unwrap().temperature, Some(24.9));
    }

    #[tokio::test]
    async fn test_seed_history_keeps_newest_points() {
        let device = FakeDevice::arc();
        let settings = PollerSettings {
            series_capacity: 3,
            ..PollerSettings::default()
        };
        let poller = TelemetryPoller::new(device.clone(), settings);

        let points: Vec<HistoryPoint> = (0..5)
            .map(|i| HistoryPoint {
                timestamp: 1_717_243_200 + i * 300,
                ph: Some(7.0 + i as f64 / 10.0),
                orp: Some(650.0),
                temperature: None,
            })
            .collect();
        poller.seed_history(&points);

        let ph = poller.chart_view(Metric::Ph);
        assert_eq!(ph.values, vec![Some(7.2), Some(7.3), Some(7.4)]);
        assert_eq!(poller.chart_view(Metric::Temperature).values, vec![None, None, None]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_history_seeds_charts_from_device() {
        let device = FakeDevice::arc();
        device.set_history(vec![
            HistoryPoint {
                timestamp: 1_717_243_200,
                ph: Some(7.2),
                orp: Some(650.0),
                temperature: Some(24.5),
            },
            HistoryPoint {
                timestamp: 1_717_243_500,
                ph: None,
                orp: Some(655.0),
                temperature: Some(24.6),
            },
        ]);
        let poller = poller(&device);

        poller.load_history("24h").await;

        assert_eq!(poller.chart_view(Metric::Ph).values, vec![Some(7.2), None]);
        assert_eq!(
            poller.chart_view(Metric::Orp).values,
            vec![Some(650.0), Some(655.0)]
        );
        assert_eq!(
            poller.chart_view(Metric::Temperature).values,
            vec![Some(24.5), Some(24.6)]
        );
        assert_eq!(device.sample_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_history_gives_up_after_request_timeout() {
        let device = FakeDevice::arc();
        device.set_history_latency(Duration::from_secs(60));
        device.set_history(vec![HistoryPoint {
            timestamp: 1_717_243_200,
            ph: Some(7.2),
            orp: None,
            temperature: None,
        }]);
        let poller = poller(&device);

        let finished = tokio::time::timeout(Duration::from_secs(15), poller.load_history("24h"))
            .await
            .is_ok();
        assert!(finished);
        assert!(poller.chart_view(Metric::Ph).values.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_loop_waits_one_period_after_startup() {
        let device = FakeDevice::arc();
        device.push_sample(FakeDevice::sample(24.0));
        let poller = poller(&device);
        poller.poll(PollOptions::forced("startup")).await.unwrap();

        let ticker = poller.spawn_interval_loop();
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(device.sample_requests(), 1);

        device.push_sample(FakeDevice::sample(24.3));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(device.sample_requests(), 2);
        assert_eq!(poller.store().latest().unwrap().temperature, Some(24.3));
        ticker.abort();
    }
}

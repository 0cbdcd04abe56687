//! Prometheus metrics for the cache system
//!
//! This module tracks:
//! - Cache refreshes per cache, by outcome, and their duration
//! - Codeforces API requests per method, by outcome, and their duration
//! - Size of each cache and of each monitored contest set
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

struct MirrorMetrics {
    cache_refreshes: CounterVec,
    refresh_duration: HistogramVec,
    api_requests: CounterVec,
    api_duration: HistogramVec,
    cached_items: GaugeVec,
    monitored_contests: GaugeVec,
}

static MIRROR_METRICS: OnceLock<MirrorMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers anything.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = cfmirror::metrics::init_metrics() {
///     tracing::warn!(error = %e, "Metrics disabled");
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = MirrorMetrics {
        cache_refreshes: register_counter_vec!(
            "cfmirror_cache_refreshes_total",
            "Cache refreshes by cache and outcome",
            &["cache", "outcome"]
        )?,
        refresh_duration: register_histogram_vec!(
            "cfmirror_cache_refresh_duration_seconds",
            "Cache refresh duration in seconds",
            &["cache"],
            vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]
        )?,
        api_requests: register_counter_vec!(
            "cfmirror_api_requests_total",
            "Codeforces API requests by method and outcome",
            &["method", "outcome"]
        )?,
        api_duration: register_histogram_vec!(
            "cfmirror_api_request_duration_seconds",
            "Codeforces API request duration in seconds",
            &["method"],
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
        )?,
        cached_items: register_gauge_vec!(
            "cfmirror_cached_items",
            "Number of items held by each cache",
            &["cache"]
        )?,
        monitored_contests: register_gauge_vec!(
            "cfmirror_monitored_contests",
            "Number of contests each cache is polling",
            &["cache"]
        )?,
    };

    MIRROR_METRICS
        .set(metrics)
        .map_err(|_| "Mirror metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    MIRROR_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record the outcome of one cache refresh
pub fn record_cache_refresh(cache: &str, success: bool) {
    if let Some(m) = MIRROR_METRICS.get() {
        let outcome = if success { "success" } else { "failure" };
        m.cache_refreshes.with_label_values(&[cache, outcome]).inc();
    }
}

/// Record one API request
pub fn record_api_request(method: &str, outcome: &str, duration_secs: f64) {
    let Some(m) = MIRROR_METRICS.get() else {
        return;
    };

    m.api_requests.with_label_values(&[method, outcome]).inc();
    m.api_duration
        .with_label_values(&[method])
        .observe(duration_secs);
}

/// Set the number of items a cache currently holds
pub fn set_cached_items(cache: &str, count: usize) {
    if let Some(m) = MIRROR_METRICS.get() {
        m.cached_items.with_label_values(&[cache]).set(count as f64);
    }
}

/// Set the size of a cache's monitored contest set
pub fn set_monitored_contests(cache: &str, count: usize) {
    if let Some(m) = MIRROR_METRICS.get() {
        m.monitored_contests
            .with_label_values(&[cache])
            .set(count as f64);
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start timing a cache refresh
pub fn start_refresh_timer(cache: &str) -> MetricsTimer {
    match MIRROR_METRICS.get() {
        Some(m) => MetricsTimer::new(m.refresh_duration.with_label_values(&[cache]).start_timer()),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================

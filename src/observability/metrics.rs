use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};

// ---------------------------------------------------------------------------
// Metrics catalog
// ---------------------------------------------------------------------------

/// Register all metric descriptors at startup.
///
/// Call once, after the recorder is installed and before anything is recorded.
pub fn describe_all_metrics() {
    // -- Remote API --
    describe_counter!(
        "bunnyfs_remote_calls_total",
        "Stream API calls by operation and outcome"
    );
    describe_histogram!(
        "bunnyfs_remote_call_duration_seconds",
        "Stream API call latency"
    );

    // -- Listing --
    describe_counter!(
        "bunnyfs_listing_pages_total",
        "Pages fetched while aggregating a listing"
    );
    describe_counter!(
        "bunnyfs_listing_aborted_total",
        "Listings cut short by a failed page"
    );

    // -- Upload --
    describe_counter!("bunnyfs_uploads_total", "Uploads by outcome");

    // -- CDN --
    describe_counter!(
        "bunnyfs_cdn_fetch_total",
        "CDN reads by resource kind and outcome"
    );
}

// ---------------------------------------------------------------------------
// Metric recording helpers
// ---------------------------------------------------------------------------

// -- Remote API --

pub fn inc_remote_call(op: &'static str, outcome: &'static str) {
    counter!("bunnyfs_remote_calls_total", "op" => op, "outcome" => outcome).increment(1);
}

pub fn record_remote_call_duration(op: &'static str, seconds: f64) {
    histogram!("bunnyfs_remote_call_duration_seconds", "op" => op).record(seconds);
}

/// Times one remote call and records it on completion.
pub struct RemoteCallTimer {
    op: &'static str,
    started: Instant,
}

impl RemoteCallTimer {
    pub fn start(op: &'static str) -> Self {
        Self {
            op,
            started: Instant::now(),
        }
    }

    /// Record duration and outcome (`ok` or the error kind).
    pub fn finish<T, E>(self, result: &Result<T, E>, error_kind: impl Fn(&E) -> &'static str) {
        record_remote_call_duration(self.op, self.started.elapsed().as_secs_f64());
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => error_kind(e),
        };
        inc_remote_call(self.op, outcome);
    }
}

// -- Listing --

pub fn inc_listing_page(kind: &'static str) {
    counter!("bunnyfs_listing_pages_total", "kind" => kind).increment(1);
}

pub fn inc_listing_aborted(kind: &'static str) {
    counter!("bunnyfs_listing_aborted_total", "kind" => kind).increment(1);
}

// -- Upload --

pub fn inc_upload(outcome: &'static str) {
    counter!("bunnyfs_uploads_total", "outcome" => outcome).increment(1);
}

// -- CDN --

pub fn inc_cdn_fetch(kind: &str, outcome: &'static str) {
    counter!("bunnyfs_cdn_fetch_total", "kind" => kind.to_string(), "outcome" => outcome)
        .increment(1);
}

// ---------------------------------------------------------------------------
// Prometheus recorder installation
// ---------------------------------------------------------------------------

/// Install the Prometheus metrics recorder as the global `metrics` recorder.
///
/// Returns a handle that renders the text exposition format.
pub fn install_prometheus_recorder(
) -> Result<metrics_exporter_prometheus::PrometheusHandle, metrics_exporter_prometheus::BuildError>
{
    metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()
}

//! Prometheus metrics for the wrap relayer
//!
//! Exposed on /metrics by the [`server`](crate::server) module.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Encoder, Gauge,
    GaugeVec, TextEncoder,
};

lazy_static! {
    // Log fetching
    pub static ref WINDOWS_FETCHED: CounterVec = register_counter_vec!(
        "wrap_relayer_log_windows_fetched_total",
        "Log windows fetched successfully",
        &["chain"]
    ).unwrap();

    pub static ref RATE_LIMITED: CounterVec = register_counter_vec!(
        "wrap_relayer_rate_limited_total",
        "Log requests rejected by a provider limit",
        &["chain"]
    ).unwrap();

    pub static ref WINDOW_SHRINKS: CounterVec = register_counter_vec!(
        "wrap_relayer_window_shrinks_total",
        "Times the log window was reduced",
        &["chain"]
    ).unwrap();

    pub static ref BLOCKS_SKIPPED: CounterVec = register_counter_vec!(
        "wrap_relayer_blocks_skipped_total",
        "Blocks skipped after exhausting retries at the minimum window",
        &["chain"]
    ).unwrap();

    // Relaying
    pub static ref EVENTS_DETECTED: CounterVec = register_counter_vec!(
        "wrap_relayer_events_detected_total",
        "Bridge events decoded for relay",
        &["chain", "kind"]
    ).unwrap();

    pub static ref RELAYS_SUBMITTED: CounterVec = register_counter_vec!(
        "wrap_relayer_relays_submitted_total",
        "Mirror transactions submitted",
        &["chain", "status"]
    ).unwrap();

    // Runs
    pub static ref LAST_SCANNED_BLOCK: GaugeVec = register_gauge_vec!(
        "wrap_relayer_last_scanned_block",
        "Last block recorded in the scan cursor",
        &["chain"]
    ).unwrap();

    pub static ref RUNS: CounterVec = register_counter_vec!(
        "wrap_relayer_runs_total",
        "Scan runs by outcome",
        &["direction", "outcome"]
    ).unwrap();

    pub static ref UP: Gauge = register_gauge!(
        "wrap_relayer_up",
        "Whether the relayer is up and running"
    ).unwrap();
}

/// Record a relay submission
pub fn record_relay_submitted(chain: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    RELAYS_SUBMITTED.with_label_values(&[chain, status]).inc();
}

/// Record the end of a run
pub fn record_run(direction: &str, outcome: &str) {
    RUNS.with_label_values(&[direction, outcome]).inc();
}

/// Record a cursor advance
pub fn record_scanned_block(chain: &str, block: u64) {
    LAST_SCANNED_BLOCK
        .with_label_values(&[chain])
        .set(block as f64);
}

/// Render the default registry in the Prometheus text format
pub fn encode() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

//! Metrics definitions for the listener.
//!
//! This module defines all metrics used throughout the pipeline.
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "blocks_processed_total",
        "Total number of blocks run through the processor"
    );
    describe_counter!(
        "events_emitted_total",
        "Total number of normalized events emitted"
    );
    describe_counter!(
        "unclassified_events_total",
        "Total number of raw events dropped by the classifier"
    );
    describe_counter!(
        "enrich_errors_total",
        "Total number of events dropped because enrichment failed"
    );
    describe_counter!(
        "handler_errors_total",
        "Total number of handler failures"
    );
    describe_counter!(
        "pruned_blocks_total",
        "Total number of blocks skipped while polling because their hash was pruned"
    );
    describe_counter!(
        "catchup_runs_total",
        "Total number of offline range catch-up runs"
    );
    describe_counter!(
        "decode_errors_total",
        "Total number of events or extrinsics the node adapter failed to decode"
    );
    describe_histogram!(
        "block_processing_duration_seconds",
        "Time taken to process a block in seconds"
    );
}

/// Record a processed block.
pub fn record_block_processed() {
    counter!("blocks_processed_total").increment(1);
}

/// Record emitted events.
///
/// # Arguments
/// * `count` - Number of events emitted for the block
pub fn record_events_emitted(count: u64) {
    counter!("events_emitted_total").increment(count);
}

/// Record raw events the classifier did not recognize.
pub fn record_unclassified(count: u64) {
    counter!("unclassified_events_total").increment(count);
}

/// Record an enrichment failure.
///
/// # Arguments
/// * `kind` - Event kind wire name
pub fn record_enrich_error(kind: &'static str) {
    counter!("enrich_errors_total", "kind" => kind).increment(1);
}

/// Record a handler error.
///
/// # Arguments
/// * `handler` - Handler name
pub fn record_handler_error(handler: &'static str) {
    counter!("handler_errors_total", "handler" => handler).increment(1);
}

/// Record blocks skipped because the node returned a zero hash.
pub fn record_pruned_blocks(count: u64) {
    counter!("pruned_blocks_total").increment(count);
}

/// Record a catch-up run.
///
/// # Arguments
/// * `trigger` - What started it ("startup", "reconnect" or "archival")
pub fn record_catchup(trigger: &'static str) {
    counter!("catchup_runs_total", "trigger" => trigger).increment(1);
}

/// Record a decoding error.
///
/// # Arguments
/// * `item` - Type of item that failed to decode ("event" or "extrinsic")
pub fn record_decode_error(item: &'static str) {
    counter!("decode_errors_total", "item" => item).increment(1);
}

/// Record block processing duration.
pub fn record_block_processing_duration(duration_secs: f64) {
    histogram!("block_processing_duration_seconds").record(duration_secs);
}

/// A timer that automatically records duration when dropped.
pub struct ProcessingTimer {
    start: Instant,
}

impl ProcessingTimer {
    /// Start a new processing timer.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for ProcessingTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessingTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_block_processing_duration(duration);
    }
}

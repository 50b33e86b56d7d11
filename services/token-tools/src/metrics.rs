//! Prometheus metrics exposition
//!
//! - `token_tool_calls_total` (counter): labels `tool`, `status`
//! - `token_tool_call_duration_seconds` (histogram): label `tool`
//! - `token_resolutions_total` (counter): label `path`, recorded by the resolver

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

pub const TOOL_CALLS_TOTAL: &str = "token_tool_calls_total";
pub const TOOL_CALL_DURATION_SECONDS: &str = "token_tool_call_duration_seconds";

/// Bucket boundaries from 5ms up to a full acquisition flow (default 60s of polling
/// plus request timeouts).
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
];

fn builder() -> Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(TOOL_CALL_DURATION_SECONDS.to_string()),
            DURATION_BUCKETS,
        )
        .context("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Call durations render as a Prometheus histogram (with `_bucket` lines)
/// rather than the default summary.
pub fn install_recorder() -> Result<PrometheusHandle> {
    builder()?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Record a completed tool call.
pub fn record_tool_call(tool: &str, status: &str, duration_secs: f64) {
    metrics::counter!(TOOL_CALLS_TOTAL, "tool" => tool.to_string(), "status" => status.to_string())
        .increment(1);
    metrics::histogram!(TOOL_CALL_DURATION_SECONDS, "tool" => tool.to_string())
        .record(duration_secs);
}

#[cfg(test)]
pub(crate) fn isolated_recorder() -> (
    metrics_exporter_prometheus::PrometheusRecorder,
    PrometheusHandle,
) {
    let recorder = builder().unwrap().build_recorder();
    let handle = recorder.handle();
    (recorder, handle)
}

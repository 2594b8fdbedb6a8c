//! Prometheus recorder and the metric names recorded by the router.
//!
//! Recording goes through the `metrics` facade; without an installed
//! recorder every call is a no-op. Binaries call [`install_recorder`] once
//! at startup and render the handle when they report.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Fails if a global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Sum of every series of counter `name` in rendered Prometheus text.
pub fn counter_total(rendered: &str, name: &str) -> u64 {
    rendered
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.rsplit_once(' '))
        .filter(|(series, _)| series.split('{').next() == Some(name))
        .filter_map(|(_, value)| value.trim().parse::<u64>().ok())
        .sum()
}

/// Run `f` with a thread-local Prometheus recorder and return what it
/// recorded, rendered.
#[cfg(test)]
pub(crate) fn record_locally<T>(f: impl FnOnce() -> T) -> (T, String) {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    let out = metrics::with_local_recorder(&recorder, f);
    (out, handle.render())
}

/// Events emitted to a host (counter, labels: event).
pub const EVENTS_EMITTED_TOTAL: &str = "pushbridge_events_emitted_total";
/// Events discarded without reaching a host (counter, labels: event, reason).
pub const EVENTS_DROPPED_TOTAL: &str = "pushbridge_events_dropped_total";
/// Lifecycle messages stored in the pending slot (counter).
pub const LIFECYCLE_BUFFERED_TOTAL: &str = "pushbridge_lifecycle_buffered_total";
/// Buffered lifecycle messages overwritten by a newer one (counter).
pub const LIFECYCLE_SUPERSEDED_TOTAL: &str = "pushbridge_lifecycle_superseded_total";
/// Buffered lifecycle messages flushed on attach (counter).
pub const LIFECYCLE_FLUSHED_TOTAL: &str = "pushbridge_lifecycle_flushed_total";
/// Host emit calls that failed (counter, labels: event).
pub const HOST_EMIT_FAILURES_TOTAL: &str = "pushbridge_host_emit_failures_total";
/// Host attachments (counter).
pub const HOST_ATTACH_TOTAL: &str = "pushbridge_host_attach_total";
/// Panics contained at the receiver boundary (counter).
pub const RECEIVER_PANICS_TOTAL: &str = "pushbridge_receiver_panics_total";

//! Structured observability hooks for aggregation runs.
//!
//! Every emitter logs a stable `event` field so log pipelines can filter on
//! it, e.g. `event=component.unmapped`.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::gateway::{ApiRequest, GatewayStats};

/// Span covering one aggregation call, tagged with the compared refs.
///
/// Attach it with [`tracing::Instrument::instrument`]; the aggregation
/// suspends on network calls, so the span must not be held entered.
pub fn aggregation_span(manifest: &str, base_ref: &str, head_ref: Option<&str>) -> tracing::Span {
    tracing::info_span!(
        "drift.aggregate",
        manifest = %manifest,
        base_ref = %base_ref,
        head_ref = head_ref.unwrap_or("-"),
    )
}

pub fn emit_aggregation_started(manifest: &str, base_ref: &str, head_ref: Option<&str>) {
    info!(
        event = "aggregation.started",
        manifest = %manifest,
        base_ref = %base_ref,
        head_ref = head_ref.unwrap_or("-"),
    );
}

/// Emit event: aggregation finished with component and error counts.
pub fn emit_aggregation_finished(
    components: usize,
    errors: usize,
    stats: GatewayStats,
    elapsed: Duration,
) {
    info!(
        event = "aggregation.finished",
        components = components,
        errors = errors,
        requests = stats.dispatched,
        coalesced = stats.coalesced,
        duration_ms = elapsed.as_millis() as u64,
    );
}

/// Emit event: a manifest key maps to no repository and is skipped.
pub fn emit_component_unmapped(key: &str) {
    info!(event = "component.unmapped", key = %key, "repo was not found for manifest key");
}

/// Emit event: a component's version could not be resolved (warning level).
pub fn emit_component_resolve_failed(repo: &str, raw_version: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "component.resolve_failed",
        repo = %repo,
        raw_version = %raw_version,
        error = %error,
    );
}

/// Emit event: fetching a component's diff failed (warning level).
pub fn emit_component_diff_failed(repo: &str, from: &str, to: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "component.diff_failed",
        repo = %repo,
        from = %from,
        to = %to,
        error = %error,
    );
}

/// Emit event: a request was answered by an identical in-flight or completed one.
pub fn emit_request_coalesced(request: &ApiRequest) {
    debug!(event = "gateway.coalesced", request = %request);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = out.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_events_carry_event_field_inside_aggregation_span() {
        let logs = capture(|| {
            let _entered = aggregation_span("hiera/versions.yaml", "master", None).entered();
            emit_component_unmapped("role::app::unknown");
            emit_aggregation_finished(3, 1, GatewayStats::default(), Duration::from_millis(5));
        });

        let lines: Vec<&str> = logs.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("drift.aggregate"));
        assert!(lines[0].contains("base_ref=master"));
        assert!(lines[0].contains("component.unmapped"));
        assert!(lines[0].contains("role::app::unknown"));
        assert!(lines[1].contains("aggregation.finished"));
        assert!(lines[1].contains("components=3"));
        assert!(lines[1].contains("errors=1"));
    }

    #[test]
    fn test_failures_log_at_warn() {
        let logs = capture(|| {
            emit_component_diff_failed("gizmo-repo", "abcdef0", "master", &"Not Found");
        });
        assert!(logs.contains("WARN"));
        assert!(logs.contains("component.diff_failed"));
        assert!(logs.contains("repo=gizmo-repo"));
    }
}

//! Counters and timings for Neo API calls.

use std::time::Instant;
use tracing::{info, warn};

pub const API_CALLS: &str = "neo_api_calls_total";
pub const API_ERRORS: &str = "neo_api_errors_total";
pub const API_CALL_DURATION: &str = "neo_api_call_duration_seconds";
pub const MEMBERS_SYNCED: &str = "neo_members_synced_total";
pub const MEMBERS_EXPORTED: &str = "neo_members_exported_total";

pub struct ApiMetrics;

impl ApiMetrics {
    pub fn record_call(operation: &'static str, status: u16) {
        ::metrics::counter!(API_CALLS, "operation" => operation, "status" => status.to_string())
            .increment(1);
    }

    pub fn record_error(operation: &'static str, kind: &'static str) {
        ::metrics::counter!(API_ERRORS, "operation" => operation, "kind" => kind).increment(1);
    }

    pub fn record_sync(action: &'static str) {
        ::metrics::counter!(MEMBERS_SYNCED, "action" => action).increment(1);
    }

    pub fn record_exported(count: u64) {
        ::metrics::counter!(MEMBERS_EXPORTED).increment(count);
    }
}

/// Records the elapsed time of an API call when dropped
pub struct TimingGuard {
    start: Instant,
    operation: &'static str,
}

impl TimingGuard {
    pub fn new(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        ::metrics::histogram!(API_CALL_DURATION, "operation" => self.operation).record(duration);
    }
}

pub fn time_call(operation: &'static str) -> TimingGuard {
    TimingGuard::new(operation)
}

/// Installs a Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: &str) {
    match addr.parse::<std::net::SocketAddr>() {
        Ok(socket) => {
            match metrics_exporter_prometheus::PrometheusBuilder::new()
                .with_http_listener(socket)
                .install()
            {
                Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", socket),
                Err(e) => warn!("Failed to install Prometheus exporter: {}", e),
            }
        }
        Err(_) => warn!("Invalid metrics addr '{}', metrics exporter not started", addr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_a_no_op() {
        let _timing = time_call("get_consumer");
        ApiMetrics::record_call("get_consumer", 200);
        ApiMetrics::record_error("get_consumer", "unexpected");
        ApiMetrics::record_exported(3);
    }
}

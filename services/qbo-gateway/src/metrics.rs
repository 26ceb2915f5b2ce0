//! Prometheus metrics exposition
//!
//! - `gateway_operations_total` (counter): labels `operation`, `outcome`
//! - `gateway_operation_duration_seconds` (histogram): label `operation`
//! - `qbo_token_refreshes_total` (counter): label `outcome`, emitted by
//!   `intuit_auth::TokenRefresher` and rendered through the same recorder

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

pub const DURATION_METRIC: &str = "gateway_operation_duration_seconds";

/// 5ms to 60s, wide enough for slow report generation.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
}

/// Install the global Prometheus recorder and return a handle for `/metrics`.
///
/// The duration metric gets explicit buckets so it renders as a histogram
/// with `_bucket` lines rather than a summary.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record one finished operation.
///
/// `outcome` is `"success"` or an error kind such as `"remote"` or
/// `"refresh_denied"`.
pub fn record_operation(operation: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        "gateway_operations_total",
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    metrics::histogram!(DURATION_METRIC, "operation" => operation.to_string())
        .record(duration_secs);
}

#[cfg(test)]
pub(crate) fn isolated_recorder() -> (
    metrics_exporter_prometheus::PrometheusRecorder,
    PrometheusHandle,
) {
    let recorder = builder()
        .expect("failed to set histogram buckets")
        .build_recorder();
    let handle = recorder.handle();
    (recorder, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_operation_without_recorder_is_noop() {
        record_operation("get_invoices", "success", 0.05);
    }

    #[test]
    fn record_operation_writes_counter_and_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_operation("get_invoices", "success", 0.042);
        record_operation("get_company_info", "refresh_denied", 1.5);

        let output = handle.render();
        assert!(output.contains("gateway_operations_total"));
        assert!(output.contains("operation=\"get_invoices\""));
        assert!(output.contains("outcome=\"success\""));
        assert!(output.contains("outcome=\"refresh_denied\""));
        assert!(
            output.contains("gateway_operation_duration_seconds_bucket"),
            "duration must render as a histogram, got:\n{output}"
        );
    }

    #[test]
    fn histogram_buckets_span_5ms_to_60s() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_operation("get_balance_sheet_report", "success", 0.001);

        let output = handle.render();
        assert!(output.contains("le=\"0.005\""), "missing 5ms bucket");
        assert!(output.contains("le=\"60\""), "missing 60s bucket");
        assert!(output.contains("le=\"+Inf\""), "missing +Inf bucket");
    }

    #[test]
    fn refresh_counter_renders_through_same_recorder() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        metrics::counter!("qbo_token_refreshes_total", "outcome" => "success").increment(1);

        let output = handle.render();
        assert!(output.contains("qbo_token_refreshes_total{outcome=\"success\"} 1"));
    }
}

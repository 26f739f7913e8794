use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn record_http_response(status: u16, latency: std::time::Duration) {
    let status = status.to_string();
    metrics::counter!("http_requests_total", "status" => status.clone()).increment(1);
    metrics::histogram!("http_request_duration_seconds", "status" => status)
        .record(latency.as_secs_f64());
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!("exam_finalize_total", "Exam finalize runs by outcome");
    metrics::describe_histogram!(
        "exam_finalize_duration_seconds",
        "Wall time of the exam-closing transaction"
    );
    metrics::describe_counter!("attempts_scored_total", "Attempts scored on completion");
    metrics::describe_counter!("finalize_jobs_total", "Finalize trigger deliveries by status");
    metrics::describe_counter!("http_requests_total", "HTTP responses by status");
    metrics::describe_histogram!("http_request_duration_seconds", "HTTP latency by status");
}

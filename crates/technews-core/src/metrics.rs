use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};
use tracing::info;

struct DeliveryMetrics {
    runs: Counter<u64>,
    duration_ms: Histogram<f64>,
    deliveries: Counter<u64>,
}

static METRICS: OnceCell<DeliveryMetrics> = OnceCell::new();

fn handles() -> &'static DeliveryMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("technews.delivery");
        DeliveryMetrics {
            runs: meter
                .u64_counter("pipeline_runs_total")
                .with_description("Report producer invocations by trigger and status")
                .init(),
            duration_ms: meter
                .f64_histogram("pipeline_duration_ms")
                .with_description("Report producer runtime in milliseconds")
                .init(),
            deliveries: meter
                .u64_counter("deliveries_total")
                .with_description("Trigger outcomes by trigger and status")
                .init(),
        }
    })
}

/// Hint to operators that OTEL metrics export can be configured externally.
pub fn init_metrics_from_env(service_name: &str) {
    if std::env::var("TECHNEWS_OTEL_METRICS_ENDPOINT").is_ok() {
        info!(
            target = "telemetry",
            "TECHNEWS_OTEL_METRICS_ENDPOINT detected for {service_name}. Configure an OTLP meter provider in your deployment to export delivery metrics."
        );
    }
}

/// Record one report producer invocation (no-op if no provider installed).
pub fn record_pipeline_run(trigger: &'static str, status: &'static str, duration_ms: u64) {
    let metrics = handles();
    let attrs = [
        KeyValue::new("trigger", trigger),
        KeyValue::new("status", status),
    ];
    metrics.runs.add(1, &attrs);
    metrics.duration_ms.record(duration_ms as f64, &attrs);
}

/// Record how a trigger invocation ended.
pub fn record_delivery(trigger: &'static str, status: &'static str) {
    let attrs = [
        KeyValue::new("trigger", trigger),
        KeyValue::new("status", status),
    ];
    handles().deliveries.add(1, &attrs);
}

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider, exporter::PushMetricExporter},
};
use std::time::Duration;

const EXPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Installs the global meter provider on creation and flushes and shuts it
/// down when dropped.
///
/// # Example
/// ```ignore
/// let _telemetry = TelemetryGuard::init("detection", "http://localhost:4318/v1/metrics")?;
/// // ... pipeline runs, metrics are exported every 10 seconds ...
/// ```
pub struct TelemetryGuard {
    meter_provider: SdkMeterProvider,
}

impl TelemetryGuard {
    /// Export metrics over OTLP/HTTP to `endpoint`.
    ///
    /// # Arguments
    /// * `service_name` - Name of this service (appears on every metric)
    /// * `endpoint` - Full OTLP metrics URL (e.g. "http://localhost:4318/v1/metrics")
    pub fn init(service_name: &str, endpoint: &str) -> anyhow::Result<Self> {
        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()?;

        tracing::info!(service_name, endpoint, "Metrics export enabled");
        Ok(Self::with_exporter(service_name, exporter, EXPORT_INTERVAL))
    }

    /// Export metrics to any push exporter every `interval`.
    pub fn with_exporter<E>(service_name: &str, exporter: E, interval: Duration) -> Self
    where
        E: PushMetricExporter,
    {
        let resource = Resource::builder()
            .with_service_name(service_name.to_string())
            .with_attributes([KeyValue::new(
                "service.version",
                env!("CARGO_PKG_VERSION"),
            )])
            .build();

        let reader = PeriodicReader::builder(exporter)
            .with_interval(interval)
            .build();

        let meter_provider = SdkMeterProvider::builder()
            .with_resource(resource)
            .with_reader(reader)
            .build();

        global::set_meter_provider(meter_provider.clone());

        Self { meter_provider }
    }

    /// Push everything recorded so far without waiting for the next interval.
    pub fn flush(&self) -> anyhow::Result<()> {
        self.meter_provider
            .force_flush()
            .map_err(|e| anyhow::anyhow!("Failed to flush metrics: {e:?}"))
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.meter_provider.shutdown() {
            eprintln!("Failed to shutdown meter provider: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_sdk::metrics::InMemoryMetricExporter;
    use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData};
    use serial_test::serial;

    /// Test global instruments reach the installed exporter
    ///
    /// Tests:
    /// - Guard installs the global meter provider
    /// - flush() pushes recorded values without waiting for the interval
    /// - Service name lands on the resource
    #[test]
    #[serial]
    fn test_guard_exports_global_metrics() {
        let exporter = InMemoryMetricExporter::default();
        let guard = TelemetryGuard::with_exporter(
            "telemetry-test",
            exporter.clone(),
            Duration::from_secs(60),
        );

        let counter = global::meter("telemetry-test")
            .u64_counter("test_events_total")
            .build();
        counter.add(2, &[]);
        counter.add(3, &[]);

        guard.flush().unwrap();

        let exported = exporter.get_finished_metrics().unwrap();
        let total: u64 = exported
            .iter()
            .flat_map(|rm| rm.scope_metrics())
            .flat_map(|sm| sm.metrics())
            .filter(|m| m.name() == "test_events_total")
            .filter_map(|m| match m.data() {
                AggregatedMetrics::U64(MetricData::Sum(sum)) => {
                    Some(sum.data_points().map(|dp| dp.value()).sum::<u64>())
                }
                _ => None,
            })
            .last()
            .unwrap_or(0);
        assert_eq!(total, 5);

        let service = exported[0]
            .resource()
            .get(&opentelemetry::Key::new("service.name"))
            .map(|v| v.to_string());
        assert_eq!(service.as_deref(), Some("telemetry-test"));
    }
}

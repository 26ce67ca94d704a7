//! Prometheus metrics for the controller.

use std::sync::Arc;

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use tracing::info;

/// Controller-side counters and the salvage duration histogram.
pub struct Metrics {
    registry: Registry,
    pub detected_failures_total: IntCounter,
    pub salvageable_images_total: IntCounter,
    pub not_actionable_total: IntCounter,
    pub corrupt_images_total: IntCounter,
    pub salvage_attempts_total: IntCounter,
    pub salvage_successes_total: IntCounter,
    pub salvage_failures_total: IntCounter,
    pub push_attempts_total: IntCounter,
    pub push_successes_total: IntCounter,
    pub push_failures_total: IntCounter,
    pub salvage_duration_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let detected_failures_total = IntCounter::with_opts(Opts::new(
            "salvor_detected_failures_total",
            "Image pull failures detected.",
        ))?;
        let salvageable_images_total = IntCounter::with_opts(Opts::new(
            "salvor_salvageable_images_total",
            "Failures where the image digest was found on cluster nodes.",
        ))?;
        let not_actionable_total = IntCounter::with_opts(Opts::new(
            "salvor_not_actionable_total",
            "Failures where the image uses a tag with no cached digest.",
        ))?;
        let corrupt_images_total = IntCounter::with_opts(Opts::new(
            "salvor_corrupt_images_total",
            "Corrupt image records detected and cleaned.",
        ))?;
        let salvage_attempts_total = IntCounter::with_opts(Opts::new(
            "salvor_salvage_attempts_total",
            "Image salvage attempts.",
        ))?;
        let salvage_successes_total = IntCounter::with_opts(Opts::new(
            "salvor_salvage_successes_total",
            "Successful image salvages.",
        ))?;
        let salvage_failures_total = IntCounter::with_opts(Opts::new(
            "salvor_salvage_failures_total",
            "Failed image salvage attempts.",
        ))?;
        let push_attempts_total = IntCounter::with_opts(Opts::new(
            "salvor_push_attempts_total",
            "Backup registry push attempts.",
        ))?;
        let push_successes_total = IntCounter::with_opts(Opts::new(
            "salvor_push_successes_total",
            "Successful backup registry pushes.",
        ))?;
        let push_failures_total = IntCounter::with_opts(Opts::new(
            "salvor_push_failures_total",
            "Failed backup registry pushes.",
        ))?;
        let salvage_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "salvor_salvage_duration_seconds",
                "End-to-end duration of successful salvages.",
            )
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        )?;

        registry.register(Box::new(detected_failures_total.clone()))?;
        registry.register(Box::new(salvageable_images_total.clone()))?;
        registry.register(Box::new(not_actionable_total.clone()))?;
        registry.register(Box::new(corrupt_images_total.clone()))?;
        registry.register(Box::new(salvage_attempts_total.clone()))?;
        registry.register(Box::new(salvage_successes_total.clone()))?;
        registry.register(Box::new(salvage_failures_total.clone()))?;
        registry.register(Box::new(push_attempts_total.clone()))?;
        registry.register(Box::new(push_successes_total.clone()))?;
        registry.register(Box::new(push_failures_total.clone()))?;
        registry.register(Box::new(salvage_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            detected_failures_total,
            salvageable_images_total,
            not_actionable_total,
            corrupt_images_total,
            salvage_attempts_total,
            salvage_successes_total,
            salvage_failures_total,
            push_attempts_total,
            push_successes_total,
            push_failures_total,
            salvage_duration_seconds,
        })
    }

    /// Render the registry in Prometheus text format.
    pub fn render(&self) -> String {
        let mut out = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut out).is_err() {
            return String::new();
        }
        String::from_utf8(out).unwrap_or_default()
    }
}

/// Serve `/metrics` on the given address until the process exits.
pub async fn serve(metrics: Arc<Metrics>, addr: &str) -> Result<()> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let metrics = Arc::clone(&metrics);
            async move { metrics.render() }
        }),
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Serving metrics");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_render() {
        let metrics = Metrics::new().unwrap();
        metrics.detected_failures_total.inc();
        metrics.salvage_duration_seconds.observe(12.0);

        let text = metrics.render();
        assert!(text.contains("salvor_detected_failures_total 1"));
        assert!(text.contains("salvor_salvage_duration_seconds"));
    }
}

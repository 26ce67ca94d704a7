//! Prometheus metrics for the agent.

use std::sync::Arc;

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};
use tracing::info;

/// Agent-side counters.
pub struct AgentMetrics {
    registry: Registry,
    pub exports_total: IntCounter,
    pub export_failures_total: IntCounter,
    pub imports_total: IntCounter,
    pub import_failures_total: IntCounter,
    pub pushes_total: IntCounter,
    pub push_failures_total: IntCounter,
}

impl AgentMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let exports_total = IntCounter::with_opts(Opts::new(
            "salvor_agent_exports_total",
            "Completed image export streams.",
        ))?;
        let export_failures_total = IntCounter::with_opts(Opts::new(
            "salvor_agent_export_failures_total",
            "Failed image export streams.",
        ))?;
        let imports_total = IntCounter::with_opts(Opts::new(
            "salvor_agent_imports_total",
            "Completed peer image imports.",
        ))?;
        let import_failures_total = IntCounter::with_opts(Opts::new(
            "salvor_agent_import_failures_total",
            "Failed peer image imports.",
        ))?;
        let pushes_total = IntCounter::with_opts(Opts::new(
            "salvor_agent_pushes_total",
            "Completed registry pushes.",
        ))?;
        let push_failures_total = IntCounter::with_opts(Opts::new(
            "salvor_agent_push_failures_total",
            "Failed registry pushes.",
        ))?;

        registry.register(Box::new(exports_total.clone()))?;
        registry.register(Box::new(export_failures_total.clone()))?;
        registry.register(Box::new(imports_total.clone()))?;
        registry.register(Box::new(import_failures_total.clone()))?;
        registry.register(Box::new(pushes_total.clone()))?;
        registry.register(Box::new(push_failures_total.clone()))?;

        Ok(Self {
            registry,
            exports_total,
            export_failures_total,
            imports_total,
            import_failures_total,
            pushes_total,
            push_failures_total,
        })
    }

    /// Render the registry in Prometheus text format.
    pub fn render(&self) -> String {
        let mut out = Vec::new();
        let encoder = TextEncoder::new();
        if encoder
            .encode(&self.registry.gather(), &mut out)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(out).unwrap_or_default()
    }
}

/// Serve `/metrics` on the given address until the process exits.
pub async fn serve(metrics: Arc<AgentMetrics>, addr: &str) -> Result<()> {
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
        let metrics = AgentMetrics::new().unwrap();
        metrics.exports_total.inc();

        let text = metrics.render();
        assert!(text.contains("salvor_agent_exports_total 1"));
    }
}

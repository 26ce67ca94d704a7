//! salvor controller.
//!
//! Watches pods for image pull failures in opted-in namespaces, locates
//! cached copies of the failing image on peer nodes, and orchestrates
//! agent-to-agent transfers so workloads can start while the registry is
//! unavailable.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use kube::Client;
use salvor_tls::TlsMaterial;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use salvor_controller::cleanup::Reaper;
use salvor_controller::config::Config;
use salvor_controller::endpoints::AgentLocator;
use salvor_controller::events::EventSink;
use salvor_controller::inventory::Finder;
use salvor_controller::metrics::{self, Metrics};
use salvor_controller::notify::Notifier;
use salvor_controller::reconciler::{self, Context};
use salvor_controller::record::RecordStore;
use salvor_controller::salvage::{BackupConfig, Orchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Config::parse();
    config.validate()?;

    let client = Client::try_default()
        .await
        .context("connecting to the Kubernetes API")?;

    let controller_metrics = Arc::new(Metrics::new()?);
    let metrics_addr = config.metrics_addr.clone();
    let metrics_handle = Arc::clone(&controller_metrics);
    tokio::spawn(async move {
        if let Err(error) = metrics::serve(metrics_handle, &metrics_addr).await {
            tracing::error!(error = %error, "Metrics endpoint failed");
        }
    });

    let events = Arc::new(EventSink::new(client.clone()));
    let finder = Finder::new(client.clone());

    // Records live in the agent namespace when salvage is configured,
    // otherwise in `default` (detection-only deployments still record
    // nothing, but the store must point somewhere valid).
    let record_namespace = if config.salvage_enabled() {
        config.agent_namespace.clone()
    } else {
        "default".to_string()
    };
    let records = Arc::new(RecordStore::new(client.clone(), &record_namespace));

    let mut locator = None;
    let mut orchestrator = None;
    if config.salvage_enabled() {
        let tls = TlsMaterial::from_flags(&config.tls_cert, &config.tls_key, &config.tls_ca)
            .await
            .context("loading TLS material")?;
        if tls.is_some() {
            info!("mTLS enabled for agent communication");
        }

        let agent_locator = Arc::new(AgentLocator::new(
            client.clone(),
            &config.agent_namespace,
            config.agent_grpc_port,
            tls,
        ));

        let notifier = if config.notify_url.is_empty() {
            None
        } else {
            Some(Arc::new(Notifier::new(
                &config.notify_url,
                &config.notify_events,
            )))
        };

        let backup = if config.backup_registry.is_empty() {
            None
        } else {
            Some(BackupConfig {
                registry: config.backup_registry.clone(),
                secret_name: config.backup_registry_secret.clone(),
                secret_namespace: config.agent_namespace.clone(),
                insecure: config.backup_registry_insecure,
            })
        };

        orchestrator = Some(Arc::new(Orchestrator::new(
            client.clone(),
            Arc::clone(&agent_locator),
            Arc::clone(&events),
            Arc::clone(&controller_metrics),
            Arc::clone(&records),
            notifier,
            config.max_concurrent_salvages,
            config.session_ttl(),
            config.max_image_size,
            backup,
        )));
        locator = Some(agent_locator);

        let reaper = Reaper::new(
            client.clone(),
            &config.agent_namespace,
            config.record_ttl(),
            config.record_sweep_interval(),
        );
        tokio::spawn(reaper.run());
    } else {
        info!("No agent namespace configured; running detection-only");
    }

    info!(
        enabled = config.enabled,
        agent_namespace = %config.agent_namespace,
        max_concurrent_salvages = config.max_concurrent_salvages,
        max_image_size = config.max_image_size,
        "Starting salvor controller"
    );

    let ctx = Arc::new(Context {
        client,
        config,
        finder,
        events,
        metrics: controller_metrics,
        records,
        locator,
        orchestrator,
    });

    reconciler::run(ctx).await;

    info!("Controller shut down");
    Ok(())
}

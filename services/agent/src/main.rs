//! salvor node agent.
//!
//! Runs on every node, wraps the local containerd image store, and serves the
//! peer transfer protocol: token-authorised export streams out, peer imports
//! in, plus tag resolution, record removal, and registry pushes on behalf of
//! the controller.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use salvor_proto::agent::v1::SalvorAgentServer;
use salvor_session::Store as SessionStore;
use salvor_tls::TlsMaterial;
use tonic::transport::Server;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use salvor_agent::config::Config;
use salvor_agent::metrics::{self, AgentMetrics};
use salvor_agent::server::AgentService;
use salvor_agent::store::ContainerdStore;

/// Interval for the session expiry sweep.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Config::parse();
    config.validate()?;

    // Hard fail if containerd is not accessible; a node agent without a
    // runtime cannot serve anything.
    if !Path::new(&config.containerd_socket).exists() {
        bail!(
            "containerd socket {} does not exist (agent requires containerd access)",
            config.containerd_socket
        );
    }

    let store = ContainerdStore::connect(&config.containerd_socket)
        .await
        .context("connecting to containerd")?;

    let tls = TlsMaterial::from_flags(&config.tls_cert, &config.tls_key, &config.tls_ca)
        .await
        .context("loading TLS material")?;
    if tls.is_some() {
        info!("mTLS enabled");
    }

    let sessions = Arc::new(SessionStore::new());
    let sweeper_sessions = Arc::clone(&sessions);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            sweeper_sessions.cleanup();
        }
    });

    let agent_metrics = Arc::new(AgentMetrics::new()?);
    let metrics_addr = config.metrics_addr.clone();
    let metrics_handle = Arc::clone(&agent_metrics);
    tokio::spawn(async move {
        if let Err(error) = metrics::serve(metrics_handle, &metrics_addr).await {
            tracing::error!(error = %error, "Metrics endpoint failed");
        }
    });

    let service = AgentService::new(Arc::new(store), sessions, agent_metrics, tls.clone());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.grpc_port)
        .parse()
        .context("parsing listen address")?;

    let mut builder = Server::builder();
    if let Some(material) = &tls {
        builder = builder.tls_config(material.server_config())?;
    }

    info!(
        grpc_port = config.grpc_port,
        containerd_socket = %config.containerd_socket,
        metrics_addr = %config.metrics_addr,
        "Starting salvor agent"
    );

    builder
        .add_service(SalvorAgentServer::new(service))
        .serve_with_shutdown(addr, shutdown_signal())
        .await
        .context("serving gRPC")?;

    info!("Agent shut down");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}

//! Controller configuration: opt-in keys, deny list, and runtime settings.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

/// Annotation required on the Namespace for salvor to act.
pub const ANNOTATION_NAMESPACE_ALLOW: &str = "salvor.io/allow";

/// Annotation required on the Pod or one of its ancestors.
pub const ANNOTATION_POD_AUTO_SALVAGE: &str = "salvor.io/auto-salvage";

/// Annotation value that grants opt-in. Any other value is rejected.
pub const OPT_IN_VALUE: &str = "true";

/// Namespaces that are never processed, regardless of annotations.
pub const DENIED_NAMESPACES: [&str; 3] = ["kube-system", "kube-public", "kube-node-lease"];

/// Default maximum parallel salvage operations.
pub const DEFAULT_MAX_CONCURRENT_SALVAGES: usize = 2;

/// Default controller-side session lifetime in seconds.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 120;

/// Default maximum image size for salvage (2 GiB); 0 means unlimited.
pub const DEFAULT_MAX_IMAGE_SIZE: i64 = 2 * 1024 * 1024 * 1024;

/// Controller: detects image pull failures and orchestrates salvage.
#[derive(Debug, Clone, Parser)]
#[command(name = "salvor-controller", version, about)]
pub struct Config {
    /// Global kill switch for the operator.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub enabled: bool,

    /// Address for the metrics endpoint.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub metrics_addr: String,

    /// Max parallel salvage operations.
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENT_SALVAGES)]
    pub max_concurrent_salvages: usize,

    /// Session lifetime in seconds for salvage operations.
    #[arg(long, default_value_t = DEFAULT_SESSION_TTL_SECS)]
    pub session_ttl_secs: u64,

    /// Namespace where salvor agents run (required for salvage; empty runs
    /// detection-only).
    #[arg(long, default_value = "")]
    pub agent_namespace: String,

    /// gRPC port for agent communication.
    #[arg(long, default_value_t = 9090)]
    pub agent_grpc_port: u16,

    /// Max image size in bytes for salvage (0 = no limit).
    #[arg(long, default_value_t = DEFAULT_MAX_IMAGE_SIZE)]
    pub max_image_size: i64,

    /// Registry host to push salvaged images to (empty = disabled).
    #[arg(long, default_value = "")]
    pub backup_registry: String,

    /// Name of the dockerconfigjson Secret for backup registry credentials.
    #[arg(long, default_value = "")]
    pub backup_registry_secret: String,

    /// Allow HTTP connections to the backup registry.
    #[arg(long, default_value_t = false)]
    pub backup_registry_insecure: bool,

    /// Age in seconds after which completed SalvageRecords are deleted.
    #[arg(long, default_value_t = 24 * 60 * 60)]
    pub record_ttl_secs: u64,

    /// Interval in seconds between SalvageRecord cleanup sweeps.
    #[arg(long, default_value_t = 60 * 60)]
    pub record_sweep_secs: u64,

    /// Webhook URL for notifications (empty = disabled).
    #[arg(long, default_value = "")]
    pub notify_url: String,

    /// Comma-separated event types to notify on (empty = all).
    #[arg(long, default_value = "", value_delimiter = ',')]
    pub notify_events: Vec<String>,

    /// Path to the TLS certificate file (enables mTLS when all three TLS
    /// flags are set).
    #[arg(long, default_value = "")]
    pub tls_cert: String,

    /// Path to the TLS private key file.
    #[arg(long, default_value = "")]
    pub tls_key: String,

    /// Path to the CA certificate file.
    #[arg(long, default_value = "")]
    pub tls_ca: String,
}

impl Config {
    /// Validate flag combinations that clap cannot express.
    pub fn validate(&self) -> Result<()> {
        salvor_tls::validate_flags(&self.tls_cert, &self.tls_key, &self.tls_ca)?;
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_secs)
    }

    pub fn record_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.record_sweep_secs)
    }

    /// True when salvage is configured (agents reachable).
    pub fn salvage_enabled(&self) -> bool {
        !self.agent_namespace.is_empty()
    }
}

/// The hard deny list as a set.
pub fn denied_namespaces() -> HashSet<&'static str> {
    DENIED_NAMESPACES.into_iter().collect()
}

/// True if the namespace must never be processed.
pub fn is_denied(namespace: &str) -> bool {
    DENIED_NAMESPACES.contains(&namespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["salvor-controller"]);
        assert!(config.enabled);
        assert_eq!(config.max_concurrent_salvages, 2);
        assert_eq!(config.max_image_size, 2 * 1024 * 1024 * 1024);
        assert!(!config.salvage_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_kill_switch_flag() {
        let config = Config::parse_from(["salvor-controller", "--enabled", "false"]);
        assert!(!config.enabled);
    }

    #[test]
    fn test_denied_namespaces() {
        assert!(is_denied("kube-system"));
        assert!(is_denied("kube-public"));
        assert!(is_denied("kube-node-lease"));
        assert!(!is_denied("default"));
        assert_eq!(denied_namespaces().len(), 3);
    }

    #[test]
    fn test_partial_tls_flags_rejected() {
        let config = Config::parse_from(["salvor-controller", "--tls-key", "/k.pem"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_salvage_enabled_with_namespace() {
        let config = Config::parse_from(["salvor-controller", "--agent-namespace", "salvor-system"]);
        assert!(config.salvage_enabled());
    }
}

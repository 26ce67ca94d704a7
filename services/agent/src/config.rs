//! Agent configuration from command-line flags.

use anyhow::Result;
use clap::Parser;

/// Default containerd socket path.
pub const DEFAULT_CONTAINERD_SOCKET: &str = "/run/containerd/containerd.sock";

/// Default gRPC listen port for agents.
pub const DEFAULT_GRPC_PORT: u16 = 9090;

/// Node agent: serves images from the local containerd store.
#[derive(Debug, Parser)]
#[command(name = "salvor-agent", version, about)]
pub struct Config {
    /// Path to the containerd socket.
    #[arg(long, default_value = DEFAULT_CONTAINERD_SOCKET)]
    pub containerd_socket: String,

    /// gRPC listen port.
    #[arg(long, default_value_t = DEFAULT_GRPC_PORT)]
    pub grpc_port: u16,

    /// Address for the metrics endpoint.
    #[arg(long, default_value = "0.0.0.0:8081")]
    pub metrics_addr: String,

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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["salvor-agent"]);
        assert_eq!(config.containerd_socket, DEFAULT_CONTAINERD_SOCKET);
        assert_eq!(config.grpc_port, 9090);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_tls_flags_rejected() {
        let config = Config::parse_from(["salvor-agent", "--tls-cert", "/c.pem"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_full_tls_flags_accepted() {
        let config = Config::parse_from([
            "salvor-agent",
            "--tls-cert",
            "/c.pem",
            "--tls-key",
            "/k.pem",
            "--tls-ca",
            "/ca.pem",
        ]);
        assert!(config.validate().is_ok());
    }
}

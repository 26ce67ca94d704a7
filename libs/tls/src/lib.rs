//! Mutual TLS material for agent transport.
//!
//! Both ends of the peer protocol use the same three PEM files: a leaf
//! cert/key pair and the CA that signed the other side. The server requires
//! and verifies client certificates; the client verifies the server against a
//! fixed name so certificates need a single SAN regardless of pod IP churn.

use std::time::Duration;

use thiserror::Error;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Identity, ServerTlsConfig};

/// Fixed server name clients expect in the agent certificate.
pub const SERVER_NAME: &str = "salvor";

/// Connect timeout for agent dials.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from TLS material handling.
#[derive(Debug, Error)]
pub enum TlsError {
    /// A PEM file could not be read.
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    /// The cert/key/CA flags must be set together or not at all.
    #[error("TLS flags must be all set or all empty (cert, key, and CA)")]
    PartialFlags,
}

/// Loaded PEM material for one endpoint, usable for both the server and the
/// client side of the peer protocol.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    cert: Vec<u8>,
    key: Vec<u8>,
    ca: Vec<u8>,
}

impl TlsMaterial {
    /// Load cert, key, and CA PEM files.
    pub async fn load(cert_path: &str, key_path: &str, ca_path: &str) -> Result<Self, TlsError> {
        Ok(Self {
            cert: read_pem(cert_path).await?,
            key: read_pem(key_path).await?,
            ca: read_pem(ca_path).await?,
        })
    }

    /// Load material when all three paths are set; `None` when all are empty.
    ///
    /// A partial set of flags is a configuration error.
    pub async fn from_flags(
        cert_path: &str,
        key_path: &str,
        ca_path: &str,
    ) -> Result<Option<Self>, TlsError> {
        validate_flags(cert_path, key_path, ca_path)?;
        if cert_path.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::load(cert_path, key_path, ca_path).await?))
    }

    /// Server-side config: present our identity, require and verify client
    /// certificates against the CA.
    pub fn server_config(&self) -> ServerTlsConfig {
        ServerTlsConfig::new()
            .identity(Identity::from_pem(&self.cert, &self.key))
            .client_ca_root(Certificate::from_pem(&self.ca))
    }

    /// Client-side config: present our identity, verify the server against
    /// the CA under the fixed [`SERVER_NAME`].
    pub fn client_config(&self) -> ClientTlsConfig {
        ClientTlsConfig::new()
            .identity(Identity::from_pem(&self.cert, &self.key))
            .ca_certificate(Certificate::from_pem(&self.ca))
            .domain_name(SERVER_NAME)
    }
}

/// Errors from dialing an agent endpoint.
#[derive(Debug, Error)]
pub enum DialError {
    /// The `ip:port` endpoint did not form a valid URI.
    #[error("invalid agent endpoint {0}")]
    Endpoint(String),

    /// The transport-level connection failed.
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),
}

/// Dial an agent at `ip:port`, with mTLS when material is provided.
///
/// No per-request timeout is set: export streams legitimately run for as long
/// as the image is large.
pub async fn dial(endpoint: &str, tls: Option<&TlsMaterial>) -> Result<Channel, DialError> {
    let scheme = if tls.is_some() { "https" } else { "http" };
    let mut builder = Channel::from_shared(format!("{scheme}://{endpoint}"))
        .map_err(|_| DialError::Endpoint(endpoint.to_string()))?
        .connect_timeout(CONNECT_TIMEOUT);
    if let Some(material) = tls {
        builder = builder.tls_config(material.client_config())?;
    }
    Ok(builder.connect().await?)
}

/// Validate the all-or-none rule for the three TLS flags.
pub fn validate_flags(cert_path: &str, key_path: &str, ca_path: &str) -> Result<(), TlsError> {
    let set = [cert_path, key_path, ca_path]
        .iter()
        .filter(|p| !p.is_empty())
        .count();
    if set != 0 && set != 3 {
        return Err(TlsError::PartialFlags);
    }
    Ok(())
}

async fn read_pem(path: &str) -> Result<Vec<u8>, TlsError> {
    tokio::fs::read(path).await.map_err(|source| TlsError::Read {
        path: path.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_flags_none() {
        assert!(validate_flags("", "", "").is_ok());
    }

    #[test]
    fn test_validate_flags_all() {
        assert!(validate_flags("/c.pem", "/k.pem", "/ca.pem").is_ok());
    }

    #[test]
    fn test_validate_flags_partial() {
        assert!(validate_flags("/c.pem", "", "").is_err());
        assert!(validate_flags("/c.pem", "/k.pem", "").is_err());
        assert!(validate_flags("", "", "/ca.pem").is_err());
    }

    #[tokio::test]
    async fn test_from_flags_empty_is_none() {
        let material = TlsMaterial::from_flags("", "", "").await.unwrap();
        assert!(material.is_none());
    }

    #[tokio::test]
    async fn test_from_flags_missing_file() {
        let got = TlsMaterial::from_flags("/nonexistent/c.pem", "/nonexistent/k.pem", "/nonexistent/ca.pem").await;
        assert!(matches!(got, Err(TlsError::Read { .. })));
    }
}

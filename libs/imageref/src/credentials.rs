//! Registry credential extraction from dockerconfigjson secrets.

use std::collections::HashMap;

use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

/// Errors from credential extraction.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// The secret payload was not valid dockerconfigjson.
    #[error("parsing dockerconfigjson: {0}")]
    Parse(#[from] serde_json::Error),

    /// No auth entry matched the registry host.
    #[error("no credentials found for registry {0}")]
    NoEntry(String),

    /// The `auth` field was not valid base64.
    #[error("decoding auth field: {0}")]
    Auth(#[from] base64::DecodeError),

    /// The decoded `auth` field was not `username:password`.
    #[error("invalid auth field format")]
    AuthFormat,
}

#[derive(Debug, Deserialize)]
struct DockerConfig {
    auths: HashMap<String, DockerAuth>,
}

#[derive(Debug, Default, Deserialize)]
struct DockerAuth {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    /// base64(username:password)
    #[serde(default)]
    auth: String,
}

/// Extract username and password for a registry host from dockerconfigjson
/// secret data. Tries the exact host key, then `https://` and `http://`
/// prefixed variants. Explicit username/password fields win over the packed
/// `auth` field.
pub fn extract_credentials(
    secret_data: &[u8],
    registry_host: &str,
) -> Result<(String, String), CredentialsError> {
    let cfg: DockerConfig = serde_json::from_slice(secret_data)?;

    let auth = cfg
        .auths
        .get(registry_host)
        .or_else(|| cfg.auths.get(&format!("https://{registry_host}")))
        .or_else(|| cfg.auths.get(&format!("http://{registry_host}")))
        .ok_or_else(|| CredentialsError::NoEntry(registry_host.to_string()))?;

    if !auth.username.is_empty() && !auth.password.is_empty() {
        return Ok((auth.username.clone(), auth.password.clone()));
    }

    if !auth.auth.is_empty() {
        let decoded = base64::engine::general_purpose::STANDARD.decode(&auth.auth)?;
        let decoded = String::from_utf8(decoded).map_err(|_| CredentialsError::AuthFormat)?;
        let (user, pass) = decoded.split_once(':').ok_or(CredentialsError::AuthFormat)?;
        return Ok((user.to_string(), pass.to_string()));
    }

    Err(CredentialsError::NoEntry(registry_host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_explicit_fields() {
        let data = br#"{"auths":{"backup.example.com":{"username":"u","password":"p"}}}"#;
        let (user, pass) = extract_credentials(data, "backup.example.com").unwrap();
        assert_eq!(user, "u");
        assert_eq!(pass, "p");
    }

    #[test]
    fn test_extract_auth_field() {
        // base64("user:secret")
        let data = br#"{"auths":{"backup.example.com":{"auth":"dXNlcjpzZWNyZXQ="}}}"#;
        let (user, pass) = extract_credentials(data, "backup.example.com").unwrap();
        assert_eq!(user, "user");
        assert_eq!(pass, "secret");
    }

    #[test]
    fn test_extract_https_prefixed_key() {
        let data = br#"{"auths":{"https://backup.example.com":{"username":"u","password":"p"}}}"#;
        assert!(extract_credentials(data, "backup.example.com").is_ok());
    }

    #[test]
    fn test_extract_http_prefixed_key() {
        let data = br#"{"auths":{"http://backup.example.com":{"username":"u","password":"p"}}}"#;
        assert!(extract_credentials(data, "backup.example.com").is_ok());
    }

    #[test]
    fn test_extract_missing_host() {
        let data = br#"{"auths":{"other.example.com":{"username":"u","password":"p"}}}"#;
        assert!(matches!(
            extract_credentials(data, "backup.example.com"),
            Err(CredentialsError::NoEntry(_))
        ));
    }

    #[test]
    fn test_extract_malformed_auth() {
        // base64("no-separator")
        let data = br#"{"auths":{"backup.example.com":{"auth":"bm8tc2VwYXJhdG9y"}}}"#;
        assert!(matches!(
            extract_credentials(data, "backup.example.com"),
            Err(CredentialsError::AuthFormat)
        ));
    }

    #[test]
    fn test_extract_invalid_json() {
        assert!(matches!(
            extract_credentials(b"not-json", "backup.example.com"),
            Err(CredentialsError::Parse(_))
        ));
    }

    #[test]
    fn test_extract_empty_entry() {
        let data = br#"{"auths":{"backup.example.com":{}}}"#;
        assert!(matches!(
            extract_credentials(data, "backup.example.com"),
            Err(CredentialsError::NoEntry(_))
        ));
    }
}

//! Backup registry reference derivation.

use thiserror::Error;

/// Errors from reference rewriting.
#[derive(Debug, Error)]
pub enum RefError {
    /// The backup registry host was not configured.
    #[error("backup registry is empty")]
    EmptyRegistry,
}

/// Replace the registry host in an image reference with the backup registry
/// host. Digest suffixes are stripped (the push creates its own digest) and a
/// missing tag defaults to `:latest`.
///
/// Examples:
///
/// ```
/// # use salvor_imageref::backup_ref;
/// assert_eq!(
///     backup_ref("registry.example.com/team/app:v1", "backup.example.com:5000").unwrap(),
///     "backup.example.com:5000/team/app:v1"
/// );
/// assert_eq!(
///     backup_ref("nginx:latest", "backup.example.com:5000").unwrap(),
///     "backup.example.com:5000/nginx:latest"
/// );
/// ```
pub fn backup_ref(original_ref: &str, backup_registry: &str) -> Result<String, RefError> {
    if backup_registry.is_empty() {
        return Err(RefError::EmptyRegistry);
    }

    // Strip the digest suffix — the push creates its own digest.
    let mut reference = match original_ref.find('@') {
        Some(idx) => &original_ref[..idx],
        None => original_ref,
    }
    .to_string();

    if !has_tag(&reference) {
        reference.push_str(":latest");
    }

    let Some((first, rest)) = reference.split_once('/') else {
        // Single-component image like "nginx:latest".
        return Ok(format!("{backup_registry}/{reference}"));
    };

    // A first component with '.' or ':' is a registry host; replace it.
    if first.contains(['.', ':']) {
        return Ok(format!("{backup_registry}/{rest}"));
    }

    // No host prefix (e.g. "library/nginx:latest").
    Ok(format!("{backup_registry}/{reference}"))
}

/// True when the last path component carries a `:tag`.
fn has_tag(reference: &str) -> bool {
    let last = reference.rsplit('/').next().unwrap_or(reference);
    last.contains(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_ref_replaces_host() {
        let got = backup_ref("registry.example.com/team/app:v1", "backup.example.com:5000").unwrap();
        assert_eq!(got, "backup.example.com:5000/team/app:v1");
    }

    #[test]
    fn test_backup_ref_single_component() {
        let got = backup_ref("nginx:latest", "backup.example.com:5000").unwrap();
        assert_eq!(got, "backup.example.com:5000/nginx:latest");
    }

    #[test]
    fn test_backup_ref_strips_digest() {
        let digest = "sha256:0000000000000000000000000000000000000000000000000000000000000000";
        let got = backup_ref(
            &format!("registry.example.com/app:v2@{digest}"),
            "backup.local",
        )
        .unwrap();
        assert_eq!(got, "backup.local/app:v2");
    }

    #[test]
    fn test_backup_ref_defaults_tag() {
        let digest = "sha256:0000000000000000000000000000000000000000000000000000000000000000";
        let got = backup_ref(&format!("registry.example.com/app@{digest}"), "backup.local").unwrap();
        assert_eq!(got, "backup.local/app:latest");
    }

    #[test]
    fn test_backup_ref_no_host_prefix() {
        let got = backup_ref("library/nginx:1.25", "backup.local").unwrap();
        assert_eq!(got, "backup.local/library/nginx:1.25");
    }

    #[test]
    fn test_backup_ref_host_with_port() {
        let got = backup_ref("registry:5000/app:v1", "backup.local").unwrap();
        assert_eq!(got, "backup.local/app:v1");
    }

    #[test]
    fn test_backup_ref_empty_registry() {
        assert!(backup_ref("nginx:latest", "").is_err());
    }
}

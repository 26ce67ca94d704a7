//! Image reference parsing helpers.
//!
//! This library answers one question for the salvage pipeline: does an image
//! reference pin content by digest? Only digest-pinned references are
//! **actionable** — a tag can point anywhere, but a digest identifies the
//! exact bytes that may still be cached on a peer node.
//!
//! It also derives backup-registry references and extracts registry
//! credentials from dockerconfigjson payloads for the optional push leg.

mod backup;
mod credentials;

pub use backup::{backup_ref, RefError};
pub use credentials::{extract_credentials, CredentialsError};

/// Length of "sha256:" plus 64 hex characters.
const DIGEST_LEN: usize = 71;

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The raw image string from the pod spec.
    pub original: String,

    /// The sha256 digest, empty if tag-only.
    pub digest: String,

    /// True when the image reference includes a digest.
    pub actionable: bool,
}

/// Parse an image reference and extract the digest if present.
///
/// Supported formats:
///   - `registry/repo@sha256:abc123...`  -> actionable
///   - `registry/repo:tag@sha256:abc...` -> actionable
///   - `registry/repo:tag`               -> not actionable
///   - `registry/repo`                   -> not actionable (implies `:latest`)
///
/// Never fails: malformed or empty input yields `actionable: false`.
pub fn resolve(image: &str) -> Resolution {
    let mut r = Resolution {
        original: image.to_string(),
        digest: String::new(),
        actionable: false,
    };

    let Some(idx) = image.rfind('@') else {
        return r;
    };

    let digest = &image[idx + 1..];
    if is_sha256_digest(digest) {
        r.digest = digest.to_string();
        r.actionable = true;
    }

    r
}

/// True for exactly `sha256:` followed by 64 hex characters.
pub fn is_sha256_digest(s: &str) -> bool {
    if s.len() != DIGEST_LEN {
        return false;
    }
    let Some(hex) = s.strip_prefix("sha256:") else {
        return false;
    };
    hex.bytes().all(|b| b.is_ascii_hexdigit())
}

/// The first 8 hex characters of a `sha256:<hex>` digest, used for compound
/// resource names. Falls back to the raw string when the prefix is missing.
pub fn short_digest(digest: &str) -> &str {
    let hex = digest.strip_prefix("sha256:").unwrap_or(digest);
    &hex[..hex.len().min(8)]
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX64: &str = "b50153e8abcdb50153e8abcdb50153e8abcdb50153e8abcdb50153e8abcd0123";

    #[test]
    fn test_resolve_digest_ref() {
        let image = format!("registry.example.com/app@sha256:{HEX64}");
        let r = resolve(&image);
        assert!(r.actionable);
        assert_eq!(r.digest, format!("sha256:{HEX64}"));
        assert_eq!(r.original, image);
    }

    #[test]
    fn test_resolve_tag_and_digest_ref() {
        let image = format!("registry.example.com/app:v1@sha256:{HEX64}");
        let r = resolve(&image);
        assert!(r.actionable);
        assert_eq!(r.digest, format!("sha256:{HEX64}"));
    }

    #[test]
    fn test_resolve_tag_only() {
        let r = resolve("registry.example.com/app:v1");
        assert!(!r.actionable);
        assert!(r.digest.is_empty());
    }

    #[test]
    fn test_resolve_bare_repo() {
        let r = resolve("nginx");
        assert!(!r.actionable);
    }

    #[test]
    fn test_resolve_empty() {
        let r = resolve("");
        assert!(!r.actionable);
        assert!(r.digest.is_empty());
    }

    #[test]
    fn test_resolve_rejects_short_digest() {
        let r = resolve("app@sha256:abc123");
        assert!(!r.actionable);
    }

    #[test]
    fn test_resolve_rejects_non_hex_digest() {
        let bad = format!("app@sha256:{}", "z".repeat(64));
        let r = resolve(&bad);
        assert!(!r.actionable);
    }

    #[test]
    fn test_resolve_rejects_other_algorithms() {
        let r = resolve(&format!("app@sha512:{HEX64}"));
        assert!(!r.actionable);
    }

    #[test]
    fn test_short_digest() {
        assert_eq!(short_digest(&format!("sha256:{HEX64}")), "b50153e8");
        assert_eq!(short_digest("abc"), "abc");
    }
}

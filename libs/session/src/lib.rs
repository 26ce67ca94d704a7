//! In-memory session store for authorised image transfers.
//!
//! A session binds an opaque token to one export: the digest to ship, the
//! source node, the target node, and an expiry. The controller mints the
//! token; the source agent adopts it when `PrepareExport` arrives, which ties
//! the authorisation to the initiating controller — a third party cannot call
//! `ExportImage` with a guessed token.
//!
//! Tokens are 256 bits from the OS RNG, hex encoded. They must never be
//! derived from the digest or workload identity.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::rngs::OsRng;
use rand::RngCore;

/// An authorised image transfer between two nodes.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque bearer token.
    pub token: String,

    /// Image digest this session authorises.
    pub digest: String,

    /// Node the image is exported from.
    pub source_node: String,

    /// Node the image is imported to.
    pub target_node: String,

    /// Expiry instant; the session is invalid afterwards.
    pub expires_at: Instant,
}

/// Thread-safe in-memory session store.
///
/// The mutex is held only for O(1) map operations.
#[derive(Debug, Default)]
pub struct Store {
    sessions: Mutex<HashMap<String, Session>>,
}

impl Store {
    /// Create an empty session store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new session with a fresh random token and the given TTL.
    pub fn create(&self, digest: &str, source_node: &str, target_node: &str, ttl: Duration) -> Session {
        let session = Session {
            token: new_token(),
            digest: digest.to_string(),
            source_node: source_node.to_string(),
            target_node: target_node.to_string(),
            expires_at: Instant::now() + ttl,
        };

        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(session.token.clone(), session.clone());
        session
    }

    /// Adopt an externally minted token (the agent side of `PrepareExport`).
    /// Source and target node are unknown to the agent and left empty.
    pub fn register(&self, token: &str, digest: &str, ttl: Duration) {
        let session = Session {
            token: token.to_string(),
            digest: digest.to_string(),
            source_node: String::new(),
            target_node: String::new(),
            expires_at: Instant::now() + ttl,
        };

        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(session.token.clone(), session);
    }

    /// Return the session for a token if it exists and has not expired.
    /// Expired sessions are deleted on access.
    pub fn validate(&self, token: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().unwrap();

        let expired = sessions
            .get(token)
            .map(|s| Instant::now() >= s.expires_at)?;
        if expired {
            sessions.remove(token);
            return None;
        }
        sessions.get(token).cloned()
    }

    /// Remove a session by token. Idempotent.
    pub fn delete(&self, token: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.remove(token);
    }

    /// Remove all expired sessions.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().unwrap();
        sessions.retain(|_, s| now < s.expires_at);
    }

    /// Number of active sessions. Intended for tests.
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// True when no sessions are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 256 random bits, hex encoded.
fn new_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_create_and_validate() {
        let store = Store::new();
        let session = store.create("sha256:abc", "node-1", "node-2", TTL);

        let got = store.validate(&session.token).unwrap();
        assert_eq!(got.digest, "sha256:abc");
        assert_eq!(got.source_node, "node-1");
        assert_eq!(got.target_node, "node-2");
    }

    #[test]
    fn test_tokens_are_unique_and_long() {
        let store = Store::new();
        let a = store.create("sha256:abc", "n1", "n2", TTL);
        let b = store.create("sha256:abc", "n1", "n2", TTL);
        assert_ne!(a.token, b.token);
        assert_eq!(a.token.len(), 64);
    }

    #[test]
    fn test_validate_unknown_token() {
        let store = Store::new();
        assert!(store.validate("nope").is_none());
    }

    #[test]
    fn test_expired_session_deleted_on_read() {
        let store = Store::new();
        let session = store.create("sha256:abc", "n1", "n2", Duration::ZERO);

        assert!(store.validate(&session.token).is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = Store::new();
        let session = store.create("sha256:abc", "n1", "n2", TTL);

        store.delete(&session.token);
        store.delete(&session.token);
        assert!(store.validate(&session.token).is_none());
    }

    #[test]
    fn test_register_adopts_token() {
        let store = Store::new();
        store.register("external-token", "sha256:def", TTL);

        let got = store.validate("external-token").unwrap();
        assert_eq!(got.digest, "sha256:def");
        assert!(got.source_node.is_empty());
    }

    #[test]
    fn test_cleanup_sweeps_expired() {
        let store = Store::new();
        store.create("sha256:a", "n1", "n2", Duration::ZERO);
        store.create("sha256:b", "n1", "n2", TTL);

        store.cleanup();
        assert_eq!(store.len(), 1);
    }
}

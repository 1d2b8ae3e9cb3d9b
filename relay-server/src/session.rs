//! Session table: live connection → authenticated identity.
//!
//! A session exists iff its connection has authenticated and has not yet
//! closed. Only the task that owns a connection writes that connection's
//! entry, so the table needs no locking beyond the shard locks in
//! [`DashMap`].

use crate::credentials::CredentialStore;
use crate::error::{ProtocolError, ProtocolResult};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use subtle::ConstantTimeEq;

/// Process-unique identity of a live connection. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next identity.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value (rate limiter key).
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An authenticated connection's identity.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Authenticated account name.
    pub username: String,
    /// Bearer token issued at authentication.
    pub token: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("token", &token_prefix(&self.token))
            .finish()
    }
}

/// First eight characters of a token, for log lines.
pub fn token_prefix(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

/// All live sessions.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: DashMap<ConnectionId, Session>,
}

impl SessionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check credentials and, on success, bind a fresh token to `connection`.
    ///
    /// A previous session on the same connection is replaced. On failure the
    /// existing session (if any) is left as it was.
    pub async fn authenticate(
        &self,
        store: &CredentialStore,
        connection: ConnectionId,
        username: &str,
        password: &str,
    ) -> ProtocolResult<String> {
        if !store.verify(username, password).await {
            return Err(ProtocolError::AuthenticationFailed);
        }

        let token = uuid::Uuid::new_v4().to_string();
        let previous = self.sessions.insert(
            connection,
            Session {
                username: username.to_string(),
                token: token.clone(),
            },
        );

        if let Some(previous) = previous {
            tracing::debug!(
                "{} replaced session {} ({})",
                connection,
                token_prefix(&previous.token),
                previous.username
            );
        }

        Ok(token)
    }

    /// Return the session for `connection` if `presented` is its token.
    ///
    /// `NotAuthenticated` when the connection has no session; `BadToken` when
    /// the token is absent or does not match.
    pub fn validate(
        &self,
        connection: ConnectionId,
        presented: Option<&str>,
    ) -> ProtocolResult<Session> {
        let session = self
            .sessions
            .get(&connection)
            .ok_or(ProtocolError::NotAuthenticated)?;

        let presented = presented.ok_or(ProtocolError::BadToken)?;
        if bool::from(presented.as_bytes().ct_eq(session.token.as_bytes())) {
            Ok(session.value().clone())
        } else {
            Err(ProtocolError::BadToken)
        }
    }

    /// Remove the session for `connection`. Safe to call more than once.
    pub fn drop_connection(&self, connection: ConnectionId) -> Option<Session> {
        self.sessions.remove(&connection).map(|(_, session)| session)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether there are no live sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            path: dir.path().join("store.json"),
            kdf_memory_kib: 1024,
            kdf_iterations: 1,
            ..StoreConfig::default()
        };
        let store = CredentialStore::load(&config).unwrap();
        (dir, store)
    }

    #[test]
    fn connection_ids_are_unique() {
        let ids: HashSet<_> = (0..100).map(|_| ConnectionId::next()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[tokio::test]
    async fn authenticate_issues_unique_tokens() {
        let (_dir, store) = test_store();
        let table = SessionTable::new();

        let mut tokens = HashSet::new();
        for _ in 0..5 {
            let conn = ConnectionId::next();
            let token = table
                .authenticate(&store, conn, "Node1", "secure_pass_node1")
                .await
                .unwrap();
            assert_eq!(token.len(), 36);
            tokens.insert(token);
        }
        assert_eq!(tokens.len(), 5);
        assert_eq!(table.len(), 5);
    }

    #[tokio::test]
    async fn failed_authentication_creates_no_session() {
        let (_dir, store) = test_store();
        let table = SessionTable::new();
        let conn = ConnectionId::next();

        for (user, pass) in [("alice", "secure_pass_node1"), ("Node1", "wrong")] {
            let result = table.authenticate(&store, conn, user, pass).await;
            assert!(matches!(result, Err(ProtocolError::AuthenticationFailed)));
        }
        assert!(table.is_empty());
        assert!(matches!(
            table.validate(conn, Some("anything")),
            Err(ProtocolError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn validate_checks_token() {
        let (_dir, store) = test_store();
        let table = SessionTable::new();
        let conn = ConnectionId::next();
        let token = table
            .authenticate(&store, conn, "Node2", "secure_pass_node2")
            .await
            .unwrap();

        let session = table.validate(conn, Some(token.as_str())).unwrap();
        assert_eq!(session.username, "Node2");

        assert!(matches!(
            table.validate(conn, Some("not-the-token")),
            Err(ProtocolError::BadToken)
        ));
        assert!(matches!(
            table.validate(conn, None),
            Err(ProtocolError::BadToken)
        ));
        assert!(matches!(
            table.validate(conn, Some("")),
            Err(ProtocolError::BadToken)
        ));
    }

    #[tokio::test]
    async fn tokens_are_bound_to_their_connection() {
        let (_dir, store) = test_store();
        let table = SessionTable::new();
        let a = ConnectionId::next();
        let b = ConnectionId::next();

        let token_a = table
            .authenticate(&store, a, "Node1", "secure_pass_node1")
            .await
            .unwrap();
        table
            .authenticate(&store, b, "Node2", "secure_pass_node2")
            .await
            .unwrap();

        assert!(matches!(
            table.validate(b, Some(token_a.as_str())),
            Err(ProtocolError::BadToken)
        ));
    }

    #[tokio::test]
    async fn drop_invalidates_token() {
        let (_dir, store) = test_store();
        let table = SessionTable::new();
        let conn = ConnectionId::next();
        let token = table
            .authenticate(&store, conn, "Node1", "secure_pass_node1")
            .await
            .unwrap();

        assert!(table.drop_connection(conn).is_some());
        assert!(table.drop_connection(conn).is_none());
        assert!(matches!(
            table.validate(conn, Some(token.as_str())),
            Err(ProtocolError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn reauthentication_replaces_session() {
        let (_dir, store) = test_store();
        let table = SessionTable::new();
        let conn = ConnectionId::next();

        let first = table
            .authenticate(&store, conn, "Node1", "secure_pass_node1")
            .await
            .unwrap();
        let second = table
            .authenticate(&store, conn, "Node2", "secure_pass_node2")
            .await
            .unwrap();

        assert_eq!(table.len(), 1);
        assert!(table.validate(conn, Some(first.as_str())).is_err());
        assert_eq!(
            table.validate(conn, Some(second.as_str())).unwrap().username,
            "Node2"
        );
    }

    #[tokio::test]
    async fn failed_reauthentication_keeps_session() {
        let (_dir, store) = test_store();
        let table = SessionTable::new();
        let conn = ConnectionId::next();

        let token = table
            .authenticate(&store, conn, "Node1", "secure_pass_node1")
            .await
            .unwrap();
        assert!(table
            .authenticate(&store, conn, "Node1", "wrong")
            .await
            .is_err());

        assert_eq!(
            table.validate(conn, Some(token.as_str())).unwrap().username,
            "Node1"
        );
    }

    #[test]
    fn session_debug_shows_token_prefix_only() {
        let session = Session {
            username: "Node1".into(),
            token: "0123456789abcdef".into(),
        };
        let debug = format!("{session:?}");
        assert!(debug.contains("01234567"));
        assert!(!debug.contains("89abcdef"));
    }
}

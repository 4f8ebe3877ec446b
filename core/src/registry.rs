//! Identity Registry — the live mapping between connections and identities.
//!
//! One lock guards both indices so `join` and `leave` can never leave the
//! reachable set inconsistent with the per-connection bindings mid-update.
//! The router never touches the maps directly; it goes through the
//! operations here.

use crate::protocol::ServerEvent;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Opaque user key (e.g. an email) supplied by the auth collaborator.
/// Case-sensitive; the relay never validates it beyond non-emptiness.
pub type Identity = String;

/// Outbound queue for one connection. Sends are ordered per connection,
/// which is what gives per-destination FIFO delivery.
pub type EventSender = UnboundedSender<ServerEvent>;

/// Handle for one transport-level link to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Registry error types
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("identity must be a non-empty string")]
    EmptyIdentity,
    #[error("unknown connection")]
    UnknownConnection,
}

/// One live connection's registry entry.
struct Connection {
    /// Bound identity, set by the first `join` on this connection.
    identity: Option<Identity>,
    /// Outbound event queue to this connection.
    tx: EventSender,
}

struct RegistryInner {
    /// connection -> entry (binding + outbound queue)
    connections: HashMap<ConnectionId, Connection>,
    /// identity -> connections currently bound to it. An identity is
    /// reachable iff it has an entry here, and entries are never empty.
    identities: HashMap<Identity, HashSet<ConnectionId>>,
}

/// Process-wide presence state. Reset on restart by design.
pub struct IdentityRegistry {
    inner: RwLock<RegistryInner>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                connections: HashMap::new(),
                identities: HashMap::new(),
            }),
        }
    }

    /// Track a freshly accepted connection. No identity is bound until the
    /// connection sends a join event.
    pub fn register(&self, tx: EventSender) -> ConnectionId {
        let id = ConnectionId::new();
        let mut inner = self.inner.write();
        inner.connections.insert(
            id,
            Connection {
                identity: None,
                tx,
            },
        );
        id
    }

    /// Bind `identity` to `conn`. Idempotent for a repeated join with the
    /// same identity. A join with a *different* identity on an already-bound
    /// connection silently releases the old binding first.
    pub fn join(&self, conn: ConnectionId, identity: &str) -> Result<(), RegistryError> {
        if identity.is_empty() {
            return Err(RegistryError::EmptyIdentity);
        }

        let mut inner = self.inner.write();
        let previous = match inner.connections.get_mut(&conn) {
            Some(entry) => entry.identity.replace(identity.to_string()),
            None => return Err(RegistryError::UnknownConnection),
        };

        match previous {
            Some(ref old) if old == identity => {}
            Some(old) => {
                Self::unbind(&mut inner, conn, &old);
            }
            None => {}
        }

        inner
            .identities
            .entry(identity.to_string())
            .or_default()
            .insert(conn);

        Ok(())
    }

    /// Release a connection on disconnect. Returns the identity that became
    /// unreachable, if this was its last connection. A connection that never
    /// joined cleans up to nothing.
    pub fn leave(&self, conn: ConnectionId) -> Option<Identity> {
        let mut inner = self.inner.write();
        let entry = inner.connections.remove(&conn)?;
        let identity = entry.identity?;
        let last = Self::unbind(&mut inner, conn, &identity);
        last.then_some(identity)
    }

    /// Remove `conn` from `identity`'s connection set; returns true when the
    /// identity has no connections left and drops out of the reachable set.
    fn unbind(inner: &mut RegistryInner, conn: ConnectionId, identity: &str) -> bool {
        if let Some(conns) = inner.identities.get_mut(identity) {
            conns.remove(&conn);
            if conns.is_empty() {
                inner.identities.remove(identity);
                return true;
            }
        }
        false
    }

    /// Every live destination bound to `identity`. Empty means the identity
    /// is offline, which is a normal condition, not an error.
    pub fn resolve(&self, identity: &str) -> Vec<EventSender> {
        let inner = self.inner.read();
        match inner.identities.get(identity) {
            Some(conns) => conns
                .iter()
                .filter_map(|c| inner.connections.get(c).map(|entry| entry.tx.clone()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// The identity bound to a connection, if it has joined.
    pub fn identity_of(&self, conn: ConnectionId) -> Option<Identity> {
        self.inner
            .read()
            .connections
            .get(&conn)
            .and_then(|entry| entry.identity.clone())
    }

    /// Unordered view of the reachable set, for presence broadcasts.
    pub fn snapshot(&self) -> Vec<Identity> {
        self.inner.read().identities.keys().cloned().collect()
    }

    pub fn is_reachable(&self, identity: &str) -> bool {
        self.inner.read().identities.contains_key(identity)
    }

    /// Outbound queues of every open connection, joined or not. Presence
    /// broadcasts go to all of them.
    pub fn all_senders(&self) -> Vec<EventSender> {
        self.inner
            .read()
            .connections
            .values()
            .map(|entry| entry.tx.clone())
            .collect()
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.inner.read().connections.len()
    }

    /// Number of reachable identities.
    pub fn identity_count(&self) -> usize {
        self.inner.read().identities.len()
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

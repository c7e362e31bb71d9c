//! Session registry: lookup of live sessions by identifier.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::session::{Session, SessionId};

/// Mapping from session identifier to live session.
///
/// Insertion and lookup only - there is no eviction. Implementations must
/// be safe to share across the tasks handling concurrent connections.
pub trait SessionRegistry: Send + Sync {
    /// Insert a session, replacing any existing entry with the same
    /// identifier (last write wins, no error).
    fn add(&self, session: Arc<Session>);

    /// Look up a session by identifier.
    fn by_id(&self, id: SessionId) -> Option<Arc<Session>>;
}

/// In-memory registry behind a single mutex.
///
/// One lock guards the whole mapping; contention is expected to be low
/// (one insert per handshake, one lookup per received message).
#[derive(Default)]
pub struct MemoryRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionRegistry for MemoryRegistry {
    fn add(&self, session: Arc<Session>) {
        let id = session.id();
        if self.sessions.lock().unwrap().insert(id, session).is_some() {
            debug!(%id, "replaced existing session");
        }
    }

    fn by_id(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.lock().unwrap().get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SECRET_LEN;

    fn session(connecting: &str, accepting: &str, secret: u8) -> Arc<Session> {
        let id = SessionId::derive(connecting, accepting);
        Arc::new(Session::new(id, &[secret; SECRET_LEN], accepting.to_string()).unwrap())
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let registry = MemoryRegistry::new();
        assert!(registry.by_id(SessionId::derive("10.0.0.1", "10.0.0.2")).is_none());
    }

    #[test]
    fn test_add_then_lookup() {
        let registry = MemoryRegistry::new();
        let session = session("10.0.0.1", "10.0.0.2", 1);
        registry.add(session.clone());

        let found = registry.by_id(session.id()).unwrap();
        assert!(Arc::ptr_eq(&found, &session));
    }

    #[test]
    fn test_insert_is_last_write_wins() {
        let registry = MemoryRegistry::new();
        let first = session("10.0.0.1", "10.0.0.2", 1);
        let second = session("10.0.0.1", "10.0.0.2", 2);
        assert_eq!(first.id(), second.id());

        registry.add(first.clone());
        registry.add(second.clone());

        let found = registry.by_id(first.id()).unwrap();
        assert!(Arc::ptr_eq(&found, &second));
    }
}

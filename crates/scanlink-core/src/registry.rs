//! Registry of live sessions.
//!
//! All membership changes and snapshot reads go through a single mutex that
//! is held only for the duration of the mutation or copy, never across
//! network I/O. Broadcasting iterates a [`Snapshot`] after the lock is
//! released, so a slow client can never stall connects or disconnects.

use crate::session::{Session, SessionId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, trace};

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A session with this identity is already registered.
    ///
    /// This indicates a connection handler bug and is fatal to the
    /// connection attempt that triggered it.
    #[error("Duplicate session: {0}")]
    DuplicateSession(SessionId),
}

/// Immutable copy of registry membership at one instant.
pub type Snapshot = Vec<Arc<Session>>;

/// The set of currently connected sessions, keyed by identity.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<Session>>> {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a session.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateSession`] if the identity is taken.
    pub fn register(&self, session: Arc<Session>) -> Result<(), RegistryError> {
        let id = session.id();
        let count = {
            let mut sessions = self.lock();
            match sessions.entry(id) {
                Entry::Occupied(_) => return Err(RegistryError::DuplicateSession(id)),
                Entry::Vacant(slot) => {
                    slot.insert(session);
                }
            }
            sessions.len()
        };

        debug!(session = %id, sessions = count, "Registered session");
        Ok(())
    }

    /// Remove a session.
    ///
    /// Returns `true` if it was present. Removing an absent session is a
    /// no-op, since the channel-closed path and a cleanup path may race.
    pub fn unregister(&self, id: SessionId) -> bool {
        let (removed, count) = {
            let mut sessions = self.lock();
            let removed = sessions.remove(&id).is_some();
            (removed, sessions.len())
        };

        if removed {
            debug!(session = %id, sessions = count, "Unregistered session");
        } else {
            trace!(session = %id, "Unregister of absent session");
        }
        removed
    }

    /// Copy the current membership.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.lock().values().cloned().collect()
    }

    /// Remove and return every session.
    pub fn drain(&self) -> Snapshot {
        let drained: Snapshot = self.lock().drain().map(|(_, session)| session).collect();
        debug!(sessions = drained.len(), "Drained registry");
        drained
    }

    /// Check if a session is registered.
    #[must_use]
    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let sessions = self.lock();
        RegistryStats {
            session_count: sessions.len(),
            open_count: sessions.values().filter(|s| s.is_open()).count(),
        }
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of registered sessions.
    pub session_count: usize,
    /// Registered sessions still in the open state.
    pub open_count: usize,
}

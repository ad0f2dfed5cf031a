//! In-memory session store.
//!
//! The map is guarded by a `parking_lot::RwLock` and never held across an
//! await.  Each [`Session`] wraps its conversation handle in a
//! `tokio::sync::Mutex`, which serializes turns for that session in FIFO
//! order while turns for different sessions run in parallel.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::MutexGuard;

use ww_domain::trace::TraceEvent;

use crate::id::{IdGenerationError, IdGenerator, RandomIds};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One ongoing conversation.  `H` is the backend's conversation handle.
pub struct Session<H> {
    id: String,
    last_used: Mutex<Instant>,
    conversation: tokio::sync::Mutex<H>,
}

impl<H> Session<H> {
    fn new(id: String, handle: H) -> Self {
        Self {
            id,
            last_used: Mutex::new(Instant::now()),
            conversation: tokio::sync::Mutex::new(handle),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for exclusive use of the conversation handle.  Hold the guard for
    /// the whole turn; dropping it lets the next queued turn proceed.
    ///
    /// The session counts as used both when the turn starts and when the
    /// guard is released, so a long turn never ends already past its TTL.
    pub async fn lock(&self) -> TurnGuard<'_, H> {
        let guard = self.conversation.lock().await;
        self.touch();
        TurnGuard {
            session: self,
            guard,
        }
    }

    /// True while a turn holds the conversation handle.
    pub fn is_busy(&self) -> bool {
        self.conversation.try_lock().is_err()
    }

    pub fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used.lock().elapsed()
    }
}

impl<H> std::fmt::Debug for Session<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("idle_for", &self.idle_for())
            .finish_non_exhaustive()
    }
}

/// Exclusive access to a session's conversation handle for one turn.
pub struct TurnGuard<'a, H> {
    session: &'a Session<H>,
    guard: MutexGuard<'a, H>,
}

impl<H> Deref for TurnGuard<'_, H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.guard
    }
}

impl<H> DerefMut for TurnGuard<'_, H> {
    fn deref_mut(&mut self) -> &mut H {
        &mut self.guard
    }
}

impl<H> Drop for TurnGuard<'_, H> {
    fn drop(&mut self) {
        self.session.touch();
    }
}

/// Outcome of [`SessionStore::resolve_or_create`].
pub struct Resolved<H> {
    pub session: Arc<Session<H>>,
    pub is_new: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SessionStore<H> {
    sessions: RwLock<HashMap<String, Arc<Session<H>>>>,
    ids: Box<dyn IdGenerator>,
}

impl<H> Default for SessionStore<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> SessionStore<H> {
    /// A store that mints random UUID v4 identifiers.
    pub fn new() -> Self {
        Self::with_id_generator(RandomIds)
    }

    pub fn with_id_generator(ids: impl IdGenerator + 'static) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ids: Box::new(ids),
        }
    }

    /// Return the session named by `id`, or create one.
    ///
    /// An absent, empty, or unknown `id` yields a new session under a freshly
    /// generated identifier; the conversation handle comes from `start`.  A
    /// known `id` returns the existing session untouched and `start` is not
    /// called.
    pub fn resolve_or_create<F>(
        &self,
        id: Option<&str>,
        start: F,
    ) -> Result<Resolved<H>, IdGenerationError>
    where
        F: FnOnce() -> H,
    {
        // Fast path: session already exists.
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            if let Some(session) = self.sessions.read().get(id) {
                session.touch();
                return Ok(Resolved {
                    session: session.clone(),
                    is_new: false,
                });
            }
            tracing::debug!(requested = %id, "unknown session id, minting a new one");
        }

        // Slow path: create new session.
        let new_id = self.ids.generate()?;
        let session = Arc::new(Session::new(new_id.clone(), start()));

        let live_sessions = {
            let mut sessions = self.sessions.write();
            match sessions.entry(new_id.clone()) {
                Entry::Occupied(_) => return Err(IdGenerationError::Collision(new_id)),
                Entry::Vacant(slot) => {
                    slot.insert(session.clone());
                }
            }
            sessions.len()
        };

        TraceEvent::SessionResolved {
            session_id: new_id,
            is_new: true,
            live_sessions,
        }
        .emit();

        Ok(Resolved {
            session,
            is_new: true,
        })
    }

    /// Look up a session by its identifier.
    pub fn get(&self, id: &str) -> Option<Arc<Session<H>>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Identifiers of all live sessions (unordered).
    pub fn ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Remove sessions idle for at least `ttl`.
    ///
    /// A session is kept while a turn holds its lock or while any request
    /// still holds a reference to it (resolved but not yet locked).
    /// Returns the number of sessions removed.
    pub fn prune_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| {
            Arc::strong_count(s) > 1 || s.is_busy() || s.idle_for() < ttl
        });
        before - sessions.len()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

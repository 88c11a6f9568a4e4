//! Single-active-connection guard
//!
//! A single user may open multiple browser tabs; only the newest connection
//! stays active. Each connection is Active or Evicted, with one transition
//! (Active→Evicted) triggered only by a different connection's `admit`. At
//! any time there is exactly one active connection, or zero.

use std::fmt;
use std::sync::Mutex;

use uuid::Uuid;

/// Opaque identity of one browser-side connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Tracks the sole active connection. The token is overwritten, never
/// queued, on each new admission.
#[derive(Debug, Default)]
pub struct SessionGuard {
    active: Mutex<Option<ConnectionId>>,
}

impl SessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` as the sole active connection. Returns the connection it
    /// evicted, if there was one.
    pub fn admit(&self, id: ConnectionId) -> Option<ConnectionId> {
        let mut active = self.active.lock().expect("guard lock poisoned");
        let previous = active.replace(id);
        previous.filter(|prev| *prev != id)
    }

    pub fn is_active(&self, id: ConnectionId) -> bool {
        *self.active.lock().expect("guard lock poisoned") == Some(id)
    }

    /// Drop `id` if it is the active connection. Idempotent; a stale caller
    /// cannot evict its successor.
    pub fn evict(&self, id: ConnectionId) {
        let mut active = self.active.lock().expect("guard lock poisoned");
        if *active == Some(id) {
            *active = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_makes_connection_active() {
        let guard = SessionGuard::new();
        let a = ConnectionId::fresh();
        assert_eq!(guard.admit(a), None);
        assert!(guard.is_active(a));
    }

    #[test]
    fn admitting_b_evicts_a() {
        let guard = SessionGuard::new();
        let a = ConnectionId::fresh();
        let b = ConnectionId::fresh();
        guard.admit(a);
        assert_eq!(guard.admit(b), Some(a));
        assert!(!guard.is_active(a));
        assert!(guard.is_active(b));
    }

    #[test]
    fn readmitting_the_active_connection_reports_no_eviction() {
        let guard = SessionGuard::new();
        let a = ConnectionId::fresh();
        guard.admit(a);
        assert_eq!(guard.admit(a), None);
        assert!(guard.is_active(a));
    }

    #[test]
    fn evict_is_idempotent_and_ignores_stale_callers() {
        let guard = SessionGuard::new();
        let a = ConnectionId::fresh();
        let b = ConnectionId::fresh();
        guard.admit(a);
        guard.admit(b);

        // A was already evicted by B's admission; its own evict is a no-op
        // and must not take B down with it.
        guard.evict(a);
        guard.evict(a);
        assert!(guard.is_active(b));

        guard.evict(b);
        assert!(!guard.is_active(b));
    }
}

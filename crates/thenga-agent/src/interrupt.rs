//! Per-session barge-in state, decoupled from the turn engine.
//!
//! The engine never polls this flag; the session boundary decides whether to
//! suppress audio emission for chunks produced after an interrupt. Sessions
//! are fully isolated from each other, and every operation on an
//! unregistered session is a no-op failure value rather than an error.

use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
pub struct InterruptCoordinator {
    flags: Mutex<HashMap<String, bool>>,
}

impl InterruptCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session. Re-registering resets the flag to false.
    pub fn register(&self, session_id: &str) {
        let mut flags = self.flags.lock().expect("interrupt map poisoned");
        flags.insert(session_id.to_string(), false);
        debug!(session_id, "interrupt tracking registered");
    }

    /// Flags the session as interrupted. Returns false when the session is
    /// not registered.
    pub fn interrupt(&self, session_id: &str) -> bool {
        let mut flags = self.flags.lock().expect("interrupt map poisoned");
        match flags.get_mut(session_id) {
            Some(flag) => {
                *flag = true;
                debug!(session_id, "speech interrupted");
                true
            }
            None => false,
        }
    }

    /// Current flag; false for unregistered sessions.
    pub fn is_interrupted(&self, session_id: &str) -> bool {
        let flags = self.flags.lock().expect("interrupt map poisoned");
        flags.get(session_id).copied().unwrap_or(false)
    }

    /// Resets the flag, typically when synthesis (re)starts.
    pub fn clear(&self, session_id: &str) {
        let mut flags = self.flags.lock().expect("interrupt map poisoned");
        if let Some(flag) = flags.get_mut(session_id) {
            *flag = false;
        }
    }

    /// Drops all state for the session.
    pub fn cleanup(&self, session_id: &str) {
        let mut flags = self.flags.lock().expect("interrupt map poisoned");
        if flags.remove(session_id).is_some() {
            debug!(session_id, "interrupt tracking cleaned up");
        }
    }
}

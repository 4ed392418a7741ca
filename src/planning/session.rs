// src/planning/session.rs

//! The planning session: owner of the update-round lock.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

/// Key of one update round. Every object records the key of the last round
/// that visited it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RoundKey(Uuid);

impl RoundKey {
    pub fn new() -> Self {
        RoundKey(Uuid::new_v4())
    }
}

impl Default for RoundKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoundKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared by every graph that must not run update rounds concurrently.
///
/// Only the call that starts a round takes the lock; calls nested inside the
/// round reuse its key and never touch the lock again.
#[derive(Debug, Default)]
pub struct PlanningSession {
    round_lock: Mutex<()>,
}

impl PlanningSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Block until no other round is in flight.
    pub fn lock_round(&self) -> MutexGuard<'_, ()> {
        // the lock guards no data; a poisoned lock is still usable
        self.round_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn rounds_on_a_shared_session_are_serialised() {
        let session = PlanningSession::new();
        let in_round = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let session = Arc::clone(&session);
                let in_round = Arc::clone(&in_round);
                thread::spawn(move || {
                    let _guard = session.lock_round();
                    assert!(!in_round.swap(true, Ordering::SeqCst));
                    thread::sleep(Duration::from_millis(5));
                    in_round.store(false, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}

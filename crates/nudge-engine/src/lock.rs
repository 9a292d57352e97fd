//! Per-process send locks keyed by (user, nudge type).
//!
//! Advisory and in-memory only: not shared across instances and gone on
//! restart. The guard releases on drop, so every exit path frees the key.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Default)]
pub struct SendLocks {
    held: Mutex<HashSet<LockKey>>,
}

impl SendLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when another delivery for the same key is in flight.
    pub fn try_acquire(&self, user_id: &str, nudge_type: &str) -> Option<SendLockGuard<'_>> {
        let key = lock_key(user_id, nudge_type);
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(key.clone()) {
            return None;
        }
        Some(SendLockGuard { locks: self, key })
    }

    pub fn is_held(&self, user_id: &str, nudge_type: &str) -> bool {
        let held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.contains(&lock_key(user_id, nudge_type))
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().map(|h| h.len()).unwrap_or(0)
    }

    fn release(&self, key: &LockKey) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(key);
    }
}

type LockKey = (String, String);

fn lock_key(user_id: &str, nudge_type: &str) -> LockKey {
    (user_id.to_string(), nudge_type.to_string())
}

/// Held while one delivery runs.
pub struct SendLockGuard<'a> {
    locks: &'a SendLocks,
    key: LockKey,
}

impl Drop for SendLockGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_drop() {
        let locks = SendLocks::new();
        let guard = locks.try_acquire("u1", "BUDGETING").unwrap();
        assert!(locks.try_acquire("u1", "BUDGETING").is_none());
        assert!(locks.try_acquire("u1", "STREAK_WARNING").is_some());
        assert!(locks.is_held("u1", "BUDGETING"));
        drop(guard);
        assert!(!locks.is_held("u1", "BUDGETING"));
        assert!(locks.try_acquire("u1", "BUDGETING").is_some());
        assert_eq!(locks.held_count(), 0);
    }

    #[test]
    fn test_keys_with_separators_do_not_collide() {
        let locks = SendLocks::new();
        let _guard = locks.try_acquire("a-B", "C").unwrap();
        assert!(locks.try_acquire("a", "B-C").is_some());
        assert!(!locks.is_held("a", "B-C"));
        assert!(locks.is_held("a-B", "C"));
    }
}

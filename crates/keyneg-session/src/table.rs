//! Sharded session table.
//!
//! Sixteen independently locked shards keyed by `policy_id % 16`. Every
//! operation holds exactly one shard lock for its duration, and only value
//! snapshots leave the table; references never escape a shard's lock.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::session::Session;
use crate::NUM_SHARDS;

#[derive(Default)]
struct Shard {
    sessions: Mutex<HashMap<u32, Session>>,
}

/// Sharded map from policy id to session.
pub struct SessionTable {
    shards: [Shard; NUM_SHARDS],
    contention: AtomicU64,
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            shards: std::array::from_fn(|_| Shard::default()),
            contention: AtomicU64::new(0),
        }
    }

    fn shard(&self, policy_id: u32) -> &Shard {
        &self.shards[policy_id as usize % NUM_SHARDS]
    }

    /// Lock a shard, counting the times the uncontended fast path lost to
    /// another thread.
    fn lock_shard<'a>(&self, shard: &'a Shard) -> MutexGuard<'a, HashMap<u32, Session>> {
        if let Some(guard) = shard.sessions.try_lock() {
            return guard;
        }
        self.contention.fetch_add(1, Ordering::Relaxed);
        shard.sessions.lock()
    }

    /// Insert a session unless one with the same policy id already exists.
    /// Returns whether the insert happened; an existing entry is never
    /// mutated.
    pub fn insert_if_absent(&self, session: Session) -> bool {
        let mut sessions = self.lock_shard(self.shard(session.policy_id));
        match sessions.entry(session.policy_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(session);
                true
            }
        }
    }

    /// Snapshot of a session.
    pub fn get(&self, policy_id: u32) -> Option<Session> {
        self.lock_shard(self.shard(policy_id)).get(&policy_id).cloned()
    }

    /// Run a mutator against a session under its shard lock.
    pub fn update<R>(&self, policy_id: u32, mutate: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut sessions = self.lock_shard(self.shard(policy_id));
        sessions.get_mut(&policy_id).map(mutate)
    }

    /// Remove and return a session.
    pub fn remove(&self, policy_id: u32) -> Option<Session> {
        self.lock_shard(self.shard(policy_id)).remove(&policy_id)
    }

    /// Remove every session matching the predicate, locking one shard at a
    /// time. Returns the removed policy ids.
    pub fn sweep(&self, mut expired: impl FnMut(&Session) -> bool) -> Vec<u32> {
        let mut removed = Vec::new();
        for shard in &self.shards {
            let mut sessions = self.lock_shard(shard);
            sessions.retain(|&policy_id, session| {
                if expired(session) {
                    removed.push(policy_id);
                    false
                } else {
                    true
                }
            });
        }
        removed
    }

    /// Number of live sessions across all shards.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| self.lock_shard(shard).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Times a lock acquisition had to wait behind another thread.
    pub fn contention_count(&self) -> u64 {
        self.contention.load(Ordering::Relaxed)
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use std::sync::Arc;

    fn session(policy_id: u32, fill: u8) -> Session {
        Session::initiator(policy_id, [fill; 32])
    }

    #[test]
    fn test_insert_if_absent_rejects_duplicate_without_mutating() {
        let table = SessionTable::new();
        assert!(table.insert_if_absent(session(5, 0xAA)));
        assert!(!table.insert_if_absent(session(5, 0xBB)));

        let kept = table.get(5).unwrap();
        assert_eq!(kept.random1, [0xAA; 32]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_update_and_remove() {
        let table = SessionTable::new();
        table.insert_if_absent(session(9, 1));

        let previous = table.update(9, |s| {
            let old = s.state;
            s.state = SessionState::Done;
            old
        });
        assert_eq!(previous, Some(SessionState::WaitR2));
        assert_eq!(table.get(9).unwrap().state, SessionState::Done);

        assert!(table.remove(9).is_some());
        assert!(table.remove(9).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_update_missing_returns_none() {
        let table = SessionTable::new();
        assert_eq!(table.update(1, |_| ()), None);
    }

    #[test]
    fn test_sweep_removes_only_matching() {
        let table = SessionTable::new();
        for id in 1..=40 {
            table.insert_if_absent(session(id, id as u8));
        }

        let mut removed = table.sweep(|s| s.policy_id % 2 == 0);
        removed.sort_unstable();
        assert_eq!(removed, (1..=40).filter(|id| id % 2 == 0).collect::<Vec<_>>());
        assert_eq!(table.len(), 20);
        assert!(table.get(2).is_none());
        assert!(table.get(3).is_some());
    }

    #[test]
    fn test_distinct_shards_do_not_contend() {
        let table = Arc::new(SessionTable::new());
        table.insert_if_absent(session(1, 1));
        table.insert_if_absent(session(2, 2));

        // Ids 1 and 2 map to different shards, so neither thread can block
        // the other and the contention counter stays at zero.
        let handles: Vec<_> = [1u32, 2u32]
            .into_iter()
            .map(|id| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        table.update(id, |s| s.age_ms());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(table.contention_count(), 0);
    }
}

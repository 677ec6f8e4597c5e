//! The sentence-lock table.
//!
//! One process-global table of `(filename, sentence, holder)` entries
//! behind a single mutex. Presence of an entry means an exclusive write
//! lock on that sentence is held. The table is shared by every worker
//! task; the critical sections are short linear scans.

use std::sync::{Mutex, PoisonError};

/// One held sentence lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceLock {
    pub file: String,
    pub sentence: usize,
    pub holder: String,
}

/// Result of a lock acquisition attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The lock was free and is now held by the requester.
    Granted,
    /// The requester already held this lock; acquisition is idempotent.
    AlreadyHeld,
    /// Another user holds the lock.
    Denied { holder: String },
}

/// The global lock table.
#[derive(Debug, Default)]
pub struct LockTable {
    inner: Mutex<Vec<SentenceLock>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to take the exclusive lock on `(file, sentence)` for
    /// `user`. Scan and insert happen under one mutex acquisition, so at
    /// most one lock ever exists per (file, sentence).
    pub fn try_acquire(&self, file: &str, sentence: usize, user: &str) -> AcquireOutcome {
        let mut table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = table
            .iter()
            .find(|l| l.file == file && l.sentence == sentence)
        {
            if existing.holder == user {
                return AcquireOutcome::AlreadyHeld;
            }
            return AcquireOutcome::Denied {
                holder: existing.holder.clone(),
            };
        }
        table.push(SentenceLock {
            file: file.to_string(),
            sentence,
            holder: user.to_string(),
        });
        AcquireOutcome::Granted
    }

    /// Releases the lock matching `(file, sentence, user)` exactly. A
    /// release with no matching entry is logged and otherwise ignored.
    pub fn release(&self, file: &str, sentence: usize, user: &str) {
        let mut table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = table.len();
        table.retain(|l| !(l.file == file && l.sentence == sentence && l.holder == user));
        if table.len() == before {
            log::warn!("released lock {file}:{sentence} for {user}, but it was not held");
        }
    }

    /// Current holder of `(file, sentence)`, if any.
    pub fn holder(&self, file: &str, sentence: usize) -> Option<String> {
        let table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        table
            .iter()
            .find(|l| l.file == file && l.sentence == sentence)
            .map(|l| l.holder.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_and_idempotence() {
        let table = LockTable::new();
        assert_eq!(table.try_acquire("d.txt", 0, "alice"), AcquireOutcome::Granted);
        assert_eq!(
            table.try_acquire("d.txt", 0, "bob"),
            AcquireOutcome::Denied {
                holder: "alice".to_string()
            }
        );
        assert_eq!(
            table.try_acquire("d.txt", 0, "alice"),
            AcquireOutcome::AlreadyHeld
        );
        // a different sentence of the same file is independent
        assert_eq!(table.try_acquire("d.txt", 1, "bob"), AcquireOutcome::Granted);
    }

    #[test]
    fn release_frees_the_lock() {
        let table = LockTable::new();
        table.try_acquire("d.txt", 0, "alice");
        table.release("d.txt", 0, "alice");
        assert_eq!(table.try_acquire("d.txt", 0, "bob"), AcquireOutcome::Granted);
    }

    #[test]
    fn release_only_matches_exactly() {
        let table = LockTable::new();
        table.try_acquire("d.txt", 0, "alice");
        table.release("d.txt", 0, "bob"); // wrong holder: no-op
        assert_eq!(table.holder("d.txt", 0), Some("alice".to_string()));
    }
}

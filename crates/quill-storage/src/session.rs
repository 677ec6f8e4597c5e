//! The stateful write session.
//!
//! A session is created by a successful WRITE (lock acquired, whole file
//! slurped into an in-memory buffer), mutated by word-update frames, and
//! ended either by ETIRW (the worker commits the buffer) or by dropping
//! the session (client disconnect): the destructor releases the sentence
//! lock and the file on disk stays untouched.

use std::sync::Arc;

use quill_core::text;

use crate::locks::LockTable;
use crate::{Result, StorageError};

/// Per-worker write session state. A worker holds at most one.
pub struct WriteSession {
    file: String,
    sentence: usize,
    holder: String,
    buffer: String,
    locks: Arc<LockTable>,
}

impl WriteSession {
    /// Wraps an already-acquired lock and the slurped file contents.
    /// The caller is responsible for having acquired
    /// `(file, sentence, holder)` in `locks`.
    pub fn new(
        file: String,
        sentence: usize,
        holder: String,
        buffer: String,
        locks: Arc<LockTable>,
    ) -> Self {
        WriteSession {
            file,
            sentence,
            holder,
            buffer,
            locks,
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn sentence(&self) -> usize {
        self.sentence
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Whether the locked sentence index is valid for the slurped
    /// contents: an existing sentence, or one past the end (append).
    pub fn sentence_in_range(&self) -> bool {
        self.sentence <= text::sentence_count(&self.buffer)
    }

    /// Applies one word update to the locked sentence: replace in range,
    /// append at the word count, reject beyond.
    pub fn apply(&mut self, word_idx: usize, new_word: &str) -> Result<()> {
        let updated = text::apply_word_edit(&self.buffer, self.sentence, word_idx, new_word)
            .map_err(StorageError::Edit)?;
        self.buffer = updated;
        Ok(())
    }
}

impl Drop for WriteSession {
    fn drop(&mut self) {
        self.locks.release(&self.file, self.sentence, &self.holder);
        log::debug!(
            "write session on '{}' sentence {} ({}) ended",
            self.file,
            self.sentence,
            self.holder
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::AcquireOutcome;

    fn locked_session(locks: &Arc<LockTable>, content: &str, sentence: usize) -> WriteSession {
        assert_eq!(
            locks.try_acquire("d.txt", sentence, "alice"),
            AcquireOutcome::Granted
        );
        WriteSession::new(
            "d.txt".to_string(),
            sentence,
            "alice".to_string(),
            content.to_string(),
            locks.clone(),
        )
    }

    #[test]
    fn edits_accumulate_in_the_buffer() {
        let locks = Arc::new(LockTable::new());
        let mut session = locked_session(&locks, "one. two. three.", 0);
        session.apply(0, "ONE").unwrap();
        assert_eq!(session.buffer(), "ONE. two. three.");
        session.apply(1, "more").unwrap();
        assert_eq!(session.buffer(), "ONE more. two. three.");
    }

    #[test]
    fn drop_releases_the_lock() {
        let locks = Arc::new(LockTable::new());
        let session = locked_session(&locks, "one.", 0);
        assert_eq!(locks.holder("d.txt", 0), Some("alice".to_string()));
        drop(session);
        assert_eq!(locks.holder("d.txt", 0), None);
    }

    #[test]
    fn out_of_range_word_is_rejected_without_buffer_change() {
        let locks = Arc::new(LockTable::new());
        let mut session = locked_session(&locks, "one two.", 0);
        assert!(session.apply(5, "x").is_err());
        assert_eq!(session.buffer(), "one two.");
    }

    #[test]
    fn append_sentence_bound() {
        let locks = Arc::new(LockTable::new());
        let session = locked_session(&locks, "one.", 1);
        assert!(session.sentence_in_range());
        drop(session);
        let session = locked_session(&locks, "one.", 2);
        assert!(!session.sentence_in_range());
    }
}

//! Per-client worker.
//!
//! The accept loop spawns one worker task per client connection. A worker
//! reads one framed request at a time and routes it: READ and STREAM
//! complete and close the connection; WRITE opens a session that stays on
//! this worker across word-update frames until ETIRW commits it. A
//! disconnect at any point drops the worker, and with it any active
//! session — releasing the sentence lock and leaving the disk untouched.

use std::sync::Arc;
use std::time::Duration;

use quill_msg::{Command, DATA_LEN, RequestFrame, ResponseFrame, Status};
use quill_transport::FrameStream;

use crate::StorageError;
use crate::locks::{AcquireOutcome, LockTable};
use crate::session::WriteSession;
use crate::store::FileStore;

/// Pause between streamed words.
const STREAM_PACING: Duration = Duration::from_millis(100);
/// Sentinel data value terminating a STREAM.
pub const STREAM_END: &str = "STREAM_END";

enum Flow {
    Continue,
    Close,
}

pub struct Worker {
    stream: FrameStream,
    store: Arc<FileStore>,
    locks: Arc<LockTable>,
    session: Option<WriteSession>,
}

impl Worker {
    pub fn new(stream: FrameStream, store: Arc<FileStore>, locks: Arc<LockTable>) -> Self {
        Worker {
            stream,
            store,
            locks,
            session: None,
        }
    }

    /// Serves this client until it disconnects or the dialogue
    /// completes. Dropping `self` on the way out rolls back any open
    /// write session.
    pub async fn run(mut self) {
        loop {
            let request = match self.stream.recv_request().await {
                Ok(request) => request,
                Err(e) if e.is_disconnect() => {
                    log::debug!("client disconnected: {e}");
                    break;
                }
                Err(e) => {
                    log::warn!("dropping client connection: {e}");
                    break;
                }
            };
            match self.dispatch(request).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close) => break,
                Err(e) => {
                    log::warn!("client connection failed: {e}");
                    break;
                }
            }
        }
    }

    async fn dispatch(&mut self, request: RequestFrame) -> quill_transport::Result<Flow> {
        let user = request.username.as_str().to_string();
        let args = request.args.as_str().to_string();
        match request.command {
            Command::Read => self.handle_read(&user, args.trim()).await,
            Command::Stream => self.handle_stream(&user, args.trim()).await,
            Command::Write if self.session.is_some() => {
                // inside a session, WRITE frames are `<word_idx> <new_word>`
                // updates; a frame shaped like another session open
                // (`<filename> <sentence_idx>`) is refused outright
                if is_word_update(&args) {
                    self.handle_word_update(&args).await
                } else {
                    let e = StorageError::Internal(
                        "a write session is already active on this connection".to_string(),
                    );
                    self.stream.send_response(&e.to_response()).await?;
                    Ok(Flow::Continue)
                }
            }
            Command::Write => self.handle_write_begin(&user, args.trim()).await,
            Command::Etirw => self.handle_commit().await,
            other => {
                log::warn!("client sent unsupported command {other}");
                self.stream
                    .send_response(&ResponseFrame::error(
                        Status::InvalidOperation,
                        &format!("command {other} is not served on the client port"),
                    ))
                    .await?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Bulk read: permission check, OK response carrying the byte size,
    /// then the payload as raw chunks, then close.
    async fn handle_read(&mut self, user: &str, name: &str) -> quill_transport::Result<Flow> {
        let content = match self.load_readable(user, name).await {
            Ok(content) => content,
            Err(e) => {
                self.stream.send_response(&e.to_response()).await?;
                return Ok(Flow::Close);
            }
        };
        self.stream
            .send_response(&ResponseFrame::ok(&content.len().to_string())?)
            .await?;
        self.stream.send_raw(content.as_bytes()).await?;
        self.stream.shutdown().await?;
        log::info!("sent {} bytes of '{name}' to {user}", content.len());
        Ok(Flow::Close)
    }

    /// Paced word-by-word delivery, one framed token every
    /// [`STREAM_PACING`], terminated by the [`STREAM_END`] sentinel.
    async fn handle_stream(&mut self, user: &str, name: &str) -> quill_transport::Result<Flow> {
        let content = match self.load_readable(user, name).await {
            Ok(content) => content,
            Err(e) => {
                self.stream.send_response(&e.to_response()).await?;
                return Ok(Flow::Close);
            }
        };
        for word in content.split_whitespace() {
            self.stream
                .send_response(&ResponseFrame::ok(word).unwrap_or_else(|_| {
                    ResponseFrame::error(Status::Internal, "unencodable word")
                }))
                .await?;
            tokio::time::sleep(STREAM_PACING).await;
        }
        self.stream
            .send_response(&ResponseFrame::ok(STREAM_END)?)
            .await?;
        log::info!("streamed '{name}' to {user}");
        Ok(Flow::Close)
    }

    async fn load_readable(&self, user: &str, name: &str) -> crate::Result<String> {
        let meta = self.store.read_meta(name).await?;
        if !meta.can_read(user) {
            return Err(StorageError::ReadPermission {
                user: user.to_string(),
                file: name.to_string(),
            });
        }
        let content = self.store.read_payload(name).await?;
        if let Err(e) = self.store.touch_access(name, user).await {
            log::warn!("failed to stamp access on '{name}': {e}");
        }
        Ok(content)
    }

    /// Opens a write session: permission check, lock acquisition, slurp,
    /// bounds check. Replies OK with the locked sentence on success.
    async fn handle_write_begin(&mut self, user: &str, args: &str) -> quill_transport::Result<Flow> {
        match self.begin_session(user, args).await {
            Ok(sentence) => {
                self.stream
                    .send_response(&ResponseFrame::ok(&format!(
                        "Lock acquired for sentence {sentence}"
                    ))?)
                    .await?;
            }
            Err(e) => self.stream.send_response(&e.to_response()).await?,
        }
        Ok(Flow::Continue)
    }

    async fn begin_session(&mut self, user: &str, args: &str) -> crate::Result<usize> {
        let (name, sentence) = args
            .split_once(' ')
            .ok_or_else(|| StorageError::InvalidArgs("expected '<filename> <sentence>'".into()))?;
        let sentence: usize = sentence
            .trim()
            .parse()
            .map_err(|_| StorageError::InvalidArgs(format!("bad sentence index {sentence:?}")))?;

        let meta = self.store.read_meta(name).await?;
        if !meta.can_write(user) {
            return Err(StorageError::WritePermission {
                user: user.to_string(),
                file: name.to_string(),
            });
        }

        match self.locks.try_acquire(name, sentence, user) {
            AcquireOutcome::Granted | AcquireOutcome::AlreadyHeld => {}
            AcquireOutcome::Denied { holder } => {
                return Err(StorageError::Locked {
                    file: name.to_string(),
                    sentence,
                    holder,
                });
            }
        }

        // from here on, the lock must not leak: build the session (whose
        // destructor releases it) before any further failure can return
        let buffer = match self.store.read_payload(name).await {
            Ok(buffer) => buffer,
            Err(e) => {
                self.locks.release(name, sentence, user);
                return Err(e);
            }
        };
        let session = WriteSession::new(
            name.to_string(),
            sentence,
            user.to_string(),
            buffer,
            self.locks.clone(),
        );
        if !session.sentence_in_range() {
            // dropping the session releases the lock
            return Err(StorageError::Edit(quill_core::EditError::SentenceOutOfRange {
                index: sentence,
                count: quill_core::text::sentence_count(session.buffer()),
            }));
        }
        log::info!("{user} locked sentence {sentence} of '{name}'");
        self.session = Some(session);
        Ok(sentence)
    }

    /// One `<word_idx> <new_word>` frame inside an open session.
    async fn handle_word_update(&mut self, args: &str) -> quill_transport::Result<Flow> {
        let result = self.apply_word_update(args);
        match result {
            Ok((word, sentence)) => {
                self.stream
                    .send_response(&ResponseFrame::ok(&format!(
                        "Updated word {word} of sentence {sentence}"
                    ))?)
                    .await?;
            }
            Err(e) => self.stream.send_response(&e.to_response()).await?,
        }
        Ok(Flow::Continue)
    }

    fn apply_word_update(&mut self, args: &str) -> crate::Result<(usize, usize)> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| StorageError::InvalidOperation("no active write session".into()))?;
        let args = args.trim();
        let (word, value) = args
            .split_once(' ')
            .ok_or_else(|| StorageError::InvalidArgs("expected '<word_idx> <new_word>'".into()))?;
        let word: usize = word
            .parse()
            .map_err(|_| StorageError::InvalidArgs(format!("bad word index {word:?}")))?;
        let value = value.trim();
        if value.is_empty() || value.contains(char::is_whitespace) {
            return Err(StorageError::InvalidArgs(
                "replacement must be a single word".into(),
            ));
        }
        session.apply(word, value)?;
        Ok((word, session.sentence()))
    }

    /// ETIRW: commit the buffer (backup rename, write, restore on error),
    /// release the lock via the session destructor, close the connection.
    async fn handle_commit(&mut self) -> quill_transport::Result<Flow> {
        let Some(session) = self.session.take() else {
            self.stream
                .send_response(&ResponseFrame::error(
                    Status::InvalidOperation,
                    "no active write session to commit",
                ))
                .await?;
            return Ok(Flow::Continue);
        };
        match self
            .store
            .commit(session.file(), session.buffer(), session.holder())
            .await
        {
            Ok(()) => {
                let name = session.file().to_string();
                drop(session);
                self.stream
                    .send_response(&ResponseFrame::ok(&format!("Committed '{name}'"))?)
                    .await?;
                Ok(Flow::Close)
            }
            Err(e) => {
                self.stream.send_response(&e.to_response()).await?;
                // the session survives a failed commit; the client may
                // retry ETIRW or disconnect to roll back
                self.session = Some(session);
                Ok(Flow::Continue)
            }
        }
    }
}

/// Caps content returned through a response frame's data field.
pub(crate) fn fits_in_data(content: &str) -> bool {
    content.len() < DATA_LEN
}

/// A word-update frame leads with a numeric word index; a session-open
/// frame leads with a filename.
fn is_word_update(args: &str) -> bool {
    args.split_whitespace()
        .next()
        .is_some_and(|token| token.parse::<usize>().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_updates_are_told_apart_from_session_opens() {
        assert!(is_word_update("0 hello"));
        assert!(is_word_update("  3 word."));
        assert!(!is_word_update("notes.txt 2"));
        assert!(!is_word_update(""));
    }
}

//! Direct storage-node connections for bulk I/O.

use std::net::SocketAddr;

use quill_msg::{Command, RequestFrame};
use quill_transport::FrameStream;

use crate::client::{ClientConfig, into_data};
use crate::Result;

/// Sentinel data value terminating a word stream.
pub const STREAM_END: &str = "STREAM_END";

/// Fetches a whole file from a storage node.
pub(crate) async fn read_file(
    addr: SocketAddr,
    config: &ClientConfig,
    name: &str,
) -> Result<Vec<u8>> {
    let mut stream = FrameStream::connect(addr, config.timeout).await?;
    stream
        .send_request(&RequestFrame::new(Command::Read, &config.username, name)?)
        .await?;
    let header = stream.recv_response().await?;
    let size = into_data(header)?;
    let payload = stream.recv_raw_to_end().await?;
    if let Ok(expected) = size.parse::<usize>() {
        if payload.len() != expected {
            log::warn!(
                "'{name}' transfer was {} bytes, node announced {expected}",
                payload.len()
            );
        }
    }
    Ok(payload)
}

/// Consumes a paced word stream, one framed token at a time, until the
/// sentinel.
pub(crate) async fn stream_words(
    addr: SocketAddr,
    config: &ClientConfig,
    name: &str,
    mut on_word: impl FnMut(&str),
) -> Result<usize> {
    let mut stream = FrameStream::connect(addr, config.timeout).await?;
    stream
        .send_request(&RequestFrame::new(Command::Stream, &config.username, name)?)
        .await?;
    let mut count = 0;
    loop {
        let word = into_data(stream.recv_response().await?)?;
        if word == STREAM_END {
            return Ok(count);
        }
        on_word(&word);
        count += 1;
    }
}

/// Opens a write session against a storage node; `args` is the
/// already-formatted `<filename> <sentence>` pair.
pub(crate) async fn open_write(
    addr: SocketAddr,
    config: &ClientConfig,
    args: &str,
) -> Result<WriteHandle> {
    let mut stream = FrameStream::connect(addr, config.timeout).await?;
    stream
        .send_request(&RequestFrame::new(Command::Write, &config.username, args)?)
        .await?;
    let granted = into_data(stream.recv_response().await?)?;
    log::debug!("write session open: {granted}");
    Ok(WriteHandle {
        stream,
        username: config.username.clone(),
        granted,
    })
}

/// An open write session on one sentence of one file.
///
/// The handle owns the direct connection that carries the session. Every
/// [`WriteHandle::replace_word`] updates the node's in-memory buffer;
/// nothing touches the disk until [`WriteHandle::commit`]. Dropping the
/// handle without committing closes the connection and the node rolls
/// the session back, releasing the sentence lock.
#[derive(Debug)]
pub struct WriteHandle {
    stream: FrameStream,
    username: String,
    granted: String,
}

impl WriteHandle {
    /// The node's lock acknowledgement message.
    pub fn granted(&self) -> &str {
        &self.granted
    }

    /// Replaces (or, at the word count, appends) one word of the locked
    /// sentence. `word` is a 0-based wire index.
    pub async fn replace_word(&mut self, word: usize, value: &str) -> Result<String> {
        self.stream
            .send_request(&RequestFrame::new(
                Command::Write,
                &self.username,
                &format!("{word} {value}"),
            )?)
            .await?;
        into_data(self.stream.recv_response().await?)
    }

    /// ETIRW: commits the buffered edits and ends the session. The node
    /// keeps the pre-session contents as the `.bak` undo point.
    pub async fn commit(mut self) -> Result<String> {
        self.stream
            .send_request(&RequestFrame::new(Command::Etirw, &self.username, "")?)
            .await?;
        into_data(self.stream.recv_response().await?)
    }
}

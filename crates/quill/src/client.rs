//! The coordinator session.

use std::net::SocketAddr;
use std::time::Duration;

use quill_msg::{Command, RequestFrame, ResponseFrame};
use quill_transport::FrameStream;

use crate::remote::{self, WriteHandle};
use crate::{Error, Result};

/// Configuration for a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub coordinator: SocketAddr,
    pub username: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(coordinator: SocketAddr, username: &str) -> Self {
        ClientConfig {
            coordinator,
            username: username.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// A registered client session.
pub struct Client {
    link: FrameStream,
    config: ClientConfig,
    welcome: String,
}

impl Client {
    /// Connects to the coordinator and registers the username with
    /// CLIENT_INIT.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let mut link = FrameStream::connect(config.coordinator, config.timeout).await?;
        link.send_request(&RequestFrame::new(
            Command::ClientInit,
            &config.username,
            "",
        )?)
        .await?;
        let response = link.recv_response().await?;
        let welcome = into_data(response)?;
        log::debug!("connected to {}: {welcome}", config.coordinator);
        Ok(Client {
            link,
            config,
            welcome,
        })
    }

    pub fn username(&self) -> &str {
        &self.config.username
    }

    /// The coordinator's CLIENT_INIT greeting.
    pub fn welcome(&self) -> &str {
        &self.welcome
    }

    /// One control request/reply exchange with the coordinator.
    async fn call(&mut self, command: Command, args: &str) -> Result<String> {
        self.link
            .send_request(&RequestFrame::new(command, &self.config.username, args)?)
            .await?;
        let response = self.link.recv_response().await?;
        into_data(response)
    }

    pub async fn create(&mut self, name: &str) -> Result<String> {
        self.call(Command::Create, name).await
    }

    pub async fn delete(&mut self, name: &str) -> Result<String> {
        self.call(Command::Delete, name).await
    }

    /// The user listing (LIST).
    pub async fn list(&mut self) -> Result<String> {
        self.call(Command::List, "").await
    }

    /// The file listing (VIEW), optionally unfiltered (`-a`) and/or
    /// tabular (`-l`).
    pub async fn view(&mut self, all: bool, long: bool) -> Result<String> {
        let mut flags = Vec::new();
        if all {
            flags.push("-a");
        }
        if long {
            flags.push("-l");
        }
        self.call(Command::View, &flags.join(" ")).await
    }

    /// Cached metadata in its key=value text form (INFO).
    pub async fn info(&mut self, name: &str) -> Result<String> {
        self.call(Command::Info, name).await
    }

    /// Grants `target` read (or, with `write`, read+write) on `name`.
    pub async fn add_access(&mut self, name: &str, target: &str, write: bool) -> Result<String> {
        let flag = if write { "-W" } else { "-R" };
        self.call(Command::AddAccess, &format!("{flag} {name} {target}"))
            .await
    }

    /// Removes `target` from the ACL of `name`.
    pub async fn rem_access(&mut self, name: &str, target: &str) -> Result<String> {
        self.call(Command::RemAccess, &format!("{name} {target}"))
            .await
    }

    pub async fn undo(&mut self, name: &str) -> Result<String> {
        self.call(Command::Undo, name).await
    }

    /// Runs the file on the coordinator host and returns the captured
    /// output.
    pub async fn exec(&mut self, name: &str) -> Result<String> {
        self.call(Command::Exec, name).await
    }

    /// Reads the whole file: redirect to the owning storage node, OK
    /// response carrying the size, then the raw payload until EOF.
    pub async fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let addr = self.redirect(Command::Read, name).await?;
        remote::read_file(addr, &self.config, name).await
    }

    /// Streams the file word by word, invoking `on_word` per token until
    /// the stream sentinel arrives. Returns the word count.
    pub async fn stream(&mut self, name: &str, on_word: impl FnMut(&str)) -> Result<usize> {
        let addr = self.redirect(Command::Stream, name).await?;
        remote::stream_words(addr, &self.config, name, on_word).await
    }

    /// Opens a write session on `sentence` (0-based) of `name`. The
    /// returned handle owns the direct storage connection; dropping it
    /// without committing rolls the session back on the node.
    pub async fn write(&mut self, name: &str, sentence: usize) -> Result<WriteHandle> {
        let args = format!("{name} {sentence}");
        let addr = self.redirect(Command::Write, &args).await?;
        remote::open_write(addr, &self.config, &args).await
    }

    async fn redirect(&mut self, command: Command, args: &str) -> Result<SocketAddr> {
        let addr = self.call(command, args).await?;
        addr.parse().map_err(|_| Error::BadRedirect(addr))
    }
}

/// Unwraps a response into its data, or a server error.
pub(crate) fn into_data(response: ResponseFrame) -> Result<String> {
    if response.status.is_ok() {
        Ok(response.data.into_string())
    } else {
        Err(Error::Server {
            status: response.status,
            message: response.data.into_string(),
        })
    }
}

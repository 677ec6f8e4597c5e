//! Storage node lifecycle: coordinator registration, the coordinator
//! control link, and the client accept loop.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use quill_msg::{Command, RequestFrame, ResponseFrame, Status};
use quill_transport::FrameStream;
use tokio::net::TcpListener;

use crate::locks::LockTable;
use crate::store::FileStore;
use crate::worker::{Worker, fits_in_data};
use crate::{Result, StorageError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Username field value on the coordinator link.
const LINK_USER: &str = "storage-node";

#[derive(Debug, Clone)]
pub struct StorageNodeConfig {
    pub coordinator: SocketAddr,
    pub storage_dir: PathBuf,
    /// Client-facing port; 0 picks an ephemeral port.
    pub client_port: u16,
}

/// A bound, not-yet-registered storage node.
pub struct StorageNode {
    listener: TcpListener,
    store: Arc<FileStore>,
    locks: Arc<LockTable>,
    coordinator: SocketAddr,
    link: Option<FrameStream>,
}

impl StorageNode {
    /// Creates the storage directory if needed and binds the client
    /// listener.
    pub async fn bind(config: &StorageNodeConfig) -> Result<Self> {
        let store = Arc::new(FileStore::open(&config.storage_dir).await?);
        let listener = TcpListener::bind(("0.0.0.0", config.client_port)).await?;
        Ok(StorageNode {
            listener,
            store,
            locks: Arc::new(LockTable::new()),
            coordinator: config.coordinator,
            link: None,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Connects to the coordinator and announces this node: client port
    /// plus the startup inventory scan, so a restarted coordinator can
    /// rebuild its index.
    pub async fn register(&mut self) -> Result<()> {
        let mut link = FrameStream::connect(self.coordinator, CONNECT_TIMEOUT).await?;
        let inventory = self.store.scan_inventory().await?;
        let port = self.local_addr()?.port();
        let args = format!("{} {}", port, inventory.join(","));
        link.send_request(&RequestFrame::new(Command::SsInit, LINK_USER, &args).map_err(
            |e| StorageError::Internal(format!("cannot encode registration: {e}")),
        )?)
        .await?;
        let response = link.recv_response().await?;
        if !response.status.is_ok() {
            return Err(StorageError::Internal(format!(
                "coordinator refused registration: {}",
                response.data
            )));
        }
        log::info!(
            "registered with coordinator {} ({} files announced)",
            self.coordinator,
            inventory.len()
        );
        self.link = Some(link);
        Ok(())
    }

    /// Serves the coordinator link and the client port until either
    /// fails. Must be called after [`StorageNode::register`].
    pub async fn serve(mut self) -> Result<()> {
        let link = self
            .link
            .take()
            .ok_or_else(|| StorageError::InvalidOperation("serve() before register()".into()))?;
        let link_store = self.store.clone();
        let link_task = serve_link(link, link_store);
        tokio::pin!(link_task);

        loop {
            tokio::select! {
                result = &mut link_task => {
                    log::error!("coordinator link lost");
                    return result;
                }
                accepted = self.listener.accept() => {
                    let (socket, peer) = accepted?;
                    log::debug!("client connected from {peer}");
                    let worker = Worker::new(
                        FrameStream::new(socket),
                        self.store.clone(),
                        self.locks.clone(),
                    );
                    tokio::spawn(worker.run());
                }
            }
        }
    }
}

/// Serves coordinator-originated requests over the registration link:
/// CREATE, DELETE, UPDATE_ACL, UNDO, plus the metadata (INFO) and content
/// (READ) fetches the coordinator issues on a client's behalf.
async fn serve_link(mut link: FrameStream, store: Arc<FileStore>) -> Result<()> {
    loop {
        let request = link.recv_request().await?;
        let response = dispatch_control(&store, &request).await;
        link.send_response(&response).await?;
    }
}

async fn dispatch_control(store: &FileStore, request: &RequestFrame) -> ResponseFrame {
    let user = request.username.as_str();
    let args = request.args.as_str().trim();
    let result = match request.command {
        Command::Create => store
            .create(args, user)
            .await
            .map(|()| format!("File '{args}' created")),
        Command::Delete => store
            .delete(args, user)
            .await
            .map(|()| format!("File '{args}' deleted")),
        Command::UpdateAcl => match args.split_once(' ') {
            Some((name, acl)) => store
                .update_acl(name, acl.trim())
                .await
                .map(|()| format!("ACL of '{name}' updated")),
            None => Err(StorageError::InvalidArgs(
                "expected '<filename> <acl>'".into(),
            )),
        },
        Command::Undo => store
            .undo(args)
            .await
            .map(|()| format!("File '{args}' restored from its undo point")),
        Command::Info => store.read_meta(args).await.and_then(|meta| {
            let text = meta.to_text();
            if fits_in_data(&text) {
                Ok(text)
            } else {
                Err(StorageError::Internal(format!(
                    "metadata of '{args}' does not fit a response frame"
                )))
            }
        }),
        Command::Read => store.read_payload(args).await.and_then(|content| {
            if fits_in_data(&content) {
                Ok(content)
            } else {
                Err(StorageError::Internal(format!(
                    "'{args}' is too large to fetch through a response frame"
                )))
            }
        }),
        other => Err(StorageError::InvalidOperation(format!(
            "command {other} is not served on the coordinator link"
        ))),
    };
    match result {
        Ok(data) => ResponseFrame::ok(&data)
            .unwrap_or_else(|_| ResponseFrame::error(Status::Internal, "unencodable response")),
        Err(e) => {
            log::warn!("coordinator request {} failed: {e}", request.command);
            e.to_response()
        }
    }
}

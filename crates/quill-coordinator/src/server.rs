//! Connection intake and the single state-owning event loop.
//!
//! Every accepted connection declares itself with its first frame:
//! SS_INIT hands the stream over to the state loop as a storage-node
//! link; CLIENT_INIT starts a reader task that feeds the loop one
//! request at a time and relays the replies. The loop processes one
//! event to completion before the next, so all index access is
//! serialized; a forwarded request blocks the loop until the storage
//! node replies.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use quill_msg::{Command, RequestFrame, ResponseFrame, Status};
use quill_transport::FrameStream;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

use crate::ops::Coordinator;
use crate::registry::ClientRegistry;
use crate::Result;

enum Event {
    Connect {
        user: String,
        ip: IpAddr,
        reply: oneshot::Sender<ResponseFrame>,
    },
    Request {
        user: String,
        frame: RequestFrame,
        reply: oneshot::Sender<ResponseFrame>,
    },
    Disconnect {
        user: String,
    },
    RegisterNode {
        ip: IpAddr,
        client_port: u16,
        link: FrameStream,
        files: Vec<String>,
    },
}

/// A bound coordinator.
pub struct Server {
    listener: TcpListener,
    state: Coordinator,
}

impl Server {
    /// Loads the client registry and binds the listening port.
    pub async fn bind(port: u16, registry_path: PathBuf) -> Result<Self> {
        let registry = ClientRegistry::load(registry_path)?;
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        Ok(Server {
            listener,
            state: Coordinator::new(registry),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs the accept loop and the state loop until failure.
    pub async fn run(self) -> Result<()> {
        let Server {
            listener,
            mut state,
        } = self;
        let (tx, mut rx) = mpsc::channel::<Event>(64);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                state_step(&mut state, event).await;
            }
            log::info!("state loop stopped");
        });

        loop {
            let (socket, peer) = listener.accept().await?;
            log::debug!("connection from {peer}");
            let tx = tx.clone();
            tokio::spawn(handle_connection(FrameStream::new(socket), peer, tx));
        }
    }
}

async fn state_step(state: &mut Coordinator, event: Event) {
    match event {
        Event::Connect { user, ip, reply } => {
            let response = match state.registry.register(&user, ip) {
                Ok(known) => {
                    log::info!("client '{user}' connected from {ip}");
                    let text = if known {
                        format!("Welcome back, {user}")
                    } else {
                        format!("Welcome, {user}")
                    };
                    ResponseFrame::ok(&text)
                        .unwrap_or_else(|_| ResponseFrame::error(Status::Internal, "bad username"))
                }
                Err(e) => {
                    log::error!("cannot persist registry: {e}");
                    ResponseFrame::error(Status::Internal, "registry write failed")
                }
            };
            let _ = reply.send(response);
        }
        Event::Request { user, frame, reply } => {
            let response = state.handle(&user, &frame).await;
            let _ = reply.send(response);
        }
        Event::Disconnect { user } => {
            log::info!("client '{user}' disconnected");
            state.registry.mark_offline(&user);
        }
        Event::RegisterNode {
            ip,
            client_port,
            mut link,
            files,
        } => {
            let ack = ResponseFrame::ok(&format!("registered {} files", files.len()))
                .unwrap_or_else(|_| ResponseFrame::error(Status::Internal, "bad inventory"));
            // the node only joins the pool once it has its ack; a failed
            // ack means an unusable link
            match link.send_response(&ack).await {
                Ok(()) => {
                    let merged = state.register_node(ip, client_port, link, files);
                    log::info!("storage node {ip}:{client_port} merged {merged} files");
                }
                Err(e) => log::warn!("storage registration ack failed: {e}"),
            }
        }
    }
}

async fn handle_connection(mut stream: FrameStream, peer: SocketAddr, tx: mpsc::Sender<Event>) {
    let first = match stream.recv_request().await {
        Ok(frame) => frame,
        Err(e) => {
            log::debug!("connection from {peer} died before its first frame: {e}");
            return;
        }
    };
    match first.command {
        Command::SsInit => handle_storage_init(stream, peer, first, tx).await,
        Command::ClientInit => handle_client(stream, peer, first, tx).await,
        other => {
            log::warn!("connection from {peer} opened with {other}");
            let _ = stream
                .send_response(&ResponseFrame::error(
                    Status::InvalidOperation,
                    "a connection must start with CLIENT_INIT or SS_INIT",
                ))
                .await;
        }
    }
}

/// SS_INIT args are `<client_port> <comma-separated inventory>`, the
/// inventory possibly empty.
async fn handle_storage_init(
    mut stream: FrameStream,
    peer: SocketAddr,
    first: RequestFrame,
    tx: mpsc::Sender<Event>,
) {
    let args = first.args.as_str().trim().to_string();
    let (port_text, files_text) = args.split_once(' ').unwrap_or((args.as_str(), ""));
    let Ok(client_port) = port_text.parse::<u16>() else {
        let _ = stream
            .send_response(&ResponseFrame::error(
                Status::InvalidArgs,
                "bad storage registration args",
            ))
            .await;
        return;
    };
    let files = files_text
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let _ = tx
        .send(Event::RegisterNode {
            ip: peer.ip(),
            client_port,
            link: stream,
            files,
        })
        .await;
    // the state loop owns the link from here on
}

async fn handle_client(
    mut stream: FrameStream,
    peer: SocketAddr,
    first: RequestFrame,
    tx: mpsc::Sender<Event>,
) {
    let user = first.username.as_str().to_string();
    if user.is_empty() {
        let _ = stream
            .send_response(&ResponseFrame::error(Status::InvalidArgs, "empty username"))
            .await;
        return;
    }

    let (reply_tx, reply_rx) = oneshot::channel();
    if tx
        .send(Event::Connect {
            user: user.clone(),
            ip: peer.ip(),
            reply: reply_tx,
        })
        .await
        .is_err()
    {
        return;
    }
    let Ok(welcome) = reply_rx.await else { return };
    if stream.send_response(&welcome).await.is_err() {
        let _ = tx.send(Event::Disconnect { user }).await;
        return;
    }

    loop {
        let frame = match stream.recv_request().await {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("client '{user}' gone: {e}");
                break;
            }
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if tx
            .send(Event::Request {
                user: user.clone(),
                frame,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            break;
        }
        let Ok(response) = reply_rx.await else { break };
        if stream.send_response(&response).await.is_err() {
            break;
        }
    }
    let _ = tx.send(Event::Disconnect { user }).await;
}

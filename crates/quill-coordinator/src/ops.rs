//! The coordinator state machine: one handler per client operation.
//!
//! All handlers run on the single state-owning event loop, so index
//! mutations are serialized by construction. Handlers that forward to a
//! storage node block the loop until the node replies; the ACL mutation
//! path is the snapshot / mutate / push / rollback-on-failure discipline
//! and is the only way the cached ACL ever changes.

use std::net::IpAddr;

use quill_core::{FileMeta, Permission, epoch_now, validate_filename};
use quill_msg::{Command, DATA_LEN, RequestFrame, ResponseFrame, Status};
use quill_transport::FrameStream;

use crate::exec;
use crate::index::FileIndex;
use crate::node::{NodeId, NodePool};
use crate::registry::ClientRegistry;
use crate::{CoordError, Result};

/// Username the coordinator stamps on requests it originates itself.
const COORDINATOR_USER: &str = "coordinator";

/// The coordinator's entire mutable state.
pub struct Coordinator {
    pub registry: ClientRegistry,
    pub index: FileIndex,
    pub nodes: NodePool,
}

impl Coordinator {
    pub fn new(registry: ClientRegistry) -> Self {
        Coordinator {
            registry,
            index: FileIndex::new(),
            nodes: NodePool::new(),
        }
    }

    /// Registers a storage node and merges its announced inventory into
    /// the index. Owners are unknown until the first `.meta` fetch. A
    /// file already mapped to a live node keeps its mapping; a file
    /// mapped to a dead node is remapped (the node restarting is the
    /// common case).
    pub fn register_node(
        &mut self,
        ip: IpAddr,
        client_port: u16,
        link: FrameStream,
        inventory: Vec<String>,
    ) -> usize {
        let id = self.nodes.register(ip, client_port, link, inventory.clone());
        let mut merged = 0;
        for name in inventory {
            if let Some(entry) = self.index.peek_mut(&name) {
                let stale = self
                    .nodes
                    .get(entry.node)
                    .map(|n| !n.alive)
                    .unwrap_or(true);
                if stale && entry.node != id {
                    entry.node = id;
                    entry.meta = None;
                    merged += 1;
                } else if entry.node != id {
                    log::warn!("'{name}' is already owned by a live node; ignoring duplicate");
                }
                continue;
            }
            self.index.insert(name, id, None);
            merged += 1;
        }
        merged
    }

    /// Dispatches one client request to its handler and renders the
    /// outcome as a response frame.
    pub async fn handle(&mut self, user: &str, request: &RequestFrame) -> ResponseFrame {
        let args = request.args.as_str().trim().to_string();
        let result = match request.command {
            Command::Create => self.op_create(user, &args).await,
            Command::Delete => self.op_delete(user, &args).await,
            Command::List => self.op_list(),
            Command::View => self.op_view(user, &args).await,
            Command::Info => self.op_info(user, &args).await,
            Command::AddAccess => self.op_add_access(user, &args).await,
            Command::RemAccess => self.op_rem_access(user, &args).await,
            Command::Read | Command::Stream => self.op_redirect_read(user, &args).await,
            Command::Write => self.op_redirect_write(user, &args).await,
            Command::Undo => self.op_undo(user, &args).await,
            Command::Exec => self.op_exec(user, &args).await,
            Command::Heartbeat => Err(CoordError::InvalidOperation(
                "HEARTBEAT is reserved".to_string(),
            )),
            other => Err(CoordError::InvalidOperation(format!(
                "unexpected command {other}"
            ))),
        };
        match result {
            Ok(data) => ResponseFrame::ok(&data)
                .unwrap_or_else(|_| ResponseFrame::error(Status::Internal, "unencodable response")),
            Err(e) => {
                log::debug!("{} from {user} failed: {e}", request.command);
                e.to_response()
            }
        }
    }

    async fn op_create(&mut self, user: &str, name: &str) -> Result<String> {
        validate_filename(name)?;
        if self.index.contains(name) {
            return Err(CoordError::FileExists(name.to_string()));
        }
        let node_id = self
            .nodes
            .pick_round_robin()
            .ok_or(CoordError::ServerUnavailable)?;
        let request = new_request(Command::Create, user, name)?;
        let response = self.forward_to(node_id, &request).await?;
        expect_ok(&response)?;
        self.index.insert(
            name.to_string(),
            node_id,
            Some(FileMeta::new(user, epoch_now())),
        );
        log::info!("'{name}' created for {user} on {node_id:?}");
        Ok(response.data.into_string())
    }

    async fn op_delete(&mut self, user: &str, name: &str) -> Result<String> {
        let entry = self
            .index
            .find(name)
            .ok_or_else(|| CoordError::NotFound(name.to_string()))?;
        let node_id = entry.node;
        let request = new_request(Command::Delete, user, name)?;
        let response = self.forward_to(node_id, &request).await?;
        expect_ok(&response)?;
        // cache entry first, index entry second
        self.index.remove(name);
        log::info!("'{name}' deleted by {user}");
        Ok(response.data.into_string())
    }

    fn op_list(&mut self) -> Result<String> {
        Ok(self.registry.format_listing())
    }

    async fn op_view(&mut self, user: &str, args: &str) -> Result<String> {
        let mut all = false;
        let mut long = false;
        for flag in args.split_whitespace() {
            match flag {
                "-a" => all = true,
                "-l" => long = true,
                other => {
                    return Err(CoordError::InvalidArgs(format!("unknown flag {other:?}")));
                }
            }
        }

        let names = self.index.sorted_names();
        // fill metadata gaps so the ACL filter and the long listing have
        // something to work with; a node failure leaves the gap in place
        for name in &names {
            let missing = self
                .index
                .peek(name)
                .map(|e| e.meta.is_none())
                .unwrap_or(false);
            if missing {
                if let Err(e) = self.refresh_meta(name).await {
                    log::warn!("could not fetch metadata for '{name}': {e}");
                }
            }
        }

        let mut lines = Vec::new();
        if long {
            lines.push(format!(
                "{:<12} {:>8} {:>8} {:>12}  {}",
                "OWNER", "SIZE", "WORDS", "MODIFIED", "NAME"
            ));
        }
        for name in &names {
            let Some(entry) = self.index.peek(name) else {
                continue;
            };
            let visible = all
                || entry
                    .meta
                    .as_ref()
                    .map(|m| m.can_read(user))
                    .unwrap_or(false);
            if !visible {
                continue;
            }
            if long {
                let (owner, size, words, modified) = match &entry.meta {
                    Some(m) => (
                        m.owner.clone(),
                        m.size.to_string(),
                        m.word_count.to_string(),
                        m.modified.to_string(),
                    ),
                    None => ("?".to_string(), "?".to_string(), "?".to_string(), "?".to_string()),
                };
                lines.push(format!(
                    "{owner:<12} {size:>8} {words:>8} {modified:>12}  {name}"
                ));
            } else {
                lines.push(name.clone());
            }
        }
        if lines.is_empty() || (long && lines.len() == 1) {
            return Ok("no visible files".to_string());
        }
        Ok(lines.join("\n"))
    }

    async fn op_info(&mut self, user: &str, name: &str) -> Result<String> {
        let (_, meta) = self.ensure_meta(name).await?;
        if !meta.can_read(user) {
            return Err(CoordError::ReadPermission {
                user: user.to_string(),
                file: name.to_string(),
            });
        }
        Ok(meta.to_text())
    }

    async fn op_add_access(&mut self, user: &str, args: &str) -> Result<String> {
        let mut parts = args.split_whitespace();
        let perm = match parts.next() {
            Some("-R") => Permission::READ,
            Some("-W") => Permission::WRITE,
            _ => {
                return Err(CoordError::InvalidArgs(
                    "expected '-R|-W <filename> <user>'".to_string(),
                ));
            }
        };
        let (Some(name), Some(target), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CoordError::InvalidArgs(
                "expected '-R|-W <filename> <user>'".to_string(),
            ));
        };
        let target = target.to_string();
        self.push_acl(user, name, move |meta| {
            meta.acl.grant(&target, perm);
            Ok(())
        })
        .await
    }

    async fn op_rem_access(&mut self, user: &str, args: &str) -> Result<String> {
        let mut parts = args.split_whitespace();
        let (Some(name), Some(target), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CoordError::InvalidArgs(
                "expected '<filename> <user>'".to_string(),
            ));
        };
        let target = target.to_string();
        self.push_acl(user, name, move |meta| {
            if target == meta.owner {
                return Err(CoordError::InvalidOperation(
                    "the owner's access entry is immutable".to_string(),
                ));
            }
            if !meta.acl.revoke(&target) {
                return Err(CoordError::UnknownUser(target.clone()));
            }
            Ok(())
        })
        .await
    }

    async fn op_redirect_read(&mut self, user: &str, name: &str) -> Result<String> {
        let (node_id, meta) = self.ensure_meta(name).await?;
        if !meta.can_read(user) {
            return Err(CoordError::ReadPermission {
                user: user.to_string(),
                file: name.to_string(),
            });
        }
        self.redirect_addr(node_id, name)
    }

    async fn op_redirect_write(&mut self, user: &str, args: &str) -> Result<String> {
        let (name, sentence) = args
            .split_once(' ')
            .ok_or_else(|| CoordError::InvalidArgs("expected '<filename> <sentence>'".into()))?;
        sentence
            .trim()
            .parse::<usize>()
            .map_err(|_| CoordError::InvalidArgs(format!("bad sentence index {sentence:?}")))?;
        let (node_id, meta) = self.ensure_meta(name).await?;
        if !meta.can_write(user) {
            return Err(CoordError::WritePermission {
                user: user.to_string(),
                file: name.to_string(),
            });
        }
        self.redirect_addr(node_id, name)
    }

    async fn op_undo(&mut self, user: &str, name: &str) -> Result<String> {
        let (node_id, meta) = self.ensure_meta(name).await?;
        if !meta.can_write(user) {
            return Err(CoordError::WritePermission {
                user: user.to_string(),
                file: name.to_string(),
            });
        }
        let request = new_request(Command::Undo, user, name)?;
        let response = self.forward_to(node_id, &request).await?;
        // verbatim: the node's status and message travel through unchanged
        expect_ok(&response)?;
        Ok(response.data.into_string())
    }

    async fn op_exec(&mut self, user: &str, name: &str) -> Result<String> {
        let (node_id, meta) = self.ensure_meta(name).await?;
        if !meta.can_read(user) {
            return Err(CoordError::ReadPermission {
                user: user.to_string(),
                file: name.to_string(),
            });
        }
        let request = new_request(Command::Read, user, name)?;
        let response = self.forward_to(node_id, &request).await?;
        expect_ok(&response)?;
        let output = exec::run_shell(response.data.as_str(), DATA_LEN - 1)
            .await
            .map_err(|e| CoordError::Internal(format!("exec failed: {e}")))?;
        log::info!("executed '{name}' for {user}");
        Ok(output)
    }

    /// The two-phase ACL mutation: snapshot the cached metadata, apply
    /// `mutate` to a copy, install it, push the serialized ACL to the
    /// owning node, and restore the snapshot if the push fails in any
    /// way. The client never observes a partially committed ACL.
    async fn push_acl(
        &mut self,
        requester: &str,
        name: &str,
        mutate: impl FnOnce(&mut FileMeta) -> Result<()>,
    ) -> Result<String> {
        let (node_id, old_meta) = self.ensure_meta(name).await?;
        if old_meta.owner != requester {
            return Err(CoordError::OwnerRequired {
                file: name.to_string(),
            });
        }

        let mut new_meta = old_meta.clone();
        mutate(&mut new_meta)?;
        let serialized = new_meta.acl.serialize();

        if let Some(entry) = self.index.peek_mut(name) {
            entry.meta = Some(new_meta);
        }

        let request = new_request(Command::UpdateAcl, requester, &format!("{name} {serialized}"))?;
        let outcome = self.forward_to(node_id, &request).await;
        let failure = match outcome {
            Ok(response) if response.status.is_ok() => {
                log::info!("ACL of '{name}' is now [{serialized}]");
                return Ok(format!("Access list of '{name}' updated"));
            }
            Ok(response) => CoordError::Forwarded {
                status: response.status,
                message: response.data.into_string(),
            },
            Err(e) => e,
        };
        if let Some(entry) = self.index.peek_mut(name) {
            entry.meta = Some(old_meta);
        }
        log::warn!("ACL push for '{name}' failed, cache restored: {failure}");
        Err(failure)
    }

    /// Returns the cached metadata for `name`, fetching the `.meta` from
    /// the owning node when the cache has none yet.
    async fn ensure_meta(&mut self, name: &str) -> Result<(NodeId, FileMeta)> {
        let entry = self
            .index
            .find_mut(name)
            .ok_or_else(|| CoordError::NotFound(name.to_string()))?;
        let node_id = entry.node;
        if let Some(meta) = &entry.meta {
            return Ok((node_id, meta.clone()));
        }
        let meta = self.refresh_meta(name).await?;
        Ok((node_id, meta))
    }

    /// Unconditionally fetches `.meta` from the owning node and stores
    /// the snapshot.
    async fn refresh_meta(&mut self, name: &str) -> Result<FileMeta> {
        let node_id = self
            .index
            .peek(name)
            .map(|e| e.node)
            .ok_or_else(|| CoordError::NotFound(name.to_string()))?;
        let request = new_request(Command::Info, COORDINATOR_USER, name)?;
        let response = self.forward_to(node_id, &request).await?;
        expect_ok(&response)?;
        let meta = FileMeta::parse(response.data.as_str())?;
        if let Some(entry) = self.index.peek_mut(name) {
            entry.meta = Some(meta.clone());
        }
        Ok(meta)
    }

    async fn forward_to(
        &mut self,
        node_id: NodeId,
        request: &RequestFrame,
    ) -> Result<quill_msg::ResponseFrame> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| CoordError::Internal(format!("no record for {node_id:?}")))?;
        node.forward(request).await
    }

    fn redirect_addr(&self, node_id: NodeId, name: &str) -> Result<String> {
        let node = self
            .nodes
            .get(node_id)
            .ok_or_else(|| CoordError::Internal(format!("no record for {node_id:?}")))?;
        if !node.alive {
            return Err(CoordError::Network(format!(
                "the storage node holding '{name}' is offline"
            )));
        }
        Ok(node.client_addr())
    }
}

fn new_request(command: Command, user: &str, args: &str) -> Result<RequestFrame> {
    RequestFrame::new(command, user, args)
        .map_err(|e| CoordError::InvalidArgs(format!("cannot encode request: {e}")))
}

fn expect_ok(response: &quill_msg::ResponseFrame) -> Result<()> {
    if response.status.is_ok() {
        Ok(())
    } else {
        Err(CoordError::Forwarded {
            status: response.status,
            message: response.data.as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// A coordinator with one registered node whose link is driven by
    /// `script`: a list of (expected command, reply) pairs.
    async fn coordinator_with_scripted_node(
        script: Vec<(Command, ResponseFrame)>,
    ) -> (Coordinator, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry =
            ClientRegistry::load(dir.path().join("users.txt")).expect("registry");
        let mut state = Coordinator::new(registry);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let connect = tokio::net::TcpStream::connect(addr);
        let (accepted, connected) = tokio::join!(listener.accept(), connect);
        let (node_side, _) = accepted.expect("accept");
        let coordinator_side = connected.expect("connect");

        tokio::spawn(async move {
            let mut link = FrameStream::new(node_side);
            for (expected, reply) in script {
                let request = match link.recv_request().await {
                    Ok(request) => request,
                    Err(_) => return,
                };
                assert_eq!(request.command, expected);
                if link.send_response(&reply).await.is_err() {
                    return;
                }
            }
        });

        state.register_node(
            "127.0.0.1".parse().expect("ip"),
            9999,
            FrameStream::new(coordinator_side),
            Vec::new(),
        );
        (state, dir)
    }

    fn ok(data: &str) -> ResponseFrame {
        ResponseFrame::ok(data).expect("response")
    }

    fn request(command: Command, user: &str, args: &str) -> RequestFrame {
        RequestFrame::new(command, user, args).expect("request")
    }

    fn cached_acl(state: &Coordinator, name: &str) -> String {
        state
            .index
            .peek(name)
            .and_then(|e| e.meta.as_ref())
            .map(|m| m.acl.serialize())
            .expect("cached metadata")
    }

    #[test_log::test(tokio::test)]
    async fn successful_acl_push_updates_the_cache() {
        let (mut state, _dir) = coordinator_with_scripted_node(vec![
            (Command::Create, ok("File 'c.txt' created")),
            (Command::UpdateAcl, ok("ACL of 'c.txt' updated")),
        ])
        .await;

        let response = state
            .handle("alice", &request(Command::Create, "alice", "c.txt"))
            .await;
        assert!(response.status.is_ok());

        let response = state
            .handle("alice", &request(Command::AddAccess, "alice", "-R c.txt bob"))
            .await;
        assert!(response.status.is_ok());
        assert_eq!(cached_acl(&state, "c.txt"), "alice:RW,bob:R");
    }

    #[test_log::test(tokio::test)]
    async fn refused_acl_push_restores_the_snapshot() {
        let (mut state, _dir) = coordinator_with_scripted_node(vec![
            (Command::Create, ok("File 'c.txt' created")),
            (
                Command::UpdateAcl,
                ResponseFrame::error(Status::Internal, "disk full"),
            ),
        ])
        .await;

        state
            .handle("alice", &request(Command::Create, "alice", "c.txt"))
            .await;
        let response = state
            .handle("alice", &request(Command::AddAccess, "alice", "-R c.txt bob"))
            .await;
        assert_eq!(response.status, Status::Internal);
        assert_eq!(cached_acl(&state, "c.txt"), "alice:RW");
    }

    #[test_log::test(tokio::test)]
    async fn dead_link_rolls_back_and_reports_network() {
        // the script ends after CREATE, so the node hangs up before the
        // ACL push
        let (mut state, _dir) = coordinator_with_scripted_node(vec![(
            Command::Create,
            ok("File 'c.txt' created"),
        )])
        .await;

        state
            .handle("alice", &request(Command::Create, "alice", "c.txt"))
            .await;
        // give the script task time to finish and drop its socket
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let response = state
            .handle("alice", &request(Command::AddAccess, "alice", "-R c.txt bob"))
            .await;
        assert_eq!(response.status, Status::Network);
        assert_eq!(cached_acl(&state, "c.txt"), "alice:RW");
    }

    #[test_log::test(tokio::test)]
    async fn only_the_owner_may_mutate_the_acl() {
        let (mut state, _dir) = coordinator_with_scripted_node(vec![(
            Command::Create,
            ok("File 'c.txt' created"),
        )])
        .await;

        state
            .handle("alice", &request(Command::Create, "alice", "c.txt"))
            .await;
        let response = state
            .handle("bob", &request(Command::AddAccess, "bob", "-R c.txt bob"))
            .await;
        assert_eq!(response.status, Status::OwnerRequired);

        let response = state
            .handle("alice", &request(Command::RemAccess, "alice", "c.txt alice"))
            .await;
        assert_eq!(response.status, Status::InvalidOperation);
    }

    #[test_log::test(tokio::test)]
    async fn create_needs_a_node_and_rejects_duplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry =
            ClientRegistry::load(dir.path().join("users.txt")).expect("registry");
        let mut state = Coordinator::new(registry);

        let response = state
            .handle("alice", &request(Command::Create, "alice", "a.txt"))
            .await;
        assert_eq!(response.status, Status::ServerUnavailable);

        let (mut state, _dir) = coordinator_with_scripted_node(vec![(
            Command::Create,
            ok("File 'a.txt' created"),
        )])
        .await;
        state
            .handle("alice", &request(Command::Create, "alice", "a.txt"))
            .await;
        let response = state
            .handle("alice", &request(Command::Create, "alice", "a.txt"))
            .await;
        assert_eq!(response.status, Status::FileExists);
    }
}

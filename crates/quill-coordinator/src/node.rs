//! Storage-node records and round-robin placement.

use std::net::IpAddr;

use quill_msg::RequestFrame;
use quill_transport::FrameStream;

use crate::{CoordError, Result};

/// Stable identifier of a registered storage node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

/// One registered storage node, including its live coordinator link.
pub struct StorageNodeRecord {
    pub id: NodeId,
    pub ip: IpAddr,
    pub client_port: u16,
    pub link: FrameStream,
    /// File inventory announced at registration time.
    pub inventory: Vec<String>,
    pub alive: bool,
}

impl StorageNodeRecord {
    /// The `ip:port` string clients are redirected to for bulk I/O.
    pub fn client_addr(&self) -> String {
        format!("{}:{}", self.ip, self.client_port)
    }

    /// One request/reply exchange on the link. Any transport failure
    /// marks the node dead and surfaces as a NETWORK error; the caller
    /// decides what state to roll back.
    pub async fn forward(&mut self, request: &RequestFrame) -> Result<quill_msg::ResponseFrame> {
        let exchange = async {
            self.link.send_request(request).await?;
            self.link.recv_response().await
        };
        match exchange.await {
            Ok(response) => Ok(response),
            Err(e) => {
                log::error!("storage node {} unreachable: {e}", self.ip);
                self.alive = false;
                Err(CoordError::Network(e.to_string()))
            }
        }
    }
}

/// The set of registered storage nodes plus the placement cursor.
#[derive(Default)]
pub struct NodePool {
    nodes: Vec<StorageNodeRecord>,
    cursor: usize,
    next_id: u64,
}

impl NodePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn register(
        &mut self,
        ip: IpAddr,
        client_port: u16,
        link: FrameStream,
        inventory: Vec<String>,
    ) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.push(StorageNodeRecord {
            id,
            ip,
            client_port,
            link,
            inventory,
            alive: true,
        });
        log::info!("registered storage node {ip}:{client_port} as {id:?}");
        id
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut StorageNodeRecord> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn get(&self, id: NodeId) -> Option<&StorageNodeRecord> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Round-robin placement: advances the cursor modulo the node count
    /// and returns the next live node. No load awareness.
    pub fn pick_round_robin(&mut self) -> Option<NodeId> {
        if self.nodes.is_empty() {
            return None;
        }
        for _ in 0..self.nodes.len() {
            let candidate = &self.nodes[self.cursor % self.nodes.len()];
            self.cursor = (self.cursor + 1) % self.nodes.len();
            if candidate.alive {
                return Some(candidate.id);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_of(n: usize) -> NodePool {
        // records need a link; placement tests only exercise the cursor,
        // so build the pool through the internal fields
        let mut pool = NodePool::new();
        for i in 0..n {
            pool.nodes.push(StorageNodeRecord {
                id: NodeId(i as u64),
                ip: "127.0.0.1".parse().expect("loopback"),
                client_port: 9000 + i as u16,
                link: fake_link(),
                inventory: Vec::new(),
                alive: true,
            });
            pool.next_id += 1;
        }
        pool
    }

    fn fake_link() -> FrameStream {
        // a socket pair just to satisfy the record shape
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = std_listener.local_addr().expect("addr");
        let client = std::net::TcpStream::connect(addr).expect("connect");
        client.set_nonblocking(true).expect("nonblocking");
        let _server = std_listener.accept().expect("accept");
        let runtime_stream =
            tokio::net::TcpStream::from_std(client).expect("tokio stream from std");
        FrameStream::new(runtime_stream)
    }

    #[test_log::test(tokio::test)]
    async fn round_robin_cycles_and_skips_dead_nodes() {
        let mut pool = pool_of(3);
        assert_eq!(pool.pick_round_robin(), Some(NodeId(0)));
        assert_eq!(pool.pick_round_robin(), Some(NodeId(1)));
        assert_eq!(pool.pick_round_robin(), Some(NodeId(2)));
        assert_eq!(pool.pick_round_robin(), Some(NodeId(0)));

        pool.get_mut(NodeId(1)).expect("node").alive = false;
        assert_eq!(pool.pick_round_robin(), Some(NodeId(2)));
        assert_eq!(pool.pick_round_robin(), Some(NodeId(0)));
        assert_eq!(pool.pick_round_robin(), Some(NodeId(2)));
    }

    #[test_log::test(tokio::test)]
    async fn empty_or_dead_pool_yields_none() {
        let mut pool = NodePool::new();
        assert_eq!(pool.pick_round_robin(), None);
        let mut pool = pool_of(1);
        pool.get_mut(NodeId(0)).expect("node").alive = false;
        assert_eq!(pool.pick_round_robin(), None);
    }
}

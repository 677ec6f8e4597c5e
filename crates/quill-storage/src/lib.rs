//! The quill storage node.
//!
//! A storage node owns the bytes, metadata and sentence-level write locks
//! for its slice of the file namespace. It keeps one long-lived connection
//! to the coordinator (serving CREATE / DELETE / UPDATE_ACL / UNDO /
//! metadata and content fetches) and accepts direct client connections on
//! its own port for bulk I/O, spawning one worker task per client.

#![forbid(unsafe_code)]

pub mod error;
pub mod locks;
pub mod node;
pub mod session;
pub mod store;
pub mod worker;

pub use error::StorageError;
pub use node::{StorageNode, StorageNodeConfig};

/// Storage-node result type.
pub type Result<T> = std::result::Result<T, StorageError>;

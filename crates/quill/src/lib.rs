//! Client-side protocol driver for quill.
//!
//! A [`Client`] keeps one control connection to the coordinator and
//! follows its `ip:port` redirects with direct storage-node connections
//! for bulk I/O: buffered reads, paced word streams, and stateful write
//! sessions committed with ETIRW.
//!
//! All indices on this API are 0-based wire indices; converting from the
//! 1-based user surface is the caller's job.

#![forbid(unsafe_code)]

pub mod client;
pub mod error;
pub mod remote;

pub use client::{Client, ClientConfig};
pub use error::Error;
pub use remote::WriteHandle;

pub use quill_core::{Acl, FileMeta, Permission};
pub use quill_msg::{Command, RequestFrame, ResponseFrame, Status};
pub use quill_transport as transport;

/// Client result type.
pub type Result<T> = std::result::Result<T, Error>;

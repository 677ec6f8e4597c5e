//! Framed TCP transport.
//!
//! All quill traffic is fixed-size binary frames over TCP (see
//! `quill-msg`), except the bulk READ payload which follows its OK
//! response as raw bytes. This crate owns the send/recv loops, checksum
//! validation on receive, and disconnect classification.

#![forbid(unsafe_code)]

pub mod error;
pub mod tcp;

pub use error::TransportError;
pub use tcp::{FrameStream, RAW_CHUNK_SIZE};

/// Transport result type.
pub type Result<T> = std::result::Result<T, TransportError>;

//! Wire protocol for quill: command and status enums plus the two
//! fixed-size binary frame shapes that all coordinator, storage-node and
//! client traffic uses.

#![forbid(unsafe_code)]

pub mod command;
pub mod frame;
pub mod status;

pub use command::Command;
pub use frame::{
    ARGS_LEN, DATA_LEN, FixedString, FrameError, MAGIC, REQUEST_FRAME_LEN, RESPONSE_FRAME_LEN,
    RequestFrame, ResponseFrame, USERNAME_LEN, checksum,
};
pub use status::Status;

/// Protocol result type.
pub type Result<T> = std::result::Result<T, FrameError>;

//! Client error type.

use quill_msg::{FrameError, Status};
use quill_transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A non-OK status from the coordinator or a storage node. `message`
    /// is the response's data field, shown to the user as
    /// `Error: <message>`.
    #[error("{message}")]
    Server { status: Status, message: String },

    #[error("coordinator sent an unusable redirect: {0:?}")]
    BadRedirect(String),
}

impl Error {
    /// The wire status, when this error carries one.
    pub fn status(&self) -> Option<Status> {
        match self {
            Error::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

//! Coordinator error type and its mapping to wire statuses.

use quill_core::{FilenameError, MetaParseError};
use quill_msg::{ResponseFrame, Status};

#[derive(Debug, thiserror::Error)]
pub enum CoordError {
    #[error("File '{0}' not found")]
    NotFound(String),

    #[error("File '{0}' already exists")]
    FileExists(String),

    #[error("User '{0}' is not known")]
    UnknownUser(String),

    #[error("user '{user}' has no read permission on '{file}'")]
    ReadPermission { user: String, file: String },

    #[error("user '{user}' has no write permission on '{file}'")]
    WritePermission { user: String, file: String },

    #[error("only the owner of '{file}' may do this")]
    OwnerRequired { file: String },

    #[error(transparent)]
    Filename(#[from] FilenameError),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("no storage node available")]
    ServerUnavailable,

    #[error("storage node unreachable: {0}")]
    Network(String),

    /// A storage-node failure, forwarded to the client verbatim.
    #[error("{message}")]
    Forwarded { status: Status, message: String },

    #[error("corrupt metadata from storage node: {0}")]
    Meta(#[from] MetaParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl CoordError {
    pub fn status(&self) -> Status {
        match self {
            CoordError::NotFound(_) | CoordError::UnknownUser(_) => Status::NotFound,
            CoordError::FileExists(_) => Status::FileExists,
            CoordError::ReadPermission { .. } => Status::ReadPermission,
            CoordError::WritePermission { .. } => Status::WritePermission,
            CoordError::OwnerRequired { .. } => Status::OwnerRequired,
            CoordError::Filename(_) => Status::InvalidFilename,
            CoordError::InvalidArgs(_) => Status::InvalidArgs,
            CoordError::InvalidOperation(_) => Status::InvalidOperation,
            CoordError::ServerUnavailable => Status::ServerUnavailable,
            CoordError::Network(_) => Status::Network,
            CoordError::Forwarded { status, .. } => *status,
            CoordError::Meta(_) | CoordError::Io(_) | CoordError::Internal(_) => Status::Internal,
        }
    }

    pub fn to_response(&self) -> ResponseFrame {
        ResponseFrame::error(self.status(), &self.to_string())
    }
}

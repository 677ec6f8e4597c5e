//! Storage-node error type and its mapping to wire statuses.

use quill_core::{AclParseError, EditError, FilenameError, MetaParseError};
use quill_msg::{ResponseFrame, Status};
use quill_transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File '{0}' not found")]
    NotFound(String),

    #[error("File '{0}' already exists")]
    FileExists(String),

    #[error("user '{user}' has no read permission on '{file}'")]
    ReadPermission { user: String, file: String },

    #[error("user '{user}' has no write permission on '{file}'")]
    WritePermission { user: String, file: String },

    #[error("only the owner of '{file}' may do this")]
    OwnerRequired { file: String },

    #[error("sentence {sentence} of '{file}' is locked by '{holder}'")]
    Locked {
        file: String,
        sentence: usize,
        holder: String,
    },

    #[error(transparent)]
    Filename(#[from] FilenameError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error(transparent)]
    Acl(#[from] AclParseError),

    #[error("corrupt metadata: {0}")]
    Meta(#[from] MetaParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Internal(String),
}

impl StorageError {
    /// The wire status this error surfaces as.
    pub fn status(&self) -> Status {
        match self {
            StorageError::NotFound(_) => Status::NotFound,
            StorageError::FileExists(_) => Status::FileExists,
            StorageError::ReadPermission { .. } => Status::ReadPermission,
            StorageError::WritePermission { .. } => Status::WritePermission,
            StorageError::OwnerRequired { .. } => Status::OwnerRequired,
            StorageError::Locked { .. } => Status::Locked,
            StorageError::Filename(_) => Status::InvalidFilename,
            StorageError::Edit(_) => Status::InvalidIndex,
            StorageError::InvalidArgs(_) => Status::InvalidArgs,
            StorageError::InvalidOperation(_) => Status::InvalidOperation,
            StorageError::Acl(_) => Status::InvalidArgs,
            StorageError::Meta(_) => Status::Internal,
            StorageError::Io(_) => Status::Internal,
            StorageError::Transport(_) => Status::Network,
            StorageError::Internal(_) => Status::Internal,
        }
    }

    /// Renders this error as a response frame.
    pub fn to_response(&self) -> ResponseFrame {
        ResponseFrame::error(self.status(), &self.to_string())
    }
}

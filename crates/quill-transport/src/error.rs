//! Transport error type.

use quill_msg::FrameError;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("timed out connecting to {0}")]
    ConnectTimeout(std::net::SocketAddr),
}

impl TransportError {
    /// Whether this error means the peer is gone (clean close, reset, or
    /// a frame cut short). Integrity failures also count: a corrupted
    /// frame is disconnect-worthy by protocol rule.
    pub fn is_disconnect(&self) -> bool {
        match self {
            TransportError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            TransportError::Frame(
                FrameError::ChecksumMismatch { .. } | FrameError::BadMagic { .. },
            ) => true,
            _ => false,
        }
    }
}

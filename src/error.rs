//! Error taxonomy shared by every engine in the crate.
//!
//! Construction-time failures (`create_*`) surface synchronously to the
//! caller. Per-task failures inside a queue worker are delivered only through
//! that task's completion listener so one failing transfer never aborts the
//! worker loop. Cancellation is a `Canceled` completion result, not a
//! separate channel.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransferError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// Unknown generic error
    #[error("generic error")]
    Generic,

    /// Memory or resource allocation failure
    #[error("allocation failure")]
    Allocation,

    /// A required argument is missing or malformed
    #[error("bad parameter: {0}")]
    BadParameter(&'static str),

    /// Operation on an engine that was never created, or already closed
    #[error("not initialized")]
    NotInitialized,

    /// `create_*` called while the engine is already open
    #[error("already initialized")]
    AlreadyInitialized,

    /// A second worker was started for the same open cycle
    #[error("worker already running")]
    WorkerAlreadyRunning,

    /// The engine cannot be closed while its worker is still processing
    #[error("worker still processing")]
    WorkerBusy,

    /// Cooperative cancellation was observed
    #[error("canceled")]
    Canceled,

    /// Local system failure (filesystem, OS resources)
    #[error("system error: {0}")]
    System(String),

    /// Remote-store failure reported by the transfer client
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local file handling failure (rename, staging)
    #[error("file error: {0}")]
    File(String),
}

impl TransferError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, TransferError::Canceled)
    }
}

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        TransferError::System(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::TransferError;

    #[test]
    fn canceled_is_detected() {
        assert!(TransferError::Canceled.is_canceled());
        assert!(!TransferError::Generic.is_canceled());
    }

    #[test]
    fn io_errors_map_to_system() {
        let err: TransferError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, TransferError::System(_)));
    }
}

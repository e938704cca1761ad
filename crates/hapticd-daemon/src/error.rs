//! Error types for the hapticd daemon.

use std::path::PathBuf;

use hapticd_proto::FrameError;

/// Errors that can occur in the daemon
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A live daemon already owns the socket
    #[error("Another daemon is already listening on {}", .0.display())]
    AlreadyRunning(PathBuf),

    /// Stream framing error
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "socket missing");
        let err = DaemonError::Io(io_err);
        assert!(err.to_string().contains("I/O error"));
        assert!(err.to_string().contains("socket missing"));
    }

    #[test]
    fn test_daemon_error_display_already_running() {
        let err = DaemonError::AlreadyRunning(PathBuf::from("/run/user/1000/hapticd.sock"));
        assert_eq!(
            err.to_string(),
            "Another daemon is already listening on /run/user/1000/hapticd.sock"
        );
    }

    #[test]
    fn test_daemon_error_from_frame_error() {
        let err: DaemonError = FrameError::FrameTooLarge(42).into();
        assert!(matches!(err, DaemonError::Frame(_)));
        assert!(err.to_string().starts_with("Frame error"));
    }
}

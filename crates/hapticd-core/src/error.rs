use hapticd_proto::CodecError;
use hapticd_types::{ErrorCode, Message};
use thiserror::Error;

/// Failures raised while routing a command to a device.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Unknown device index {0}")]
    UnknownDevice(u32),

    #[error("Device {index} does not support {tag}")]
    UnsupportedCommand { index: u32, tag: &'static str },

    #[error("Device {index} has {count} features for {tag}, index {feature} is out of range")]
    FeatureOutOfRange {
        index: u32,
        tag: &'static str,
        feature: u32,
        count: u32,
    },

    #[error("Device {0} is disconnected")]
    Disconnected(u32),

    #[error("Session closed")]
    SessionClosed,

    #[error("Device failure: {0}")]
    Failed(String),
}

impl DeviceError {
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            DeviceError::SessionClosed => ErrorCode::Unknown,
            _ => ErrorCode::Device,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    #[error("No scanning backends registered")]
    NoBackends,

    #[error("Scanning already in progress")]
    AlreadyScanning,

    #[error("Backend {backend} failed: {reason}")]
    Backend { backend: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandshakeError {
    #[error("Handshake has not been completed")]
    NotCompleted,

    #[error("Handshake already completed")]
    AlreadyCompleted,

    #[error("Client schema version {requested} is older than the minimum {minimum}")]
    IncompatibleVersion { requested: u32, minimum: u32 },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("{0} can only be sent by the server")]
    ServerOnly(&'static str),

    #[error("Message id 0 is reserved for server messages")]
    ReservedId,

    #[error("{tag} requires schema version {required}, session negotiated {negotiated}")]
    VersionTooNew {
        tag: &'static str,
        required: u32,
        negotiated: u32,
    },

    #[error("Unexpected message {0}")]
    UnexpectedMessage(&'static str),

    #[error("Ping timed out")]
    PingTimeout,

    #[error("Server shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wire error class for this failure.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Error::Codec(e) => e.error_code(),
            Error::Device(e) => e.error_code(),
            Error::Scan(_) => ErrorCode::Device,
            Error::Handshake(_) => ErrorCode::Init,
            Error::ServerOnly(_)
            | Error::ReservedId
            | Error::VersionTooNew { .. }
            | Error::UnexpectedMessage(_) => ErrorCode::Msg,
            Error::PingTimeout => ErrorCode::Ping,
            Error::Io(_) | Error::Json(_) | Error::Config(_) | Error::ShutDown => {
                ErrorCode::Unknown
            }
        }
    }

    /// Error reply correlated to `id`.
    #[must_use]
    pub fn to_message(&self, id: u32) -> Message {
        Message::error(id, self.error_code(), self.to_string())
    }
}

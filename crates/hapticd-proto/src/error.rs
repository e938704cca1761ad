use hapticd_types::{ErrorCode, Message};
use thiserror::Error;

/// Failures while turning wire text into messages or messages into wire text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Unknown message type: {tag}")]
    UnknownMessage { id: Option<u32>, tag: String },

    #[error("Malformed message: {reason}")]
    MalformedMessage { id: Option<u32>, reason: String },

    #[error("No backwards compatible version of {tag} (schema {version}) for schema {target}")]
    NoBackwardsCompatibleVersion {
        id: u32,
        tag: &'static str,
        version: u32,
        target: u32,
    },
}

pub type Result<T> = std::result::Result<T, CodecError>;

impl CodecError {
    pub(crate) fn malformed(id: Option<u32>, reason: impl ToString) -> Self {
        CodecError::MalformedMessage {
            id,
            reason: reason.to_string(),
        }
    }

    /// Correlation id of the offending element, if it could be read.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        match self {
            CodecError::UnknownMessage { id, .. } | CodecError::MalformedMessage { id, .. } => *id,
            CodecError::NoBackwardsCompatibleVersion { id, .. } => Some(*id),
        }
    }

    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::Msg
    }

    /// Wire reply for this failure.
    ///
    /// When the element's `Id` cannot be read the reply carries id 0, the
    /// system id. It still takes the element's slot in the reply batch, which
    /// is how a client matches it.
    #[must_use]
    pub fn to_message(&self) -> Message {
        Message::error(self.id().unwrap_or(0), self.error_code(), self.to_string())
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::malformed(None, err)
    }
}

impl From<CodecError> for Message {
    fn from(err: CodecError) -> Self {
        err.to_message()
    }
}

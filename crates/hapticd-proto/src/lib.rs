//! Wire protocol for the hapticd device hub.
//!
//! # Architecture
//!
//! - [`registry`]: immutable schema table (tag, version, predecessor, direction)
//! - [`codec`]: JSON envelope encode/decode and downgrade to older schemas
//! - [`framing`]: splits a byte stream into complete JSON array payloads
//! - [`error`]: codec error type
//!
//! # Example
//!
//! ```
//! use hapticd_proto::codec;
//!
//! let decoded = codec::deserialize(r#"[{"Ping":{"Id":4}}]"#);
//! assert_eq!(decoded.len(), 1);
//! assert_eq!(decoded[0].as_ref().unwrap().id(), 4);
//! ```

pub mod codec;
pub mod error;
pub mod framing;
pub mod registry;

pub use codec::{SerializedBatch, decode_element, deserialize, downgrade, encode_message, serialize};
pub use error::{CodecError, Result};
pub use framing::{FrameError, JsonArrayCodec};
pub use registry::{
    CURRENT_SCHEMA_VERSION, Direction, MessageMetadata, Registration, SchemaRegistry, registry,
};

pub use hapticd_types::{ErrorCode, Message, MessageKind};

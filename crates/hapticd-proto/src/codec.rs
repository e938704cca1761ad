//! JSON envelope codec.
//!
//! Wire form is a JSON array of single-key objects, `[{"Tag": {fields}}]`.
//! Several arrays may arrive back to back without separators.

use hapticd_types::{Message, MessageKind};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::CodecError;
use crate::registry::registry;

/// Output of [`serialize`]: the wire text for every message that could be
/// encoded, plus one error per message that could not.
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedBatch {
    pub text: String,
    pub failures: Vec<CodecError>,
}

impl SerializedBatch {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Walk `message` down its predecessor chain until its shape fits `target`.
///
/// # Errors
///
/// Returns [`CodecError::NoBackwardsCompatibleVersion`] when the chain ends
/// before reaching a shape at or below `target`.
pub fn downgrade(message: Message, target: u32) -> Result<Message, CodecError> {
    let reg = registry();
    let mut current = message;
    loop {
        let kind = current.kind();
        let Some(meta) = reg.metadata(kind) else {
            return Err(CodecError::UnknownMessage {
                id: Some(current.id()),
                tag: kind.tag().to_string(),
            });
        };
        if meta.schema_version <= target {
            return Ok(current);
        }

        let no_version = |id| CodecError::NoBackwardsCompatibleVersion {
            id,
            tag: meta.tag,
            version: meta.schema_version,
            target,
        };
        if meta.predecessor.is_none() {
            return Err(no_version(current.id()));
        }
        current = current
            .into_predecessor()
            .map_err(|original| no_version(original.id()))?;
        trace!("Downgraded {} to {}", kind, current.kind());
    }
}

/// Encode one message as its `{tag: fields}` envelope element.
///
/// # Errors
///
/// Returns an error if the message body cannot be represented as JSON.
pub fn encode_message(message: &Message) -> Result<Value, CodecError> {
    let fields = message.to_fields()?;
    let mut envelope = Map::with_capacity(1);
    envelope.insert(message.tag().to_string(), fields);
    Ok(Value::Object(envelope))
}

/// Encode `messages` as one JSON array at schema version `target`.
///
/// Each message is downgraded independently; a message with no compatible
/// shape is left out of the text and reported in `failures`.
#[must_use]
pub fn serialize(messages: &[Message], target: u32) -> SerializedBatch {
    let mut elements = Vec::with_capacity(messages.len());
    let mut failures = Vec::new();

    for message in messages {
        match downgrade(message.clone(), target).and_then(|m| encode_message(&m)) {
            Ok(element) => elements.push(element),
            Err(e) => {
                debug!("Dropping {} from batch: {}", message.kind(), e);
                failures.push(e);
            }
        }
    }

    SerializedBatch {
        text: Value::Array(elements).to_string(),
        failures,
    }
}

fn read_id(fields: &Value) -> Option<u32> {
    fields
        .get("Id")
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
}

/// Decode one envelope element.
///
/// # Errors
///
/// Returns [`CodecError::UnknownMessage`] for unregistered tags and
/// [`CodecError::MalformedMessage`] when no shape of the tag accepts the body.
pub fn decode_element(element: Value) -> Result<Message, CodecError> {
    let Value::Object(envelope) = element else {
        return Err(CodecError::malformed(None, "expected a single-key object"));
    };
    if envelope.len() != 1 {
        return Err(CodecError::malformed(
            None,
            format!("expected exactly one message tag, found {}", envelope.len()),
        ));
    }
    let Some((tag, fields)) = envelope.into_iter().next() else {
        return Err(CodecError::malformed(None, "empty envelope"));
    };

    let id = read_id(&fields);
    let shapes = registry().shapes(&tag);
    if shapes.is_empty() {
        return Err(CodecError::UnknownMessage { id, tag });
    }

    let mut newest_error = None;
    for &kind in shapes {
        match Message::from_fields(kind, fields.clone()) {
            Ok(message) => return Ok(message),
            Err(e) => {
                trace!("{} rejected body: {}", kind, e);
                newest_error.get_or_insert(e);
            }
        }
    }

    let reason = newest_error.map_or_else(|| format!("invalid {tag}"), |e| format!("{tag}: {e}"));
    Err(CodecError::malformed(id, reason))
}

/// Decode every element of every array in `text`.
///
/// Arrays may be concatenated. A JSON syntax error stops decoding and is
/// reported as a single trailing [`CodecError::MalformedMessage`].
#[must_use]
pub fn deserialize(text: &str) -> Vec<Result<Message, CodecError>> {
    let mut results = Vec::new();
    let stream = serde_json::Deserializer::from_str(text).into_iter::<Value>();

    for value in stream {
        match value {
            Ok(Value::Array(elements)) => {
                results.extend(elements.into_iter().map(decode_element));
            }
            Ok(other) => {
                let id = read_id(&other);
                results.push(Err(CodecError::malformed(id, "expected a JSON array")));
            }
            Err(e) => {
                debug!("Stopping decode on syntax error: {}", e);
                results.push(Err(CodecError::malformed(None, e)));
                break;
            }
        }
    }

    results
}

/// Kinds that may be decoded from client input.
#[must_use]
pub fn accepts_from_client(kind: MessageKind) -> bool {
    registry()
        .metadata(kind)
        .is_some_and(|meta| meta.direction.accepts_from_client())
}

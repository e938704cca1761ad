//! Stream framing for the JSON array wire format.
//!
//! The protocol has no length prefix: a frame is one complete top-level JSON
//! array. The decoder tracks bracket depth, skipping brackets inside string
//! literals, and yields the raw array text once depth returns to zero.
//!
//! ```text
//! [{"Ping":{"Id":1}}][{"Ping":{"Id":2}}]
//! ^------ frame -----^^------ frame -----^
//! ```

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum frame size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Splits a byte stream into complete top-level JSON arrays.
#[derive(Debug)]
pub struct JsonArrayCodec {
    max_frame_size: usize,
    /// Bytes of the pending frame already examined.
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Default for JsonArrayCodec {
    fn default() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }
}

impl JsonArrayCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            scanned: 0,
            depth: 0,
            in_string: false,
            escaped: false,
        }
    }

    fn reset(&mut self) {
        self.scanned = 0;
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
    }
}

impl Decoder for JsonArrayCodec {
    type Item = String;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.scanned == 0 {
            let whitespace = src.iter().take_while(|b| b.is_ascii_whitespace()).count();
            src.advance(whitespace);

            let Some(&first) = src.first() else {
                return Ok(None);
            };
            if first != b'[' {
                src.advance(1);
                return Err(FrameError::UnexpectedByte(first));
            }
        }

        while self.scanned < src.len() {
            let byte = src[self.scanned];
            self.scanned += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'[' | b'{' => self.depth += 1,
                b']' | b'}' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        let frame = src.split_to(self.scanned);
                        self.reset();
                        let text = std::str::from_utf8(&frame)?;
                        return Ok(Some(text.to_string()));
                    }
                }
                _ => {}
            }
        }

        if src.len() > self.max_frame_size {
            return Err(FrameError::FrameTooLarge(src.len()));
        }
        Ok(None)
    }
}

impl Encoder<String> for JsonArrayCodec {
    type Error = FrameError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_size {
            return Err(FrameError::FrameTooLarge(item.len()));
        }
        dst.reserve(item.len());
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}

/// Errors that can occur while framing a stream
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Expected '[' at frame start, found byte 0x{0:02x}")]
    UnexpectedByte(u8),
}

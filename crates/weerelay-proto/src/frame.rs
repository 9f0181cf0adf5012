//! Relay frame codec for tokio.
//!
//! Inbound: length-prefixed binary frames, optionally zlib-compressed,
//! decoded into [`Message`] values. Outbound: newline-terminated command
//! lines from [`Request`] values.
//!
//! The decoder is a pure function of the bytes buffered so far: with fewer
//! bytes than one whole frame it returns `None` and leaves the buffer
//! untouched, so it is safe to call again with zero new bytes. Once a
//! whole frame is buffered, everything inside it must decode exactly to
//! the declared boundary; over- or under-runs are malformed, not retried.

use std::borrow::Cow;
use std::io::Read;

use bytes::{BufMut, BytesMut};
use flate2::read::ZlibDecoder;
use tokio_util::codec::{Decoder, Encoder};

use crate::command::Request;
use crate::error::{self, FrameError};
use crate::message::Message;
use crate::wire::Cursor;

/// Frame header: 4-byte self-inclusive length + 1-byte compression flag.
pub const FRAME_HEADER_LEN: usize = 5;

/// Default cap on a single frame (a full backlog sync can be large).
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const COMPRESSION_OFF: u8 = 0;
const COMPRESSION_ZLIB: u8 = 1;

/// Tokio codec for the relay wire protocol.
pub struct RelayCodec {
    max_frame_len: usize,
}

impl RelayCodec {
    /// Create a codec with the default frame size limit.
    #[must_use]
    pub fn new() -> RelayCodec {
        RelayCodec {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Create a codec with a custom frame size limit.
    #[must_use]
    pub fn with_max_frame_len(max_frame_len: usize) -> RelayCodec {
        RelayCodec { max_frame_len }
    }

    /// Sanitize an outgoing command line.
    ///
    /// - Truncates at the first line ending (one command per line)
    /// - Rejects NUL
    pub fn sanitize(mut line: String) -> error::Result<String> {
        if let Some(pos) = line.find(|c| c == '\r' || c == '\n') {
            line.truncate(pos);
        }
        if line.contains('\0') {
            return Err(error::ProtocolError::IllegalControlChar('\0'));
        }
        Ok(line)
    }
}

impl Default for RelayCodec {
    fn default() -> Self {
        RelayCodec::new()
    }
}

/// Decode the body of one complete frame (header included in `frame`).
fn decode_frame(frame: &[u8]) -> Result<Message, FrameError> {
    let body: Cow<'_, [u8]> = match frame[4] {
        COMPRESSION_OFF => Cow::Borrowed(&frame[FRAME_HEADER_LEN..]),
        COMPRESSION_ZLIB => {
            let mut inflated = Vec::new();
            ZlibDecoder::new(&frame[FRAME_HEADER_LEN..])
                .read_to_end(&mut inflated)
                .map_err(FrameError::Decompress)?;
            Cow::Owned(inflated)
        }
        other => return Err(FrameError::UnknownCompression(other)),
    };

    let mut cursor = Cursor::new(&body);
    let id = cursor.string().map_err(FrameError::from_decode)?;
    let mut objects = Vec::new();
    while !cursor.is_empty() {
        objects.push(cursor.tagged_object().map_err(FrameError::from_decode)?);
    }
    Ok(Message::new(id, objects))
}

impl Decoder for RelayCodec {
    type Item = Message;
    type Error = error::ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<Message>> {
        if src.len() < 4 {
            return Ok(None);
        }

        let declared = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if declared < FRAME_HEADER_LEN {
            return Err(FrameError::LengthTooSmall {
                declared,
                header: FRAME_HEADER_LEN,
            }
            .into());
        }
        if declared > self.max_frame_len {
            return Err(FrameError::FrameTooLong {
                declared,
                limit: self.max_frame_len,
            }
            .into());
        }
        if src.len() < declared {
            // Partial frame: keep everything buffered and wait for more.
            src.reserve(declared - src.len());
            return Ok(None);
        }

        let frame = src.split_to(declared);
        let message = decode_frame(&frame)?;

        #[cfg(feature = "tracing")]
        tracing::trace!(
            size = declared,
            id = message.id().unwrap_or(""),
            objects = message.objects().len(),
            "decoded frame"
        );

        Ok(Some(message))
    }
}

impl Encoder<Request> for RelayCodec {
    type Error = error::ProtocolError;

    fn encode(&mut self, request: Request, dst: &mut BytesMut) -> error::Result<()> {
        let line = Self::sanitize(request.to_string())?;
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

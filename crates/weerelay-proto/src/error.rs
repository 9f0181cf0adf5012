//! Error types for the WeeChat relay protocol library.
//!
//! This module defines error types for frame-level failures, object
//! decoding failures, and the recoverable incomplete-input condition.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Top-level protocol errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be decoded.
    ///
    /// Always fatal to the connection: bad length accounting, bad type
    /// tags and decompression failures mean the byte stream can no longer
    /// be trusted.
    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),

    /// An outbound command contained an illegal control character.
    #[error("illegal control character: {0:?}")]
    IllegalControlChar(char),
}

/// Errors encountered while extracting and decoding one relay frame.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameError {
    /// Declared frame length is smaller than the fixed header.
    #[error("frame length {declared} smaller than header ({header} bytes)")]
    LengthTooSmall {
        /// Length declared in the frame header.
        declared: usize,
        /// Size of the fixed frame header.
        header: usize,
    },

    /// Declared frame length exceeds the configured limit.
    #[error("frame too long: {declared} bytes (limit: {limit})")]
    FrameTooLong {
        /// Length declared in the frame header.
        declared: usize,
        /// Maximum allowed frame length.
        limit: usize,
    },

    /// The compression flag byte is not a known value.
    #[error("unknown compression flag: {0:#04x}")]
    UnknownCompression(u8),

    /// The compressed frame body failed to inflate.
    #[error("zlib decompression failed: {0}")]
    Decompress(#[source] std::io::Error),

    /// An object ran past the declared end of the frame.
    ///
    /// The frame body is complete by construction when decoding starts, so
    /// an [`DecodeError::Incomplete`] inside it means the frame's length
    /// accounting is wrong, not that more bytes should be awaited.
    #[error("object truncated at frame boundary: {0}")]
    Truncated(#[source] DecodeError),

    /// An object inside the frame could not be decoded.
    #[error("invalid object in frame: {0}")]
    Object(#[source] DecodeError),
}

impl FrameError {
    /// Classify a decode failure found inside a complete frame body.
    pub(crate) fn from_decode(err: DecodeError) -> Self {
        if err.is_incomplete() {
            FrameError::Truncated(err)
        } else {
            FrameError::Object(err)
        }
    }
}

/// Errors encountered while decoding typed objects from a byte cursor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    /// The cursor ran out of bytes mid-value.
    ///
    /// Recoverable at the stream level: the framer waits for more
    /// transport bytes. Inside a complete frame body it is promoted to
    /// [`FrameError::Truncated`].
    #[error("incomplete input: need {needed} more byte(s)")]
    Incomplete {
        /// Additional bytes required to make progress.
        needed: usize,
    },

    /// The 3-byte object type tag is not part of the protocol.
    #[error("unknown object type tag: {}", crate::object::tag_display(.tag))]
    UnknownTag {
        /// The raw tag bytes.
        tag: [u8; 3],
    },

    /// A decoded object did not match the caller's structural expectation.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Type the caller asked for.
        expected: &'static str,
        /// Type actually present.
        found: &'static str,
    },

    /// A string or buffer value contained invalid UTF-8.
    #[error("invalid UTF-8 in {what} at byte {byte_pos}")]
    InvalidUtf8 {
        /// What was being decoded (e.g. "string", "message id").
        what: &'static str,
        /// Byte offset where validation failed.
        byte_pos: usize,
    },

    /// An ASCII-encoded number (pointer, long, time) failed to parse.
    #[error("invalid {what} value: {value:?}")]
    InvalidNumber {
        /// What was being decoded (e.g. "pointer", "long integer").
        what: &'static str,
        /// The offending ASCII payload.
        value: String,
    },

    /// A length field was negative where only null (-1) is allowed.
    #[error("invalid length {length} for {what}")]
    InvalidLength {
        /// What carried the length field.
        what: &'static str,
        /// The decoded length value.
        length: i64,
    },
}

impl DecodeError {
    /// True when the error only signals that more input is required.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, DecodeError::Incomplete { .. })
    }
}

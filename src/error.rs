//! Unified error handling for the relay client.
//!
//! One hierarchy covers the connection driver and the state mirror, with
//! automatic conversions from the protocol layer and stable error codes
//! for log labeling.

use thiserror::Error;
use weerelay_proto::{DecodeError, ProtocolError};

/// Errors surfaced by the relay client.
///
/// Protocol-level failures (malformed frames, type mismatches) are fatal
/// to the connection: the driver forces a close and reports exactly one of
/// these before returning to the disconnected state.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure: refused, DNS, reset, or TLS I/O.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// TLS setup failure (root store, server name).
    #[error("tls error: {0}")]
    Tls(String),

    /// The wire protocol was violated (framing or object decoding).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A decoded message did not have the structure its record requires.
    #[error("type mismatch applying {record}: {source}")]
    Apply {
        /// The hdata record or event being applied.
        record: String,
        /// The underlying structural mismatch.
        #[source]
        source: DecodeError,
    },

    /// The server closed the connection without a reason.
    ///
    /// Immediately after `init` this is how the relay signals a rejected
    /// password or one-time password; there is no structured
    /// authentication-failure message in the protocol.
    #[error("connection closed by server")]
    ClosedByServer,

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Tls(_) => "tls",
            Self::Protocol(_) => "protocol",
            Self::Apply { .. } => "apply",
            Self::ClosedByServer => "closed_by_server",
            Self::Config(_) => "config",
        }
    }

    /// True when the failure happened below the protocol layer.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Tls(_) | Self::ClosedByServer
        )
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

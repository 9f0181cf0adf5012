//! Change notifications for the presentation layer.
//!
//! Events are emitted after the mirror has fully applied a message; a
//! consumer never observes a partially-applied state. Pointers in events
//! may refer to entities that a later event removes - consumers must
//! treat handles as invalid after [`RelayEvent::BufferRemoved`] or
//! [`RelayEvent::Disconnected`].

use weerelay_proto::Pointer;

/// One observable state change.
#[derive(Clone, Debug, PartialEq)]
pub enum RelayEvent {
    /// The session reached the active (synced) state.
    Connected,
    /// The session ended; all pointer handles are now stale.
    Disconnected {
        /// Human-readable disconnect reason.
        reason: String,
    },
    /// A buffer was created.
    BufferAdded(Pointer),
    /// A buffer's fields changed (name, title, number, local variables).
    BufferUpdated(Pointer),
    /// A buffer was closed and dropped together with its lines and nicks.
    BufferRemoved(Pointer),
    /// A buffer's lines were cleared (the buffer itself survives).
    BufferCleared(Pointer),
    /// One line was appended to a buffer.
    LineAdded {
        /// Owning buffer.
        buffer: Pointer,
        /// The new line.
        line: Pointer,
    },
    /// Backlog lines were prepended to a buffer, oldest first.
    LinesPrepended {
        /// Owning buffer.
        buffer: Pointer,
        /// Number of lines inserted at the front.
        count: usize,
    },
    /// A buffer's nicklist changed.
    NickChanged(Pointer),
    /// Response to an `info` request.
    Info {
        /// Info name.
        name: String,
        /// Info value, when the server knows the name.
        value: Option<String>,
    },
}

impl RelayEvent {
    /// The buffer this event concerns, when it concerns one.
    #[must_use]
    pub fn buffer(&self) -> Option<Pointer> {
        match self {
            RelayEvent::BufferAdded(p)
            | RelayEvent::BufferUpdated(p)
            | RelayEvent::BufferRemoved(p)
            | RelayEvent::BufferCleared(p)
            | RelayEvent::NickChanged(p) => Some(*p),
            RelayEvent::LineAdded { buffer, .. } | RelayEvent::LinesPrepended { buffer, .. } => {
                Some(*buffer)
            }
            _ => None,
        }
    }
}

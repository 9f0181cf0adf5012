//! The relay client: connection lifecycle and the public handle.

mod connection;

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use weerelay_proto::Pointer;

use crate::config::RelayConfig;
use crate::error::ClientResult;
use crate::event::RelayEvent;
use crate::state::Mirror;

use connection::Connection;

/// Commands from the handle to the connection task.
#[derive(Clone, Debug)]
pub(crate) enum ClientCommand {
    /// Send input text to a buffer.
    Input {
        /// Buffer full name or pointer string.
        buffer: String,
        /// The input line.
        data: String,
    },
    /// Fetch more backlog lines for one buffer.
    FetchHistory {
        /// Target buffer.
        buffer: Pointer,
        /// Number of lines to fetch.
        lines: u32,
    },
    /// Request a named info string.
    FetchInfo {
        /// Info name.
        name: String,
    },
    /// Subscribe to buffers (all when empty).
    Sync {
        /// Buffer names; empty = everything.
        buffers: Vec<String>,
    },
    /// Unsubscribe from buffers (all when empty).
    Desync {
        /// Buffer names; empty = everything.
        buffers: Vec<String>,
    },
    /// Gracefully close the session.
    Disconnect,
}

/// Handle to a running relay session.
///
/// Created by [`RelayClient::connect`], which also returns the event
/// receiver for change notifications. The mirror is shared: the session
/// task writes, everyone else reads.
///
/// Dropping the handle disconnects the session (the command channel
/// closing is treated as a disconnect request).
pub struct RelayClient {
    commands: mpsc::UnboundedSender<ClientCommand>,
    mirror: Arc<RwLock<Mirror>>,
}

impl RelayClient {
    /// Connect to a relay and spawn the session task.
    ///
    /// The transport (and TLS handshake, when enabled) is established
    /// before this returns, so refused connections and TLS failures are
    /// reported here; everything after that - including an authentication
    /// rejection, which the relay only expresses by closing the socket -
    /// arrives as a [`RelayEvent::Disconnected`] on the returned channel.
    pub async fn connect(
        config: RelayConfig,
    ) -> ClientResult<(RelayClient, mpsc::UnboundedReceiver<RelayEvent>)> {
        config.validate()?;
        let stream = connection::connect_transport(&config).await?;

        // Fresh mirror per connection: pointer handles never survive a
        // reconnect.
        let mirror = Arc::new(RwLock::new(Mirror::new()));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let session = Connection::new(config, mirror.clone(), event_tx, command_rx);
        tokio::spawn(session.run(stream));

        Ok((
            RelayClient {
                commands: command_tx,
                mirror,
            },
            event_rx,
        ))
    }

    /// Shared view of the mirrored state.
    ///
    /// Readers must treat pointer handles as invalid after a
    /// [`RelayEvent::BufferRemoved`] or [`RelayEvent::Disconnected`], and
    /// must never mutate through this handle.
    #[must_use]
    pub fn mirror(&self) -> Arc<RwLock<Mirror>> {
        self.mirror.clone()
    }

    /// Send input text to a buffer. Returns false once the session ended.
    pub fn input(&self, buffer: impl Into<String>, data: impl Into<String>) -> bool {
        self.send(ClientCommand::Input {
            buffer: buffer.into(),
            data: data.into(),
        })
    }

    /// Fetch `lines` more backlog lines for a buffer; the result arrives
    /// as a [`RelayEvent::LinesPrepended`].
    pub fn fetch_history(&self, buffer: Pointer, lines: u32) -> bool {
        self.send(ClientCommand::FetchHistory { buffer, lines })
    }

    /// Request a named info string (e.g. `version`).
    pub fn fetch_info(&self, name: impl Into<String>) -> bool {
        self.send(ClientCommand::FetchInfo { name: name.into() })
    }

    /// Subscribe to updates for the given buffers (all when empty).
    pub fn sync(&self, buffers: Vec<String>) -> bool {
        self.send(ClientCommand::Sync { buffers })
    }

    /// Unsubscribe from updates for the given buffers (all when empty).
    pub fn desync(&self, buffers: Vec<String>) -> bool {
        self.send(ClientCommand::Desync { buffers })
    }

    /// Request a graceful disconnect (`quit`, then transport close).
    pub fn disconnect(&self) -> bool {
        self.send(ClientCommand::Disconnect)
    }

    fn send(&self, command: ClientCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

//! Sans-IO state machine for the relay connection lifecycle.
//!
//! This module manages the connect → init → sync flow without performing
//! any I/O: it consumes lifecycle notifications and decoded messages, and
//! produces actions (requests to send). The caller owns the transport.
//!
//! # Design Philosophy
//!
//! - **Sans-IO**: No network calls, timers, or blocking. Pure state
//!   transitions.
//! - **Runtime-agnostic**: Works with tokio, async-std, or blocking code.
//! - **Testable**: Easy to unit test without mocking a relay server.
//!
//! The relay protocol never acknowledges `init`: a wrong password is only
//! observable as the server closing the transport. The machine therefore
//! advances optimistically from [`SessionState::Handshaking`] to
//! [`SessionState::Authenticated`] once `init` is flushed; authentication
//! is confirmed implicitly by sync data arriving afterwards.
//!
//! # Example
//!
//! ```
//! use weerelay_proto::session::{SessionConfig, SessionMachine, SessionState};
//!
//! let mut machine = SessionMachine::new(SessionConfig {
//!     password: Some("secret".to_string()),
//!     ..SessionConfig::default()
//! });
//!
//! machine.connect_started();
//! let actions = machine.transport_ready();
//! for action in &actions {
//!     // Send action's request over the transport.
//! }
//! machine.init_sent();
//! assert_eq!(machine.state(), SessionState::Authenticated);
//! ```

use std::collections::HashMap;

use crate::command::{Command, Compression, Request};
use crate::message::Message;
use crate::object::Pointer;

/// Correlation id of the initial buffer list request.
pub const LIST_BUFFERS_ID: &str = "listbuffers";
/// Correlation id of the initial backlog lines request.
pub const LIST_LINES_ID: &str = "listlines";
/// Correlation id of the initial nicklist request.
pub const NICKLIST_ID: &str = "nicklist";

/// Buffer fields fetched on sync.
const BUFFER_KEYS: &str = "number,full_name,short_name,type,nicklist,title,local_variables";
/// Line fields fetched on sync and history backfill.
const LINE_KEYS: &str = "date,displayed,prefix,message,tags_array";

/// Current state of the relay session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionState {
    /// Initial state, no transport.
    #[default]
    Disconnected,
    /// Transport connect (and TLS handshake) in progress.
    Connecting,
    /// Transport up, `init` not yet flushed.
    Handshaking,
    /// `init` sent; assumed accepted until the server closes on us.
    Authenticated,
    /// Sync subscriptions issued, steady-state message flow.
    Active,
    /// Teardown in progress (quit sent or failure observed).
    Closing,
}

/// Configuration for the session state machine.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Relay password for `init`.
    pub password: Option<String>,
    /// One-time password for `init`, when the relay requires TOTP.
    pub totp: Option<String>,
    /// Frame compression to negotiate.
    pub compression: Compression,
    /// Number of backlog lines fetched per buffer on sync.
    pub history_lines: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            password: None,
            totp: None,
            compression: Compression::default(),
            history_lines: 50,
        }
    }
}

/// Expected semantics of an in-flight request's response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseKind {
    /// Full buffer list (initial sync).
    BufferList,
    /// Backlog lines; `buffer` is set for a single-buffer history fetch
    /// and `None` for the initial all-buffers backlog.
    HistoryLines {
        /// Target buffer of a history fetch.
        buffer: Option<Pointer>,
    },
    /// Full nicklist.
    Nicklist,
    /// Named info string.
    Info,
}

/// Where an inbound message should be routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Routing {
    /// Server push (event ids and id-less frames): apply to the mirror.
    Push,
    /// Response to an in-flight request issued by this machine.
    Response(ResponseKind),
}

/// Actions produced by the session state machine.
///
/// The caller is responsible for sending these requests to the server.
#[derive(Clone, Debug)]
pub enum SessionAction {
    /// Send this request to the server.
    ///
    /// Boxed to reduce enum size variance.
    Send(Box<Request>),
}

impl SessionAction {
    fn send(request: Request) -> SessionAction {
        SessionAction::Send(Box::new(request))
    }
}

/// Sans-IO session state machine.
///
/// One instance per connection; nothing is reused across reconnects.
#[derive(Clone, Debug)]
pub struct SessionMachine {
    config: SessionConfig,
    state: SessionState,
    /// Monotonic counter for generated request ids.
    next_request_id: u64,
    /// In-flight request id → expected response semantics.
    pending: HashMap<String, ResponseKind>,
}

impl SessionMachine {
    /// Create a new session machine in [`SessionState::Disconnected`].
    #[must_use]
    pub fn new(config: SessionConfig) -> SessionMachine {
        SessionMachine {
            config,
            state: SessionState::Disconnected,
            next_request_id: 0,
            pending: HashMap::new(),
        }
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of in-flight requests (test/diagnostic hook).
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// The transport connect has been initiated.
    pub fn connect_started(&mut self) {
        if self.state == SessionState::Disconnected {
            self.state = SessionState::Connecting;
        }
    }

    /// The transport (including TLS, when enabled) is established.
    ///
    /// Returns the `init` request to send.
    #[must_use]
    pub fn transport_ready(&mut self) -> Vec<SessionAction> {
        if self.state != SessionState::Connecting {
            return vec![];
        }
        self.state = SessionState::Handshaking;
        vec![SessionAction::send(Request::new(Command::Init {
            password: self.config.password.clone(),
            compression: self.config.compression,
            totp: self.config.totp.clone(),
        }))]
    }

    /// `init` has been flushed to the transport.
    ///
    /// The protocol sends no acknowledgement, so this optimistically
    /// advances to [`SessionState::Authenticated`]; a rejected password
    /// surfaces later as the server closing the transport.
    pub fn init_sent(&mut self) {
        if self.state == SessionState::Handshaking {
            self.state = SessionState::Authenticated;
        }
    }

    /// Issue the sync subscription sequence.
    ///
    /// Also used to resynchronize after `_upgrade_ended`. Registers the
    /// correlation ids of the three list requests.
    #[must_use]
    pub fn begin_sync(&mut self) -> Vec<SessionAction> {
        if !matches!(
            self.state,
            SessionState::Authenticated | SessionState::Active
        ) {
            return vec![];
        }
        self.state = SessionState::Active;

        self.pending
            .insert(LIST_BUFFERS_ID.to_string(), ResponseKind::BufferList);
        self.pending.insert(
            LIST_LINES_ID.to_string(),
            ResponseKind::HistoryLines { buffer: None },
        );
        self.pending
            .insert(NICKLIST_ID.to_string(), ResponseKind::Nicklist);

        vec![
            SessionAction::send(Request::with_id(
                LIST_BUFFERS_ID,
                Command::Hdata {
                    path: "buffer:gui_buffers(*)".to_string(),
                    keys: Some(BUFFER_KEYS.to_string()),
                },
            )),
            SessionAction::send(Request::with_id(
                LIST_LINES_ID,
                Command::Hdata {
                    path: format!(
                        "buffer:gui_buffers(*)/own_lines/last_line(-{})/data",
                        self.config.history_lines
                    ),
                    keys: Some(LINE_KEYS.to_string()),
                },
            )),
            SessionAction::send(Request::with_id(
                NICKLIST_ID,
                Command::Nicklist { buffer: None },
            )),
            SessionAction::send(Request::new(Command::Sync { buffers: vec![] })),
        ]
    }

    /// Request N more backlog lines for one buffer.
    ///
    /// The generated correlation id routes the response as a history
    /// backfill (prepend) for `buffer`.
    #[must_use]
    pub fn request_history(&mut self, buffer: Pointer, lines: u32) -> Vec<SessionAction> {
        if self.state != SessionState::Active {
            return vec![];
        }
        let id = self.generate_id("history");
        self.pending.insert(
            id.clone(),
            ResponseKind::HistoryLines {
                buffer: Some(buffer),
            },
        );
        vec![SessionAction::send(Request::with_id(
            id,
            Command::Hdata {
                path: format!("buffer:{buffer}/own_lines/last_line(-{lines})/data"),
                keys: Some(LINE_KEYS.to_string()),
            },
        ))]
    }

    /// Request a named info string.
    #[must_use]
    pub fn request_info(&mut self, name: &str) -> Vec<SessionAction> {
        if !matches!(
            self.state,
            SessionState::Authenticated | SessionState::Active
        ) {
            return vec![];
        }
        let id = self.generate_id("info");
        self.pending.insert(id.clone(), ResponseKind::Info);
        vec![SessionAction::send(Request::with_id(
            id,
            Command::Info {
                name: name.to_string(),
            },
        ))]
    }

    /// Stop receiving updates (server upgrade in progress).
    #[must_use]
    pub fn desync_all(&mut self) -> Vec<SessionAction> {
        if self.state != SessionState::Active {
            return vec![];
        }
        vec![SessionAction::send(Request::new(Command::Desync {
            buffers: vec![],
        }))]
    }

    /// Route one inbound message.
    ///
    /// A message whose id matches an in-flight request consumes that
    /// request and is routed as its response. Everything else - event ids
    /// like `_buffer_opened` as well as id-less frames - is a push for the
    /// state mirror.
    pub fn classify(&mut self, message: &Message) -> Routing {
        match message.id() {
            Some(id) => match self.pending.remove(id) {
                Some(kind) => Routing::Response(kind),
                None => Routing::Push,
            },
            None => Routing::Push,
        }
    }

    /// Begin a graceful teardown.
    ///
    /// Safe to call in any state; sends `quit` when the connection got far
    /// enough to have spoken to the relay.
    #[must_use]
    pub fn begin_close(&mut self) -> Vec<SessionAction> {
        let actions = match self.state {
            SessionState::Handshaking | SessionState::Authenticated | SessionState::Active => {
                vec![SessionAction::send(Request::new(Command::Quit))]
            }
            _ => vec![],
        };
        if self.state != SessionState::Disconnected {
            self.state = SessionState::Closing;
        }
        actions
    }

    /// The transport is gone; in-flight bookkeeping is discarded.
    pub fn transport_closed(&mut self) {
        self.state = SessionState::Disconnected;
        self.pending.clear();
    }

    fn generate_id(&mut self, prefix: &str) -> String {
        self.next_request_id += 1;
        format!("{prefix}-{}", self.next_request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_machine() -> SessionMachine {
        SessionMachine::new(SessionConfig {
            password: Some("secret".to_string()),
            ..SessionConfig::default()
        })
    }

    fn sent_line(action: &SessionAction) -> String {
        let SessionAction::Send(request) = action;
        request.to_string()
    }

    #[test]
    fn test_initial_state() {
        let machine = make_machine();
        assert_eq!(machine.state(), SessionState::Disconnected);
        assert_eq!(machine.pending_requests(), 0);
    }

    #[test]
    fn test_connect_and_init() {
        let mut machine = make_machine();
        machine.connect_started();
        assert_eq!(machine.state(), SessionState::Connecting);

        let actions = machine.transport_ready();
        assert_eq!(machine.state(), SessionState::Handshaking);
        assert_eq!(actions.len(), 1);
        assert_eq!(
            sent_line(&actions[0]),
            "init password=secret,compression=zlib"
        );
    }

    #[test]
    fn test_optimistic_authenticated_transition() {
        let mut machine = make_machine();
        machine.connect_started();
        let _ = machine.transport_ready();

        // No ack exists in the protocol; init_sent is enough.
        machine.init_sent();
        assert_eq!(machine.state(), SessionState::Authenticated);
    }

    #[test]
    fn test_begin_sync_sequence() {
        let mut machine = make_machine();
        machine.connect_started();
        let _ = machine.transport_ready();
        machine.init_sent();

        let actions = machine.begin_sync();
        assert_eq!(machine.state(), SessionState::Active);
        assert_eq!(actions.len(), 4);
        assert_eq!(machine.pending_requests(), 3);

        let lines: Vec<String> = actions.iter().map(sent_line).collect();
        assert_eq!(
            lines[0],
            "(listbuffers) hdata buffer:gui_buffers(*) \
             number,full_name,short_name,type,nicklist,title,local_variables"
        );
        assert_eq!(
            lines[1],
            "(listlines) hdata buffer:gui_buffers(*)/own_lines/last_line(-50)/data \
             date,displayed,prefix,message,tags_array"
        );
        assert_eq!(lines[2], "(nicklist) nicklist");
        assert_eq!(lines[3], "sync");
    }

    #[test]
    fn test_classify_response_then_push() {
        let mut machine = make_machine();
        machine.connect_started();
        let _ = machine.transport_ready();
        machine.init_sent();
        let _ = machine.begin_sync();

        let response = Message::new(Some(LIST_BUFFERS_ID.to_string()), vec![]);
        assert_eq!(
            machine.classify(&response),
            Routing::Response(ResponseKind::BufferList)
        );
        // The id is consumed: a duplicate is no longer correlated.
        assert_eq!(machine.classify(&response), Routing::Push);

        let push = Message::new(Some("_buffer_opened".to_string()), vec![]);
        assert_eq!(machine.classify(&push), Routing::Push);

        let idless = Message::new(None, vec![]);
        assert_eq!(machine.classify(&idless), Routing::Push);
    }

    #[test]
    fn test_request_history_correlation() {
        let mut machine = make_machine();
        machine.connect_started();
        let _ = machine.transport_ready();
        machine.init_sent();
        let _ = machine.begin_sync();

        let buffer = Pointer::new(0xabcd);
        let actions = machine.request_history(buffer, 100);
        assert_eq!(actions.len(), 1);
        assert_eq!(
            sent_line(&actions[0]),
            "(history-1) hdata buffer:0xabcd/own_lines/last_line(-100)/data \
             date,displayed,prefix,message,tags_array"
        );

        let response = Message::new(Some("history-1".to_string()), vec![]);
        assert_eq!(
            machine.classify(&response),
            Routing::Response(ResponseKind::HistoryLines {
                buffer: Some(buffer)
            })
        );
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let mut machine = make_machine();
        machine.connect_started();
        let _ = machine.transport_ready();
        machine.init_sent();
        let _ = machine.begin_sync();

        let a = machine.request_history(Pointer::new(1), 10);
        let b = machine.request_history(Pointer::new(2), 10);
        assert_ne!(sent_line(&a[0]), sent_line(&b[0]));
    }

    #[test]
    fn test_close_and_reset() {
        let mut machine = make_machine();
        machine.connect_started();
        let _ = machine.transport_ready();
        machine.init_sent();
        let _ = machine.begin_sync();

        let actions = machine.begin_close();
        assert_eq!(machine.state(), SessionState::Closing);
        assert_eq!(actions.len(), 1);
        assert_eq!(sent_line(&actions[0]), "quit");

        machine.transport_closed();
        assert_eq!(machine.state(), SessionState::Disconnected);
        assert_eq!(machine.pending_requests(), 0);
    }

    #[test]
    fn test_close_before_handshake_sends_nothing() {
        let mut machine = make_machine();
        machine.connect_started();
        let actions = machine.begin_close();
        assert!(actions.is_empty());
        assert_eq!(machine.state(), SessionState::Closing);
    }

    #[test]
    fn test_wrong_state_calls_are_inert() {
        let mut machine = make_machine();
        assert!(machine.transport_ready().is_empty());
        assert!(machine.begin_sync().is_empty());
        assert!(machine.request_history(Pointer::new(1), 10).is_empty());
        assert!(machine.desync_all().is_empty());
        assert_eq!(machine.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_resync_after_upgrade() {
        let mut machine = make_machine();
        machine.connect_started();
        let _ = machine.transport_ready();
        machine.init_sent();
        let _ = machine.begin_sync();

        // _upgrade: stop the flow; _upgrade_ended: full resync.
        let desync = machine.desync_all();
        assert_eq!(sent_line(&desync[0]), "desync");

        let resync = machine.begin_sync();
        assert_eq!(resync.len(), 4);
        assert_eq!(machine.state(), SessionState::Active);
        assert_eq!(machine.pending_requests(), 3);
    }
}

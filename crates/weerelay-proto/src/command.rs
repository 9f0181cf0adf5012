//! Outbound relay commands.
//!
//! Commands are text lines sent over the same stream the binary frames
//! arrive on. A [`Request`] pairs a command with an optional client-chosen
//! id; the server echoes the id on the correlated response frame.

use std::fmt;

/// Compression negotiated in the `init` command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Compression {
    /// No frame compression.
    Off,
    /// zlib-compressed frame bodies.
    #[default]
    Zlib,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::Off => f.write_str("off"),
            Compression::Zlib => f.write_str("zlib"),
        }
    }
}

/// Escape an `init` option value: commas separate options on the wire.
fn escape_init_value(value: &str) -> String {
    value.replace(',', "\\,")
}

/// An outbound relay command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Authenticate and negotiate compression. Must be the first command.
    Init {
        /// Relay password.
        password: Option<String>,
        /// Requested frame compression.
        compression: Compression,
        /// One-time password, when the relay requires TOTP.
        totp: Option<String>,
    },
    /// Request structured records along an hdata path.
    Hdata {
        /// Path expression, e.g. `buffer:gui_buffers(*)`.
        path: String,
        /// Comma-separated keys to fetch; `None` fetches all keys.
        keys: Option<String>,
    },
    /// Request a named info string.
    Info {
        /// Info name, e.g. `version`.
        name: String,
    },
    /// Request the nicklist of one buffer, or of all buffers.
    Nicklist {
        /// Buffer pointer or full name; `None` means all buffers.
        buffer: Option<String>,
    },
    /// Send input text to a buffer.
    Input {
        /// Buffer pointer or full name.
        buffer: String,
        /// The input line (command or chat text).
        data: String,
    },
    /// Subscribe to updates for the given buffers (all when empty).
    Sync {
        /// Buffer names/pointers; empty subscribes to everything.
        buffers: Vec<String>,
    },
    /// Unsubscribe from updates for the given buffers (all when empty).
    Desync {
        /// Buffer names/pointers; empty unsubscribes from everything.
        buffers: Vec<String>,
    },
    /// Close the relay connection.
    Quit,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Init {
                password,
                compression,
                totp,
            } => {
                f.write_str("init ")?;
                if let Some(password) = password {
                    write!(f, "password={},", escape_init_value(password))?;
                }
                write!(f, "compression={compression}")?;
                if let Some(totp) = totp {
                    write!(f, ",totp={}", escape_init_value(totp))?;
                }
                Ok(())
            }
            Command::Hdata { path, keys: Some(keys) } => write!(f, "hdata {path} {keys}"),
            Command::Hdata { path, keys: None } => write!(f, "hdata {path}"),
            Command::Info { name } => write!(f, "info {name}"),
            Command::Nicklist { buffer: Some(buffer) } => write!(f, "nicklist {buffer}"),
            Command::Nicklist { buffer: None } => f.write_str("nicklist"),
            Command::Input { buffer, data } => write!(f, "input {buffer} {data}"),
            Command::Sync { buffers } if buffers.is_empty() => f.write_str("sync"),
            Command::Sync { buffers } => write!(f, "sync {}", buffers.join(",")),
            Command::Desync { buffers } if buffers.is_empty() => f.write_str("desync"),
            Command::Desync { buffers } => write!(f, "desync {}", buffers.join(",")),
            Command::Quit => f.write_str("quit"),
        }
    }
}

/// A command plus its optional correlation id.
///
/// Serialized as `(id) command args`; push-style commands (no expected
/// response) omit the id.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    /// Client-chosen correlation id.
    pub id: Option<String>,
    /// The command to send.
    pub command: Command,
}

impl Request {
    /// A request without a correlation id.
    #[must_use]
    pub fn new(command: Command) -> Request {
        Request { id: None, command }
    }

    /// A request tagged with a correlation id.
    #[must_use]
    pub fn with_id(id: impl Into<String>, command: Command) -> Request {
        Request {
            id: Some(id.into()),
            command,
        }
    }
}

impl From<Command> for Request {
    fn from(command: Command) -> Request {
        Request::new(command)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(id) = &self.id {
            write!(f, "({id}) ")?;
        }
        self.command.fmt(f)
    }
}

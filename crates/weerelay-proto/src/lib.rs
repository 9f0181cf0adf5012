//! # weerelay-proto
//!
//! A Rust library for the WeeChat relay binary protocol: decoding the
//! self-describing typed object stream, framing length-prefixed (and
//! optionally zlib-compressed) messages, serializing outbound commands,
//! and driving the client session lifecycle.
//!
//! ## Features
//!
//! - Decoding of every relay wire type (`chr`, `int`, `lon`, `str`,
//!   `buf`, `ptr`, `tim`, `htb`, `hda`, `inf`, `inl`, `arr`)
//! - Incremental framing over a byte stream with strict boundary checking
//! - zlib frame decompression
//! - Outbound command construction with correlation ids
//! - Sans-IO session state machine (connect → init → sync → active)
//! - Optional Tokio integration (`RelayCodec` for `Framed` transports)
//!
//! ## Quick Start
//!
//! ```
//! use weerelay_proto::{Command, Compression, Request};
//!
//! let init = Request::new(Command::Init {
//!     password: Some("secret".to_string()),
//!     compression: Compression::Zlib,
//!     totp: None,
//! });
//! assert_eq!(init.to_string(), "init password=secret,compression=zlib");
//!
//! let lines = Request::with_id("listlines", Command::Hdata {
//!     path: "buffer:gui_buffers(*)/own_lines/last_line(-50)/data".to_string(),
//!     keys: Some("date,prefix,message".to_string()),
//! });
//! assert!(lines.to_string().starts_with("(listlines) hdata"));
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod command;
pub mod error;
#[cfg(feature = "tokio")]
pub mod frame;
pub mod message;
pub mod object;
pub mod session;
pub mod wire;

pub use self::command::{Command, Compression, Request};
pub use self::error::{DecodeError, FrameError, ProtocolError};
#[cfg(feature = "tokio")]
pub use self::frame::{RelayCodec, DEFAULT_MAX_FRAME_LEN, FRAME_HEADER_LEN};
pub use self::message::Message;
pub use self::object::{
    Array, Hashtable, Hdata, HdataRow, HdataRowRef, Infolist, ObjType, Object, Pointer,
};
pub use self::session::{
    ResponseKind, Routing, SessionAction, SessionConfig, SessionMachine, SessionState,
};
pub use self::wire::Cursor;

//! # weerelay
//!
//! A WeeChat relay client: connects to a relay, authenticates, subscribes
//! to buffers/lines/nicklists and maintains a client-side mirror of the
//! server state, emitting change events for a presentation layer to
//! consume.
//!
//! The wire protocol itself (binary object decoding, framing, outbound
//! commands, session state machine) lives in the `weerelay-proto` crate;
//! this crate adds the async connection driver and the domain state
//! mirror.
//!
//! ```no_run
//! use weerelay::{RelayClient, RelayConfig, RelayEvent};
//!
//! # async fn run() -> Result<(), weerelay::ClientError> {
//! let config = RelayConfig {
//!     host: "relay.example.org".to_string(),
//!     password: Some("secret".to_string()),
//!     ..RelayConfig::default()
//! };
//!
//! let (client, mut events) = RelayClient::connect(config).await?;
//! while let Some(event) = events.recv().await {
//!     match event {
//!         RelayEvent::LineAdded { buffer, .. } => {
//!             let mirror = client.mirror();
//!             let mirror = mirror.read();
//!             if let Some(buf) = mirror.buffer(buffer) {
//!                 println!("[{}] new line", buf.display_name());
//!             }
//!         }
//!         RelayEvent::Disconnected { reason } => {
//!             eprintln!("disconnected: {reason}");
//!             break;
//!         }
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod event;
pub mod relay;
pub mod state;
pub mod telemetry;

pub use config::RelayConfig;
pub use error::{ClientError, ClientResult};
pub use event::RelayEvent;
pub use relay::RelayClient;
pub use state::{Buffer, Line, Mirror, Nick};

// Re-export the protocol crate's types that appear in this crate's API.
pub use weerelay_proto::{Compression, Pointer, SessionState};

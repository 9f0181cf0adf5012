//! Client-side mirror of relay state.
//!
//! - [`buffer`]: the Buffer / Line / Nick entities
//! - [`mirror`]: applies decoded messages and emits change events

pub mod buffer;
pub mod mirror;

pub use buffer::{Buffer, Line, Nick};
pub use mirror::Mirror;

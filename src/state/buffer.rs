//! Client-side mirror entities: buffers, lines and nicks.
//!
//! All entities are keyed by the opaque pointer handles the relay assigns.
//! Handles are only meaningful within one connection; the mirror is
//! rebuilt from scratch on reconnect.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use weerelay_proto::Pointer;

/// One chat line.
#[derive(Clone, Debug, PartialEq)]
pub struct Line {
    /// Handle of the line itself.
    pub pointer: Pointer,
    /// Owning buffer.
    pub buffer: Pointer,
    /// Line timestamp.
    pub date: DateTime<Utc>,
    /// Whether the line is displayed (not filtered away server-side).
    pub displayed: bool,
    /// Prefix column (nick, join/quit marker, ...).
    pub prefix: String,
    /// Message text.
    pub message: String,
    /// Line tags (`irc_privmsg`, `notify_message`, ...).
    pub tags: Vec<String>,
}

impl Line {
    /// Timestamp helper for epoch seconds from the wire.
    #[must_use]
    pub fn date_from_epoch(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0)
            .single()
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// One nicklist entry: either a group or a nick.
#[derive(Clone, Debug, PartialEq)]
pub struct Nick {
    /// Handle of the nicklist item.
    pub pointer: Pointer,
    /// True for a group entry, false for a nick.
    pub group: bool,
    /// Whether the entry is visible.
    pub visible: bool,
    /// Prefix shown before the name (`@`, `+`, ...).
    pub prefix: String,
    /// Nick or group name.
    pub name: String,
    /// Name of the containing group; `None` at the top level.
    pub parent_group: Option<String>,
}

/// One relay buffer with its lines and nicklist.
#[derive(Clone, Debug, PartialEq)]
pub struct Buffer {
    /// Handle of the buffer.
    pub pointer: Pointer,
    /// Display position assigned by the server.
    pub number: i32,
    /// Unique full name (`irc.libera.#rust`).
    pub full_name: String,
    /// Short display name (`#rust`).
    pub short_name: Option<String>,
    /// Buffer title / topic.
    pub title: Option<String>,
    /// Buffer type (0 = formatted, 1 = free content).
    pub buffer_type: i32,
    /// Whether the buffer has a nicklist.
    pub has_nicklist: bool,
    /// Buffer local variables (`type`, `nick`, `channel`, ...).
    pub local_variables: HashMap<String, String>,
    /// Lines in display order, oldest first.
    pub lines: Vec<Line>,
    /// Nicklist entries in server order.
    pub nicks: Vec<Nick>,
}

impl Buffer {
    /// Create an empty buffer shell for the given handle.
    #[must_use]
    pub fn new(pointer: Pointer) -> Buffer {
        Buffer {
            pointer,
            number: 0,
            full_name: String::new(),
            short_name: None,
            title: None,
            buffer_type: 0,
            has_nicklist: false,
            local_variables: HashMap::new(),
            lines: Vec::new(),
            nicks: Vec::new(),
        }
    }

    /// The name to display: short name when set, else the full name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.short_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.full_name)
    }

    /// Look up a nicklist entry by handle.
    #[must_use]
    pub fn nick(&self, pointer: Pointer) -> Option<&Nick> {
        self.nicks.iter().find(|n| n.pointer == pointer)
    }

    /// Insert backlog lines at the front, preserving both groups' order.
    pub fn prepend_lines(&mut self, lines: Vec<Line>) {
        if lines.is_empty() {
            return;
        }
        let mut merged = lines;
        merged.append(&mut self.lines);
        self.lines = merged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(ptr: u64) -> Line {
        Line {
            pointer: Pointer::new(ptr),
            buffer: Pointer::new(1),
            date: Line::date_from_epoch(1_700_000_000),
            displayed: true,
            prefix: String::new(),
            message: format!("line {ptr}"),
            tags: vec![],
        }
    }

    #[test]
    fn test_display_name_fallback() {
        let mut buffer = Buffer::new(Pointer::new(1));
        buffer.full_name = "irc.libera.#rust".to_string();
        assert_eq!(buffer.display_name(), "irc.libera.#rust");

        buffer.short_name = Some(String::new());
        assert_eq!(buffer.display_name(), "irc.libera.#rust");

        buffer.short_name = Some("#rust".to_string());
        assert_eq!(buffer.display_name(), "#rust");
    }

    #[test]
    fn test_prepend_preserves_order() {
        let mut buffer = Buffer::new(Pointer::new(1));
        for i in 1..=5 {
            buffer.lines.push(line(i));
        }
        buffer.prepend_lines(vec![line(100), line(101), line(102)]);

        assert_eq!(buffer.lines.len(), 8);
        let order: Vec<u64> = buffer.lines.iter().map(|l| l.pointer.value()).collect();
        assert_eq!(order, vec![100, 101, 102, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_date_from_bad_epoch_clamps() {
        // Out-of-range epochs fall back instead of panicking.
        let date = Line::date_from_epoch(i64::MAX);
        assert_eq!(date.timestamp(), 0);
    }
}

//! The domain state mirror.
//!
//! [`Mirror`] holds the client-side copy of the relay's buffers, lines and
//! nicklists, and applies decoded messages to it. Dispatch is keyed by the
//! event id of the message (or, for id-less pushes, by each hdata's record
//! name), mapping to one update function per record kind.
//!
//! Update functions return the change notifications for the presentation
//! layer; they are only returned once the mutation for the whole message
//! is complete, so consumers never observe a partially-applied state.
//! Response messages are structurally validated before any mutation.
//!
//! Unknown event ids and record names are ignored: newer servers may send
//! records this client does not know, and that must never kill the
//! connection.

use tracing::{debug, trace};
use weerelay_proto::{Hdata, HdataRowRef, Message, Object, Pointer};

use crate::error::{ClientError, ClientResult};
use crate::event::RelayEvent;
use crate::state::buffer::{Buffer, Line, Nick};

/// Record name of buffer hdata.
const RECORD_BUFFER: &str = "buffer";
/// Record name of line hdata.
const RECORD_LINE: &str = "line_data";
/// Record name of nicklist hdata.
const RECORD_NICK: &str = "nicklist_item";

/// The client-side mirror of relay state.
///
/// Mutated exclusively by the session driver's message-apply step; the
/// presentation layer only reads. One mirror per connection - nothing
/// survives a reconnect (pointer handles may be reused by the server).
#[derive(Clone, Debug, Default)]
pub struct Mirror {
    buffers: Vec<Buffer>,
}

impl Mirror {
    /// Create an empty mirror.
    #[must_use]
    pub fn new() -> Mirror {
        Mirror::default()
    }

    /// All buffers in server order.
    #[must_use]
    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    /// Number of buffers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// True when no buffer is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Look up a buffer by handle.
    #[must_use]
    pub fn buffer(&self, pointer: Pointer) -> Option<&Buffer> {
        self.buffer_index(pointer).map(|i| &self.buffers[i])
    }

    /// Look up a buffer by its unique full name.
    #[must_use]
    pub fn buffer_by_full_name(&self, full_name: &str) -> Option<&Buffer> {
        self.buffers.iter().find(|b| b.full_name == full_name)
    }

    /// Drop everything (used on disconnect).
    pub fn reset(&mut self) {
        self.buffers.clear();
    }

    // -- response application ----------------------------------------------

    /// Apply a full buffer list response.
    ///
    /// The response is the complete list: known pointers are updated in
    /// place (keeping their lines and nicks), new ones are created, and
    /// buffers missing from the list are dropped.
    pub fn apply_buffer_list(&mut self, message: &Message) -> ClientResult<Vec<RelayEvent>> {
        let hdatas = expect_all_hdata(message)?;
        let mut events = Vec::new();
        let mut old = std::mem::take(&mut self.buffers);

        for hdata in filter_record(&hdatas, RECORD_BUFFER) {
            for row in hdata.rows() {
                let pointer = row.own_pointer();
                let existing = old.iter().position(|b| b.pointer == pointer);
                let mut buffer = match existing {
                    Some(i) => old.remove(i),
                    None => Buffer::new(pointer),
                };
                update_buffer_fields(&mut buffer, &row);
                events.push(match existing {
                    Some(_) => RelayEvent::BufferUpdated(pointer),
                    None => RelayEvent::BufferAdded(pointer),
                });
                self.buffers.push(buffer);
            }
        }

        // Whatever the server no longer lists is gone.
        for stale in old {
            events.push(RelayEvent::BufferRemoved(stale.pointer));
        }
        Ok(events)
    }

    /// Apply a backlog lines response (initial sync or history fetch).
    ///
    /// Rows arrive newest-first (the request walks `last_line` backwards);
    /// each buffer's batch is reversed to oldest-first and inserted before
    /// the lines already present, without disturbing their order.
    pub fn apply_history_lines(
        &mut self,
        message: &Message,
        target: Option<Pointer>,
    ) -> ClientResult<Vec<RelayEvent>> {
        let hdatas = expect_all_hdata(message)?;
        // Batches keyed by buffer, in encounter order.
        let mut batches: Vec<(Pointer, Vec<Line>)> = Vec::new();

        for hdata in filter_record(&hdatas, RECORD_LINE) {
            for row in hdata.rows() {
                let buffer = line_owner(&row, hdata, target);
                if self.buffer_index(buffer).is_none() {
                    trace!(%buffer, "dropping backlog line for unknown buffer");
                    continue;
                }
                let line = make_line(&row, buffer);
                match batches.iter_mut().find(|(p, _)| *p == buffer) {
                    Some((_, lines)) => lines.push(line),
                    None => batches.push((buffer, vec![line])),
                }
            }
        }

        let mut events = Vec::new();
        for (pointer, mut lines) in batches {
            lines.reverse();
            let count = lines.len();
            if let Some(i) = self.buffer_index(pointer) {
                self.buffers[i].prepend_lines(lines);
                events.push(RelayEvent::LinesPrepended {
                    buffer: pointer,
                    count,
                });
            }
        }
        Ok(events)
    }

    /// Apply a full nicklist response: per-buffer replacement.
    pub fn apply_nicklist(&mut self, message: &Message) -> ClientResult<Vec<RelayEvent>> {
        let hdatas = expect_all_hdata(message)?;
        let mut touched: Vec<Pointer> = Vec::new();

        for hdata in filter_record(&hdatas, RECORD_NICK) {
            let mut group: Option<String> = None;
            for row in hdata.rows() {
                let pointer = row.root_pointer();
                let Some(i) = self.buffer_index(pointer) else {
                    continue;
                };
                if !touched.contains(&pointer) {
                    self.buffers[i].nicks.clear();
                    touched.push(pointer);
                }
                let nick = make_nick(&row, &group);
                if nick.group {
                    group = Some(nick.name.clone());
                }
                self.buffers[i].nicks.push(nick);
            }
        }
        Ok(touched.into_iter().map(RelayEvent::NickChanged).collect())
    }

    /// Surface an `info` response.
    pub fn apply_info(&mut self, message: &Message) -> ClientResult<Vec<RelayEvent>> {
        let mut events = Vec::new();
        for object in message.objects() {
            if let Object::Info { name, value } = object {
                events.push(RelayEvent::Info {
                    name: name.clone().unwrap_or_default(),
                    value: value.clone(),
                });
            }
        }
        Ok(events)
    }

    // -- push application --------------------------------------------------

    /// Apply a server push.
    ///
    /// Dispatches on the event id; id-less pushes and unknown event ids
    /// fall through to record-name dispatch, where unknown records are
    /// ignored.
    pub fn apply_push(&mut self, message: &Message) -> ClientResult<Vec<RelayEvent>> {
        match message.id() {
            Some("_buffer_opened") => self.apply_buffer_opened(message),
            Some("_buffer_moved") | Some("_buffer_merged") | Some("_buffer_unmerged") => {
                self.apply_buffer_moved(message)
            }
            Some("_buffer_renamed")
            | Some("_buffer_title_changed")
            | Some("_buffer_type_changed") => self.apply_buffer_update(message),
            Some(id) if id.starts_with("_buffer_localvar_") => self.apply_buffer_update(message),
            Some("_buffer_cleared") => self.apply_buffer_cleared(message),
            Some("_buffer_closing") => self.apply_buffer_closing(message),
            Some("_buffer_line_added") => self.apply_line_added(message),
            Some("_nicklist") => self.apply_nicklist(message),
            Some("_nicklist_diff") => self.apply_nicklist_diff(message),
            None => self.apply_by_record_name(message),
            Some(other) => {
                debug!(id = other, "unhandled event id");
                self.apply_by_record_name(message)
            }
        }
    }

    /// Dispatch an id-less (or unrecognized) push by hdata record name.
    fn apply_by_record_name(&mut self, message: &Message) -> ClientResult<Vec<RelayEvent>> {
        let mut events = Vec::new();
        for hdata in message.hdata_objects() {
            match hdata.name() {
                RECORD_BUFFER => {
                    for row in hdata.rows() {
                        events.push(self.upsert_buffer(&row));
                    }
                }
                RECORD_LINE => events.extend(self.append_lines(hdata, None)),
                RECORD_NICK => {
                    let single = Message::new(None, vec![Object::Hdata(hdata.clone())]);
                    events.extend(self.apply_nicklist(&single)?);
                }
                other => {
                    debug!(record = other, "ignoring unknown hdata record");
                }
            }
        }
        Ok(events)
    }

    fn apply_buffer_opened(&mut self, message: &Message) -> ClientResult<Vec<RelayEvent>> {
        let hdatas = expect_all_hdata(message)?;
        let mut events = Vec::new();
        for hdata in filter_record(&hdatas, RECORD_BUFFER) {
            for row in hdata.rows() {
                events.push(self.upsert_buffer(&row));
            }
        }
        Ok(events)
    }

    fn apply_buffer_update(&mut self, message: &Message) -> ClientResult<Vec<RelayEvent>> {
        let hdatas = expect_all_hdata(message)?;
        let mut events = Vec::new();
        for hdata in filter_record(&hdatas, RECORD_BUFFER) {
            for row in hdata.rows() {
                let pointer = row.own_pointer();
                let Some(i) = self.buffer_index(pointer) else {
                    debug!(%pointer, "update for unknown buffer");
                    continue;
                };
                update_buffer_fields(&mut self.buffers[i], &row);
                events.push(RelayEvent::BufferUpdated(pointer));
            }
        }
        Ok(events)
    }

    fn apply_buffer_moved(&mut self, message: &Message) -> ClientResult<Vec<RelayEvent>> {
        let hdatas = expect_all_hdata(message)?;
        let mut events = Vec::new();
        for hdata in filter_record(&hdatas, RECORD_BUFFER) {
            for row in hdata.rows() {
                let pointer = row.own_pointer();
                let Some(i) = self.buffer_index(pointer) else {
                    continue;
                };
                let mut buffer = self.buffers.remove(i);
                update_buffer_fields(&mut buffer, &row);
                let at = self.insert_index(row.pointer_field("next_buffer"));
                self.buffers.insert(at, buffer);
                events.push(RelayEvent::BufferUpdated(pointer));
            }
        }
        Ok(events)
    }

    fn apply_buffer_cleared(&mut self, message: &Message) -> ClientResult<Vec<RelayEvent>> {
        let hdatas = expect_all_hdata(message)?;
        let mut events = Vec::new();
        for hdata in filter_record(&hdatas, RECORD_BUFFER) {
            for row in hdata.rows() {
                let pointer = row.own_pointer();
                if let Some(i) = self.buffer_index(pointer) {
                    self.buffers[i].lines.clear();
                    events.push(RelayEvent::BufferCleared(pointer));
                }
            }
        }
        Ok(events)
    }

    fn apply_buffer_closing(&mut self, message: &Message) -> ClientResult<Vec<RelayEvent>> {
        let hdatas = expect_all_hdata(message)?;
        let mut events = Vec::new();
        for hdata in filter_record(&hdatas, RECORD_BUFFER) {
            for row in hdata.rows() {
                let pointer = row.own_pointer();
                if let Some(i) = self.buffer_index(pointer) {
                    // Lines and nicks go with the buffer; the handle is
                    // stale from here on (the server may reuse it).
                    self.buffers.remove(i);
                    events.push(RelayEvent::BufferRemoved(pointer));
                }
            }
        }
        Ok(events)
    }

    fn apply_line_added(&mut self, message: &Message) -> ClientResult<Vec<RelayEvent>> {
        let hdatas = expect_all_hdata(message)?;
        let mut events = Vec::new();
        for hdata in filter_record(&hdatas, RECORD_LINE) {
            events.extend(self.append_lines(hdata, None));
        }
        Ok(events)
    }

    /// Append rows of one `line_data` hdata in received order.
    fn append_lines(&mut self, hdata: &Hdata, target: Option<Pointer>) -> Vec<RelayEvent> {
        let mut events = Vec::new();
        for row in hdata.rows() {
            let buffer = line_owner(&row, hdata, target);
            let Some(i) = self.buffer_index(buffer) else {
                // Either a stale pointer after a close or a line for a
                // buffer outside the sync scope.
                trace!(%buffer, "dropping line for unknown buffer");
                continue;
            };
            let line = make_line(&row, buffer);
            let pointer = line.pointer;
            self.buffers[i].lines.push(line);
            events.push(RelayEvent::LineAdded {
                buffer,
                line: pointer,
            });
        }
        events
    }

    fn apply_nicklist_diff(&mut self, message: &Message) -> ClientResult<Vec<RelayEvent>> {
        let hdatas = expect_all_hdata(message)?;
        let mut touched: Vec<Pointer> = Vec::new();

        for hdata in filter_record(&hdatas, RECORD_NICK) {
            let mut group: Option<String> = None;
            for row in hdata.rows() {
                let pointer = row.root_pointer();
                let Some(i) = self.buffer_index(pointer) else {
                    continue;
                };
                let diff = row.char_field("_diff").unwrap_or(0) as u8;
                let nick = make_nick(&row, &group);
                let buffer = &mut self.buffers[i];
                match diff {
                    b'^' => {
                        group = Some(nick.name);
                        continue;
                    }
                    b'+' => buffer.nicks.push(nick),
                    b'-' => {
                        if let Some(at) = find_nick(buffer, &row, &nick) {
                            buffer.nicks.remove(at);
                        }
                    }
                    b'*' => {
                        if let Some(at) = find_nick(buffer, &row, &nick) {
                            let parent = buffer.nicks[at].parent_group.clone();
                            buffer.nicks[at] = Nick {
                                parent_group: nick.parent_group.clone().or(parent),
                                ..nick
                            };
                        }
                    }
                    other => {
                        debug!(diff = other, "unknown nicklist diff op");
                        continue;
                    }
                }
                if !touched.contains(&pointer) {
                    touched.push(pointer);
                }
            }
        }
        Ok(touched.into_iter().map(RelayEvent::NickChanged).collect())
    }

    // -- internals ---------------------------------------------------------

    /// Upsert one buffer row: first sight of a pointer creates, later
    /// sightings are full-field updates (no duplicates).
    fn upsert_buffer(&mut self, row: &HdataRowRef<'_>) -> RelayEvent {
        let pointer = row.own_pointer();
        match self.buffer_index(pointer) {
            Some(i) => {
                update_buffer_fields(&mut self.buffers[i], row);
                RelayEvent::BufferUpdated(pointer)
            }
            None => {
                let mut buffer = Buffer::new(pointer);
                update_buffer_fields(&mut buffer, row);
                let at = self.insert_index(row.pointer_field("next_buffer"));
                self.buffers.insert(at, buffer);
                RelayEvent::BufferAdded(pointer)
            }
        }
    }

    fn buffer_index(&self, pointer: Pointer) -> Option<usize> {
        self.buffers.iter().position(|b| b.pointer == pointer)
    }

    /// Insert position from a `next_buffer` pointer: before that buffer,
    /// or at the end when it is null, unknown or absent.
    fn insert_index(&self, next_buffer: Option<Pointer>) -> usize {
        match next_buffer {
            Some(p) if !p.is_null() => self.buffer_index(p).unwrap_or(self.buffers.len()),
            _ => self.buffers.len(),
        }
    }
}

/// Responses must only contain hdata objects; anything else is a fatal
/// structural mismatch. Validated before any mutation so a rejected
/// message leaves the mirror untouched.
fn expect_all_hdata(message: &Message) -> ClientResult<Vec<&Hdata>> {
    message
        .objects()
        .iter()
        .map(|object| {
            object.expect_hdata().map_err(|source| ClientError::Apply {
                record: message.id().unwrap_or("(push)").to_string(),
                source,
            })
        })
        .collect()
}

fn filter_record<'a>(hdatas: &[&'a Hdata], record: &'static str) -> Vec<&'a Hdata> {
    hdatas.iter().copied().filter(|h| h.name() == record).collect()
}

fn update_buffer_fields(buffer: &mut Buffer, row: &HdataRowRef<'_>) {
    if let Some(number) = row.int_field("number") {
        buffer.number = number;
    }
    if let Some(name) = row.str_field("full_name") {
        buffer.full_name = name.to_string();
    }
    if row.get("short_name").is_some() {
        buffer.short_name = row.str_field("short_name").map(str::to_string);
    }
    if row.get("title").is_some() {
        buffer.title = row.str_field("title").map(str::to_string);
    }
    if let Some(t) = row.int_field("type") {
        buffer.buffer_type = t;
    }
    if let Some(n) = row.int_field("nicklist") {
        buffer.has_nicklist = n != 0;
    }
    if let Some(vars) = row.hashtable_field("local_variables") {
        buffer.local_variables = vars.to_string_map();
    }
}

/// The buffer a line row belongs to: the path root for deep paths
/// (`buffer/own_lines/line/line_data`), else the row's `buffer` field
/// (incremental pushes), else the request target.
fn line_owner(row: &HdataRowRef<'_>, hdata: &Hdata, target: Option<Pointer>) -> Pointer {
    if hdata.path().len() > 1 {
        return row.root_pointer();
    }
    row.pointer_field("buffer")
        .or(target)
        .unwrap_or(Pointer::NULL)
}

fn make_line(row: &HdataRowRef<'_>, buffer: Pointer) -> Line {
    Line {
        pointer: row.own_pointer(),
        buffer,
        date: Line::date_from_epoch(row.time_field("date").unwrap_or(0)),
        displayed: row.char_field("displayed").map(|c| c != 0).unwrap_or(true),
        prefix: row.str_field("prefix").unwrap_or("").to_string(),
        message: row.str_field("message").unwrap_or("").to_string(),
        tags: row.str_array_field("tags_array").unwrap_or_default(),
    }
}

fn make_nick(row: &HdataRowRef<'_>, group: &Option<String>) -> Nick {
    let is_group = row.char_field("group").unwrap_or(0) != 0;
    Nick {
        pointer: row.own_pointer(),
        group: is_group,
        visible: row.char_field("visible").map(|c| c != 0).unwrap_or(true),
        prefix: row.str_field("prefix").unwrap_or("").to_string(),
        name: row.str_field("name").unwrap_or("").to_string(),
        parent_group: if is_group { None } else { group.clone() },
    }
}

/// Locate a diffed nick: by pointer first, by name (within the same kind)
/// as a fallback for servers that reallocate nicklist items.
fn find_nick(buffer: &Buffer, row: &HdataRowRef<'_>, nick: &Nick) -> Option<usize> {
    let pointer = row.own_pointer();
    buffer
        .nicks
        .iter()
        .position(|n| n.pointer == pointer)
        .or_else(|| {
            buffer
                .nicks
                .iter()
                .position(|n| n.group == nick.group && n.name == nick.name)
        })
}

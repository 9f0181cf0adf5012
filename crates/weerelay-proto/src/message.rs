//! An owned, decoded relay message.

use crate::object::{Hdata, Object};

/// One decoded protocol frame: an optional correlation id and the decoded
/// objects, in wire order.
///
/// The id is the tag the client chose when issuing the request, echoed by
/// the server. Event pushes carry server-chosen ids (`_buffer_opened`,
/// `_nicklist_diff`, ...); frames with no id at all are also pushes.
/// Messages are immutable snapshots of one frame - they are consumed by
/// the session layer and discarded.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    id: Option<String>,
    objects: Vec<Object>,
}

impl Message {
    /// Build a message from its decoded parts. An empty id collapses to
    /// `None` (both spellings mean "no correlation id" on the wire).
    #[must_use]
    pub fn new(id: Option<String>, objects: Vec<Object>) -> Message {
        Message {
            id: id.filter(|s| !s.is_empty()),
            objects,
        }
    }

    /// The correlation id, if any.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The decoded objects, in wire order.
    #[must_use]
    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    /// Iterate over the hdata objects in this message.
    pub fn hdata_objects(&self) -> impl Iterator<Item = &Hdata> {
        self.objects.iter().filter_map(|obj| match obj {
            Object::Hdata(h) => Some(h),
            _ => None,
        })
    }

    /// The first hdata object, if any.
    #[must_use]
    pub fn first_hdata(&self) -> Option<&Hdata> {
        self.hdata_objects().next()
    }
}

//! The ordered ingestion queue.
//!
//! Entries wait here until their asynchronous prerequisites resolve. The
//! queue drains strictly from the head: an entry at any other position is
//! never rendered out of turn, no matter when its own prerequisites finish.
//! Head-of-line blocking is the point — it is what preserves causal order.

use std::collections::VecDeque;
use std::path::PathBuf;

use crate::Pipeline;
use crate::types::{Message, MessageKind, PeerId, RenderedMessage, Roster};

// ─── Entry ────────────────────────────────────────────────────────────────────

/// Identifies one queued entry. Pipeline-local and monotone; never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryId(pub(crate) u64);

/// Results attached by completed side-loads.
///
/// Named slots (rather than one opaque payload) so a media download and a
/// roster fetch for the same entry cannot clobber each other.
#[derive(Debug, Default)]
pub(crate) struct SideloadSlots {
    pub(crate) media_path: Option<PathBuf>,
    pub(crate) roster:     Option<Roster>,
}

/// One pending inbound message awaiting zero or more prerequisites.
#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) id:      EntryId,
    pub(crate) message: Message,
    /// Outstanding asynchronous prerequisites. The entry may render only
    /// once this reaches zero *and* it occupies the queue head.
    pub(crate) pending: usize,
    pub(crate) slots:   SideloadSlots,
    /// First prerequisite failure, if any. Rendering substitutes this for
    /// the content; it does not block the queue.
    pub(crate) failure: Option<String>,
}

// ─── IngestQueue ──────────────────────────────────────────────────────────────

/// Ordered sequence of pending entries. Insertion order is significant.
#[derive(Default)]
pub(crate) struct IngestQueue {
    entries: VecDeque<Entry>,
    next_id: u64,
}

impl IngestQueue {
    /// Append at the tail, or — when `before` names an entry still present —
    /// splice immediately before it. A vanished anchor falls back to the
    /// tail, matching a backfill racing the live drain.
    pub(crate) fn insert(
        &mut self,
        message: Message,
        pending: usize,
        before:  Option<EntryId>,
    ) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        let entry = Entry {
            id,
            message,
            pending,
            slots: SideloadSlots::default(),
            failure: None,
        };
        let at = before.and_then(|b| self.entries.iter().position(|e| e.id == b));
        match at {
            Some(pos) => self.entries.insert(pos, entry),
            None      => self.entries.push_back(entry),
        }
        id
    }

    pub(crate) fn get_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Pop the head if it has no outstanding prerequisites.
    pub(crate) fn pop_ready(&mut self) -> Option<Entry> {
        if self.entries.front()?.pending == 0 {
            self.entries.pop_front()
        } else {
            None
        }
    }

    pub(crate) fn len(&self) -> usize { self.entries.len() }

    pub(crate) fn clear(&mut self) { self.entries.clear(); }
}

// ─── Draining ─────────────────────────────────────────────────────────────────

impl Pipeline {
    /// Render every consecutively ready entry at the head of the queue.
    ///
    /// Runs after each prerequisite completion and after each direct enqueue
    /// of an entry with zero prerequisites. Stops at the first entry still
    /// waiting on something.
    pub(crate) fn drain_ready_locked(&self, queue: &mut IngestQueue) {
        while let Some(entry) = queue.pop_ready() {
            let rendered = self.render(entry);
            self.inner.host.display(rendered);
        }
    }

    fn render(&self, entry: Entry) -> RenderedMessage {
        let Entry { message, slots, failure, .. } = entry;

        let sender_name = message.sender.and_then(|uid| {
            slots.roster.as_ref()
                .and_then(|r| r.member_name(uid))
                .map(str::to_owned)
                .or_else(|| self.inner.host.peer_name(&PeerId::User(uid)))
        });

        let text = match &message.kind {
            MessageKind::Text(t)    => t.clone(),
            MessageKind::Service(t) => t.clone(),
            MessageKind::Photo { caption, .. } => caption.clone(),
            MessageKind::Document { caption, file_name, .. } => {
                if caption.is_empty() { file_name.clone() } else { caption.clone() }
            }
        };

        RenderedMessage {
            peer:       message.peer,
            sender:     message.sender,
            sender_name,
            date:       message.date,
            text,
            attachment: slots.media_path,
            failure,
            outgoing:   message.outgoing,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

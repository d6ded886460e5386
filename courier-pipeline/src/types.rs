//! Core data model shared by the ingestion and outbound halves.
//!
//! Everything here is deliberately protocol-agnostic: the wire-level client
//! owns the real TL objects and hands the pipeline these flattened views.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

// ─── PeerId ───────────────────────────────────────────────────────────────────

/// Identifies a conversation partner.
///
/// The variant decides which pipeline machinery applies:
/// * [`PeerId::User`] and [`PeerId::Secret`] — delivery order is guaranteed by
///   the protocol; no cursor, no backfill.
/// * [`PeerId::Group`] — classic group chat; the roster is fetched once via
///   full-chat info before the first message renders.
/// * [`PeerId::Channel`] — broadcast/supergroup-style peer; server-assigned
///   sequence ids are tracked by a cursor and gaps are backfilled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PeerId {
    /// One-to-one chat with a user.
    User(i64),
    /// Classic (non-super) group chat.
    Group(i64),
    /// Channel or supergroup.
    Channel(i64),
    /// End-to-end encrypted chat. The transport does not understand host
    /// markup, so outbound text is un-escaped to plain before sending.
    Secret(i64),
}

impl PeerId {
    /// `true` for peers whose delivery order must be enforced with a cursor.
    pub fn is_channel_like(&self) -> bool {
        matches!(self, Self::Channel(_))
    }

    /// The raw numeric id, without the variant tag.
    pub fn raw_id(&self) -> i64 {
        match self {
            Self::User(id) | Self::Group(id) | Self::Channel(id) | Self::Secret(id) => *id,
        }
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id)    => write!(f, "user{id}"),
            Self::Group(id)   => write!(f, "group{id}"),
            Self::Channel(id) => write!(f, "channel{id}"),
            Self::Secret(id)  => write!(f, "secret{id}"),
        }
    }
}

// ─── MediaRef ─────────────────────────────────────────────────────────────────

/// Opaque reference to a downloadable media object.
///
/// Only the network client can interpret the token; the pipeline just carries
/// it from the message event to [`crate::NetworkClient::download_media`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MediaRef(pub String);

impl MediaRef {
    pub fn token(&self) -> &str { &self.0 }
}

// ─── Message ──────────────────────────────────────────────────────────────────

/// What the message event carries besides routing information.
#[derive(Clone, Debug)]
pub enum MessageKind {
    /// Plain text.
    Text(String),
    /// A photo; rendered from a locally downloaded file.
    Photo { media: MediaRef, caption: String },
    /// A document. Stickers and inline images are rendered from a local
    /// download like photos; other documents are announced by name only.
    Document {
        media:        MediaRef,
        file_name:    String,
        sticker:      bool,
        inline_image: bool,
        caption:      String,
    },
    /// A service event (user joined, title changed, …), pre-formatted.
    Service(String),
}

impl MessageKind {
    /// The media that must be downloaded before this message can render,
    /// if any.
    pub fn sideload_media(&self) -> Option<&MediaRef> {
        match self {
            Self::Photo { media, .. } => Some(media),
            Self::Document { media, sticker, inline_image, .. }
                if *sticker || *inline_image => Some(media),
            _ => None,
        }
    }
}

/// One inbound message event, as delivered by the network client.
#[derive(Clone, Debug)]
pub struct Message {
    /// Server-assigned message id. Monotone per channel-like peer.
    pub id:       i64,
    /// The conversation this message belongs to.
    pub peer:     PeerId,
    /// The sending user, if known (channel posts have none).
    pub sender:   Option<i64>,
    /// Server timestamp.
    pub date:     DateTime<Utc>,
    /// Payload.
    pub kind:     MessageKind,
    /// `true` if sent by the local account.
    pub outgoing: bool,
}

impl Message {
    /// Plain text message, dated now.
    pub fn text(id: i64, peer: PeerId, sender: Option<i64>, text: impl Into<String>) -> Self {
        Self {
            id,
            peer,
            sender,
            date: Utc::now(),
            kind: MessageKind::Text(text.into()),
            outgoing: false,
        }
    }

    /// Photo message, dated now.
    pub fn photo(id: i64, peer: PeerId, sender: Option<i64>, media: MediaRef) -> Self {
        Self {
            id,
            peer,
            sender,
            date: Utc::now(),
            kind: MessageKind::Photo { media, caption: String::new() },
            outgoing: false,
        }
    }

    /// Override the timestamp (builder style).
    pub fn at(mut self, date: DateTime<Utc>) -> Self {
        self.date = date; self
    }

    /// The caption or body text, if there is one.
    pub fn text_content(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Text(t) => Some(t),
            MessageKind::Photo { caption, .. } | MessageKind::Document { caption, .. } => {
                if caption.is_empty() { None } else { Some(caption) }
            }
            MessageKind::Service(t) => Some(t),
        }
    }
}

// ─── Roster ───────────────────────────────────────────────────────────────────

/// One member of a group or channel roster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RosterMember {
    pub user_id: i64,
    pub name:    String,
    pub admin:   bool,
}

/// Cached membership of a group or channel, populated once per peer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Roster {
    pub members: Vec<RosterMember>,
}

impl Roster {
    pub fn is_empty(&self) -> bool { self.members.is_empty() }

    pub fn len(&self) -> usize { self.members.len() }

    /// Display name of a member, if present.
    pub fn member_name(&self, user_id: i64) -> Option<&str> {
        self.members.iter()
            .find(|m| m.user_id == user_id)
            .map(|m| m.name.as_str())
    }

    /// Roster containing only the local user. Installed when a membership
    /// fetch comes back empty so rendering never sees an empty roster.
    pub fn only(user_id: i64, name: impl Into<String>) -> Self {
        Self {
            members: vec![RosterMember { user_id, name: name.into(), admin: false }],
        }
    }
}

// ─── RenderedMessage ──────────────────────────────────────────────────────────

/// A fully resolved entry, handed to [`crate::ChatHost::display`] exactly once,
/// in final queue order.
#[derive(Clone, Debug)]
pub struct RenderedMessage {
    pub peer:        PeerId,
    pub sender:      Option<i64>,
    /// Resolved display name of the sender (roster first, then the host's
    /// own peer-name lookup).
    pub sender_name: Option<String>,
    pub date:        DateTime<Utc>,
    /// Body text (caption for media messages; may be empty).
    pub text:        String,
    /// Locally downloaded media, when a side-load attached one.
    pub attachment:  Option<PathBuf>,
    /// Set when a prerequisite failed; the host should show this placeholder
    /// instead of the content.
    pub failure:     Option<String>,
    pub outgoing:    bool,
}

//! The chat-host collaborator seam.
//!
//! The host owns conversation windows, the buddy list, and peer naming; the
//! pipeline only pushes finished entries at it and asks it for display names.

use crate::types::{PeerId, RenderedMessage};

/// Receives the final, causally ordered message stream.
pub trait ChatHost: Send + Sync {
    /// Called exactly once per entry, in final queue order. The entry either
    /// carries resolved content or a failure placeholder — never both absent.
    fn display(&self, message: RenderedMessage);

    /// Surface a local system-style message in the conversation with `peer`
    /// (used for outbound send failures).
    fn system_message(&self, peer: &PeerId, text: &str);

    /// Resolve a display name for a peer, if the host knows one.
    fn peer_name(&self, peer: &PeerId) -> Option<String>;
}

//! The network-client collaborator seam.
//!
//! The pipeline never opens a socket: every wire interaction goes through
//! [`NetworkClient`], an async black box that resolves media, history, and
//! rosters, and performs outbound sends. Implementations wrap a real MTProto
//! client; tests substitute fakes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::errors::NetworkError;
use crate::types::{MediaRef, Message, PeerId, Roster};

/// Asynchronous RPC source and sink.
///
/// All methods return an explicit `Result`; the pipeline treats every error
/// as recoverable at entry or peer granularity and never retries at this
/// seam itself (retry policy, where it applies, lives in the pipeline).
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Download a media object to a local file and return its path.
    async fn download_media(&self, media: &MediaRef) -> Result<PathBuf, NetworkError>;

    /// Fetch the full-chat info (roster) of a classic group.
    async fn fetch_full_chat(&self, chat_id: i64) -> Result<Roster, NetworkError>;

    /// Fetch channel history with server ids strictly greater than `from_id`,
    /// up to `limit` messages, in ascending id order.
    async fn fetch_history(
        &self,
        channel_id: i64,
        from_id:    i64,
        limit:      usize,
    ) -> Result<Vec<Message>, NetworkError>;

    /// Fetch the membership and admin list of a channel or supergroup.
    ///
    /// Broadcast channels without visible membership should return an empty
    /// roster; the pipeline substitutes a synthetic one.
    async fn fetch_participants(&self, channel_id: i64) -> Result<Roster, NetworkError>;

    /// Send one chunk of text to a peer.
    async fn send_text(&self, destination: &PeerId, text: &str) -> Result<(), NetworkError>;

    /// Upload and send a local file as a document.
    async fn send_document(
        &self,
        destination: &PeerId,
        path:        &Path,
        mime_type:   &str,
    ) -> Result<(), NetworkError>;
}

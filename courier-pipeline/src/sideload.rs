//! Prerequisite planning for freshly arrived messages.
//!
//! [`Pipeline::on_message`] is the sole ingestion entry point. It decides,
//! per message, which asynchronous side-loads must finish before the entry
//! may render — a media download, a one-shot group roster fetch, or the
//! peer's channel load — counts them into the entry's pending total *before*
//! issuing any call, and enqueues the entry. Completions decrement the count
//! and re-check the queue head.

use tracing::{debug, warn};

use crate::Pipeline;
use crate::backfill::LoadState;
use crate::ingest::EntryId;
use crate::types::{MediaRef, Message, PeerId};

/// How an arriving message relates to its peer's one-time load.
enum Gate {
    /// Peer fully loaded (or not gated at all) — nothing to wait for.
    None,
    /// A load is already in flight; join its waiter list.
    Join,
    /// First trigger: start the channel history + membership load.
    StartChannel { from_id: i64 },
    /// First trigger: start the classic-group roster fetch.
    StartGroup,
}

impl Gate {
    fn waits(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl Pipeline {
    /// Ingest one message event from the network client.
    ///
    /// `before` is set only by backfill routing, to place a
    /// chronologically-earlier message ahead of an already-queued later one.
    ///
    /// Returns the queued entry id, or `None` when the message was discarded
    /// as a duplicate (or the pipeline is shutting down).
    pub async fn on_message(&self, message: Message, before: Option<EntryId>) -> Option<EntryId> {
        if self.inner.stop.is_cancelled() {
            return None;
        }

        let peer = message.peer;
        let mut cursors = self.inner.cursors.lock().await;

        let gate = match peer {
            PeerId::Channel(_) => {
                let cursor = self.cursor_entry(&mut cursors, peer);
                if cursor.is_duplicate(message.id) {
                    debug!("[courier] {peer}: duplicate id {} discarded", message.id);
                    return None;
                }
                if cursor.accept(message.id) {
                    let watermark = cursor.last_server_id;
                    self.persist_cursor(peer, watermark);
                }
                match cursor.state {
                    LoadState::Loaded  => Gate::None,
                    LoadState::Loading => Gate::Join,
                    LoadState::Unloaded => {
                        cursor.state = LoadState::Loading;
                        Gate::StartChannel { from_id: cursor.last_server_id }
                    }
                }
            }
            PeerId::Group(_) => {
                let cursor = self.cursor_entry(&mut cursors, peer);
                match cursor.state {
                    LoadState::Loaded  => Gate::None,
                    LoadState::Loading => Gate::Join,
                    LoadState::Unloaded => {
                        cursor.state = LoadState::Loading;
                        Gate::StartGroup
                    }
                }
            }
            // Direct and secret chats: the protocol already guarantees order.
            PeerId::User(_) | PeerId::Secret(_) => Gate::None,
        };

        let media = message.kind.sideload_media().cloned();
        let pending = usize::from(media.is_some()) + usize::from(gate.waits());

        let mut queue = self.inner.queue.lock().await;
        let entry_id = queue.insert(message, pending, before);
        if gate.waits() {
            // Still under the cursors lock, so the in-flight load cannot
            // complete between planning and registration.
            if let Some(cursor) = cursors.get_mut(&peer) {
                cursor.waiters.push(entry_id);
            }
        }
        if pending == 0 {
            self.drain_ready_locked(&mut queue);
        }
        drop(queue);
        drop(cursors);

        if let Some(media) = media {
            let pipeline = self.clone();
            tokio::spawn(async move {
                pipeline.run_media_download(entry_id, media).await;
            });
        }
        match gate {
            Gate::StartChannel { from_id } => {
                let pipeline = self.clone();
                tokio::spawn(async move {
                    pipeline.run_channel_load(peer, Some(entry_id), from_id).await;
                });
            }
            Gate::StartGroup => {
                let pipeline = self.clone();
                tokio::spawn(async move {
                    pipeline.run_group_load(peer).await;
                });
            }
            Gate::None | Gate::Join => {}
        }

        Some(entry_id)
    }

    /// Download task for one entry's media prerequisite.
    pub(crate) async fn run_media_download(self, entry_id: EntryId, media: MediaRef) {
        let result = self.inner.network.download_media(&media).await;
        if self.inner.stop.is_cancelled() {
            return;
        }

        let mut queue = self.inner.queue.lock().await;
        if let Some(entry) = queue.get_mut(entry_id) {
            match result {
                Ok(path) => entry.slots.media_path = Some(path),
                Err(e) => {
                    warn!("[courier] media download for entry {entry_id:?} failed: {e}");
                    // Only the first failure is kept.
                    if entry.failure.is_none() {
                        entry.failure = Some(format!("media unavailable: {e}"));
                    }
                }
            }
            entry.pending = entry.pending.saturating_sub(1);
        }
        self.drain_ready_locked(&mut queue);
    }
}

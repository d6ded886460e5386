//! Channel cursor tracking, gap-range backfill, and fetch coalescing.
//!
//! Channel-like peers carry a server-assigned sequence id per message, but
//! delivery over the session is not gap-free: a reconnect or a cold start
//! leaves a range between the persisted watermark and "now". This module
//! tracks the watermark per peer, fetches the missing range (plus the
//! membership list) on first contact, and coalesces concurrent triggers into
//! a single in-flight load with a waiter list.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::Pipeline;
use crate::errors::NetworkError;
use crate::ingest::EntryId;
use crate::retry::RetryContext;
use crate::types::{Message, PeerId, Roster};

// ─── ChannelCursor ────────────────────────────────────────────────────────────

/// Load progress of a peer's one-time history/roster fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

/// Per-peer ingestion state. One exists for every channel-like peer and for
/// every classic group (which reuses the state/waiter gate for its roster
/// fetch but never tracks a watermark).
#[derive(Debug)]
pub(crate) struct ChannelCursor {
    /// Newest contiguously-confirmed server id. Only ever increases.
    pub(crate) last_server_id: i64,
    pub(crate) state:          LoadState,
    /// Entries whose `pending` count includes this peer's in-flight load.
    pub(crate) waiters:        Vec<EntryId>,
    /// Cached roster, populated once per peer.
    pub(crate) roster:         Option<Roster>,
    /// Accepted ids above the watermark. Keeps deduplication exact while a
    /// gap is open (e.g. a live message racing its own backfilled copy).
    recent_ids: HashSet<i64>,
}

impl ChannelCursor {
    pub(crate) fn new(watermark: i64) -> Self {
        Self {
            last_server_id: watermark,
            state:          LoadState::Unloaded,
            waiters:        Vec::new(),
            roster:         None,
            recent_ids:     HashSet::new(),
        }
    }

    /// A message with this server id has already been processed.
    pub(crate) fn is_duplicate(&self, id: i64) -> bool {
        id <= self.last_server_id || self.recent_ids.contains(&id)
    }

    /// Record a freshly accepted id. Advances the watermark when the id is
    /// exactly the next in sequence (folding in any contiguous ids that
    /// arrived early); otherwise remembers it without advancing — gaps are
    /// not repaired here.
    ///
    /// Returns `true` when the watermark advanced.
    pub(crate) fn accept(&mut self, id: i64) -> bool {
        if id == self.last_server_id + 1 {
            self.last_server_id = id;
            while self.recent_ids.remove(&(self.last_server_id + 1)) {
                self.last_server_id += 1;
            }
            self.recent_ids.retain(|&r| r > self.last_server_id);
            true
        } else {
            self.recent_ids.insert(id);
            false
        }
    }

    /// A completed ranged fetch confirms everything up to `id`.
    ///
    /// Returns `true` when the watermark advanced.
    pub(crate) fn confirm_through(&mut self, id: i64) -> bool {
        if id > self.last_server_id {
            self.last_server_id = id;
            self.recent_ids.retain(|&r| r > id);
            true
        } else {
            false
        }
    }
}

// ─── Pipeline methods ─────────────────────────────────────────────────────────

impl Pipeline {
    /// The cursor for `peer`, creating it on first touch. Channel-like peers
    /// start from their persisted watermark.
    pub(crate) fn cursor_entry<'m>(
        &self,
        cursors: &'m mut HashMap<PeerId, ChannelCursor>,
        peer:    PeerId,
    ) -> &'m mut ChannelCursor {
        cursors.entry(peer).or_insert_with(|| {
            let watermark = if peer.is_channel_like() {
                match self.inner.config.cursor_store.load(&peer) {
                    Ok(v)  => v.unwrap_or(0),
                    Err(e) => {
                        warn!("[courier] cursor load for {peer} failed: {e}");
                        0
                    }
                }
            } else {
                0
            };
            ChannelCursor::new(watermark)
        })
    }

    /// Write the watermark through to the configured store. Store failures
    /// are absorbed — the in-memory cursor stays authoritative for this
    /// session.
    pub(crate) fn persist_cursor(&self, peer: PeerId, watermark: i64) {
        if let Err(e) = self.inner.config.cursor_store.store(&peer, watermark) {
            warn!("[courier] cursor persist for {peer} failed: {e}");
        }
    }

    /// History plus chained membership fetch — the "channel state" a peer
    /// needs before its messages may render.
    async fn fetch_channel_state(
        &self,
        channel_id: i64,
        from_id:    i64,
    ) -> Result<(Vec<Message>, Roster), NetworkError> {
        let history = self.inner.network
            .fetch_history(channel_id, from_id, self.inner.config.history_limit)
            .await?;
        let roster = self.inner.network.fetch_participants(channel_id).await?;
        Ok((history, roster))
    }

    /// Explicit-join trigger: start the peer's one-time load before any
    /// message arrives (e.g. the user just joined the channel). A no-op for
    /// peers that are already loading or loaded, and for direct chats.
    pub async fn prime_peer(&self, peer: PeerId) {
        if self.inner.stop.is_cancelled() {
            return;
        }
        if !matches!(peer, PeerId::Channel(_) | PeerId::Group(_)) {
            return;
        }

        let start = {
            let mut cursors = self.inner.cursors.lock().await;
            let cursor = self.cursor_entry(&mut cursors, peer);
            if cursor.state != LoadState::Unloaded {
                None
            } else {
                cursor.state = LoadState::Loading;
                Some(cursor.last_server_id)
            }
        };

        if let Some(from_id) = start {
            let pipeline = self.clone();
            match peer {
                PeerId::Channel(_) => {
                    tokio::spawn(async move {
                        pipeline.run_channel_load(peer, None, from_id).await;
                    });
                }
                _ => {
                    tokio::spawn(async move {
                        pipeline.run_group_load(peer).await;
                    });
                }
            }
        }
    }

    /// One-time load of a channel-like peer: ranged history from the
    /// watermark to now, then the membership list. Runs as its own task;
    /// concurrent triggers joined the waiter list instead of getting here.
    ///
    /// `anchor` is the entry that triggered the load, if a message did;
    /// backfilled history is spliced ahead of it.
    // Returns a boxed future rather than being a bare `async fn`: this method
    // is spawned from `on_message` (via `sideload`), and its body re-enters
    // `on_message`, forming a mutual-recursion `Send` auto-trait cycle between
    // the two opaque `async fn` return types that the compiler cannot resolve.
    // Declaring an explicit `Pin<Box<dyn Future + Send>>` return type removes
    // the opaque type from one side of the cycle and breaks it. Behaviourally
    // identical to the `async fn` form — it just heap-allocates the future.
    pub(crate) fn run_channel_load(
        self,
        peer:    PeerId,
        anchor:  Option<EntryId>,
        from_id: i64,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
        let channel_id = peer.raw_id();
        info!("[courier] loading {peer} (history > {from_id}, then membership)");

        let mut fail_count = 0u32;
        let mut slept = Duration::ZERO;
        let outcome = loop {
            if self.inner.stop.is_cancelled() {
                return;
            }
            match self.fetch_channel_state(channel_id, from_id).await {
                Ok(state) => break Ok(state),
                Err(error) => {
                    fail_count += 1;
                    let ctx = RetryContext {
                        fail_count: NonZeroU32::new(fail_count).expect("just incremented"),
                        slept_so_far: slept,
                        error,
                    };
                    match self.inner.config.retry_policy.should_retry(&ctx) {
                        ControlFlow::Continue(delay) => {
                            sleep(delay).await;
                            slept += delay;
                        }
                        ControlFlow::Break(()) => break Err(ctx.error),
                    }
                }
            }
        };

        match outcome {
            Ok((history, roster)) => {
                let confirm_to = history.iter().map(|m| m.id).max();
                debug!("[courier] {peer}: {} backfilled message(s), roster of {}",
                    history.len(), roster.len());
                // Route the fetched range back through the queue, ahead of
                // whatever arrived live while the fetch was in flight. The
                // client contract gives ascending id order, so successive
                // splices before the anchor keep it.
                for message in history {
                    self.on_message(message, anchor).await;
                }
                self.finish_load(peer, Some(roster), confirm_to, true).await;
            }
            Err(e) => {
                warn!("[courier] backfill for {peer} failed: {e} — gap remains unresolved");
                self.finish_load(peer, None, None, false).await;
            }
        }
        })
    }

    /// One-time full-chat roster fetch for a classic group.
    pub(crate) async fn run_group_load(self, peer: PeerId) {
        match self.inner.network.fetch_full_chat(peer.raw_id()).await {
            Ok(roster) => self.finish_load(peer, Some(roster), None, true).await,
            Err(e) => {
                warn!("[courier] full-chat fetch for {peer} failed: {e}");
                self.finish_load(peer, None, None, false).await;
            }
        }
    }

    /// `loading → loaded` transition: install the roster (synthesising a
    /// single-member one when the fetch came back empty), confirm the fetched
    /// range, then release every coalesced waiter with the final outcome.
    async fn finish_load(
        &self,
        peer:       PeerId,
        roster:     Option<Roster>,
        confirm_to: Option<i64>,
        ok:         bool,
    ) {
        if self.inner.stop.is_cancelled() {
            return;
        }

        let (waiters, roster) = {
            let mut cursors = self.inner.cursors.lock().await;
            let Some(cursor) = cursors.get_mut(&peer) else { return };

            cursor.state = LoadState::Loaded;
            if let Some(max_id) = confirm_to {
                if cursor.confirm_through(max_id) {
                    self.persist_cursor(peer, cursor.last_server_id);
                }
            }
            if let Some(fetched) = roster {
                let local = &self.inner.config.local_user;
                cursor.roster = Some(if fetched.is_empty() {
                    debug!("[courier] {peer}: empty roster — installing local user only");
                    Roster::only(local.id, local.name.clone())
                } else {
                    fetched
                });
            }
            (std::mem::take(&mut cursor.waiters), cursor.roster.clone())
        };

        if !ok {
            // Reported once to all coalesced waiters; their entries still
            // render their own content.
            debug!("[courier] {peer}: releasing {} waiter(s) after failed load", waiters.len());
        }

        let mut queue = self.inner.queue.lock().await;
        for id in waiters {
            if let Some(entry) = queue.get_mut(id) {
                if let Some(r) = &roster {
                    entry.slots.roster = Some(r.clone());
                }
                entry.pending = entry.pending.saturating_sub(1);
            }
        }
        self.drain_ready_locked(&mut queue);
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_at_or_below_watermark() {
        let cur = ChannelCursor::new(10);
        assert!(cur.is_duplicate(10));
        assert!(cur.is_duplicate(3));
        assert!(!cur.is_duplicate(11));
    }

    #[test]
    fn accept_next_advances_watermark() {
        let mut cur = ChannelCursor::new(10);
        assert!(cur.accept(11));
        assert_eq!(cur.last_server_id, 11);
    }

    #[test]
    fn accept_with_gap_does_not_advance() {
        let mut cur = ChannelCursor::new(10);
        assert!(!cur.accept(13));
        assert_eq!(cur.last_server_id, 10);
        // ... but the id is remembered, so a second delivery is a duplicate.
        assert!(cur.is_duplicate(13));
    }

    #[test]
    fn contiguous_early_arrivals_fold_into_watermark() {
        let mut cur = ChannelCursor::new(10);
        cur.accept(12);
        cur.accept(13);
        assert_eq!(cur.last_server_id, 10);
        assert!(cur.accept(11));
        assert_eq!(cur.last_server_id, 13);
    }

    #[test]
    fn confirm_through_is_monotone() {
        let mut cur = ChannelCursor::new(10);
        assert!(cur.confirm_through(20));
        assert!(!cur.confirm_through(15));
        assert_eq!(cur.last_server_id, 20);
    }
}

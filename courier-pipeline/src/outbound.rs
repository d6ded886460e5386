//! Outbound send scheduler.
//!
//! User-authored text is converted, chunked, and parked in a single global
//! FIFO; the next idle tick flushes the whole backlog in submission order.
//! One shared FIFO means a fast destination never overtakes a slow one —
//! acceptable, because the underlying send calls are themselves asynchronous
//! and non-blocking.

use std::collections::VecDeque;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::Pipeline;
use crate::errors::SubmitError;
use crate::markup;
use crate::types::PeerId;

// ─── OutboundState ────────────────────────────────────────────────────────────

/// One chunk of outgoing text, tagged with its destination.
#[derive(Debug)]
pub(crate) struct OutboundEntry {
    pub(crate) destination: PeerId,
    pub(crate) chunk:       String,
}

#[derive(Default)]
pub(crate) struct OutboundState {
    pub(crate) fifo:            VecDeque<OutboundEntry>,
    pub(crate) flush_scheduled: bool,
}

// ─── Pipeline methods ─────────────────────────────────────────────────────────

impl Pipeline {
    /// Queue user-authored text for sending.
    ///
    /// Inline `<img src="…">` references are uploaded separately as
    /// documents (fire-and-forget, not ordered against the text). The text
    /// is converted to host markup, rejected outright when longer than
    /// `max_chunk_size × max_chunk_count` code points, split into ordered
    /// chunks, and appended to the global FIFO. A flush is scheduled for the
    /// next idle tick unless one is already pending.
    ///
    /// Returns the number of chunks queued.
    pub async fn submit(&self, raw_text: &str, destination: PeerId) -> Result<usize, SubmitError> {
        let (text, images) = markup::extract_inline_images(raw_text);
        for path in images {
            let pipeline = self.clone();
            tokio::spawn(async move {
                pipeline.run_inline_upload(destination, path).await;
            });
        }

        let text   = markup::convert_outgoing(&text);
        let limit  = self.inner.config.max_chunk_size * self.inner.config.max_chunk_count;
        let length = text.chars().count();
        if length > limit {
            return Err(SubmitError::Oversized { length, limit });
        }

        let chunks = markup::split_chunks(&text, self.inner.config.max_chunk_size);
        let queued = chunks.len();
        if queued == 0 {
            return Ok(0);
        }

        let mut outbound = self.inner.outbound.lock().await;
        for chunk in chunks {
            outbound.fifo.push_back(OutboundEntry { destination, chunk });
        }
        if !outbound.flush_scheduled {
            outbound.flush_scheduled = true;
            let pipeline = self.clone();
            tokio::spawn(async move {
                pipeline.run_flush().await;
            });
        }
        debug!("[courier] queued {queued} chunk(s) for {destination}");
        Ok(queued)
    }

    /// Upload one inline image as a standalone document.
    async fn run_inline_upload(self, destination: PeerId, path: PathBuf) {
        let mime = mime_guess::from_path(&path).first_or_octet_stream();
        if let Err(e) = self.inner.network
            .send_document(&destination, &path, mime.essence_str())
            .await
        {
            warn!("[courier] inline image upload to {destination} failed: {e}");
            if !self.inner.stop.is_cancelled() {
                self.inner.host.system_message(
                    &destination,
                    &format!("image upload failed: {e}"),
                );
            }
        }
    }

    /// Flush loop: drains the whole FIFO in submission order, then clears the
    /// scheduled flag. Stays active while submissions race the sends so a
    /// second flush task never interleaves with this one.
    pub(crate) async fn run_flush(self) {
        tokio::task::yield_now().await;
        loop {
            if self.inner.stop.is_cancelled() {
                return;
            }
            let batch: Vec<OutboundEntry> = {
                let mut outbound = self.inner.outbound.lock().await;
                if outbound.fifo.is_empty() {
                    outbound.flush_scheduled = false;
                    return;
                }
                outbound.fifo.drain(..).collect()
            };

            for entry in batch {
                if self.inner.stop.is_cancelled() {
                    return;
                }
                // Secret-chat transports carry no markup.
                let text = match entry.destination {
                    PeerId::Secret(_) => markup::unescape_for_plain(&entry.chunk),
                    _                 => entry.chunk,
                };
                if let Err(e) = self.inner.network.send_text(&entry.destination, &text).await {
                    warn!("[courier] send to {} failed: {e}", entry.destination);
                    let who = self.inner.host.peer_name(&entry.destination)
                        .unwrap_or_else(|| entry.destination.to_string());
                    self.inner.host.system_message(
                        &entry.destination,
                        &format!("message to {who} could not be delivered: {e}"),
                    );
                }
            }
        }
    }
}

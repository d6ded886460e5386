//! # courier-pipeline
//!
//! Ordered message ingestion and outbound scheduling for an MTProto-backed
//! chat bridge. The wire protocol and the chat-host UI live elsewhere; this
//! crate owns the part in between:
//!
//! - **Ingestion queue** — entries wait for their asynchronous side-loads
//!   (media download, roster fetch, channel backfill) and drain strictly
//!   from the head, so the host always sees the stream in causal order.
//! - **Channel backfill** — per-peer sequence cursors detect duplicates and
//!   gaps; first contact with a channel fetches the missing range plus the
//!   membership list, with concurrent triggers coalesced onto one fetch.
//! - **Outbound scheduler** — composed text is converted to host markup,
//!   split into bounded chunks, and flushed in submission order on the next
//!   idle tick; inline images are uploaded separately.
//!
//! Collaborators are injected through two traits: [`NetworkClient`] (async
//! RPC source/sink) and [`ChatHost`] (display + naming). Per-peer watermarks
//! persist through a [`CursorStore`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use courier_pipeline::{Config, Pipeline};
//! # use courier_pipeline::{ChatHost, NetworkClient};
//! # fn collaborators() -> (Arc<dyn NetworkClient>, Arc<dyn ChatHost>) { unimplemented!() }
//!
//! # async fn run() {
//! let (network, host) = collaborators();
//! let pipeline = Pipeline::new(Config::default(), network, host);
//!
//! // Network thread delivers message events:
//! // pipeline.on_message(message, None).await;
//!
//! // User hits enter:
//! // pipeline.submit("hello `world`", destination).await?;
//!
//! pipeline.shutdown().await;
//! # }
//! ```

#![deny(unsafe_code)]

mod backfill;
mod errors;
mod ingest;
mod outbound;
mod sideload;

pub mod host;
pub mod markup;
pub mod network;
pub mod retry;
pub mod store;
pub mod types;

pub use errors::{NetworkError, SubmitError};
pub use host::ChatHost;
pub use ingest::EntryId;
pub use network::NetworkClient;
pub use retry::{NoRetries, RetryContext, RetryOnce, RetryPolicy};
pub use store::{BinaryFileStore, CursorStore, InMemoryStore};
pub use types::{
    MediaRef, Message, MessageKind, PeerId, RenderedMessage, Roster, RosterMember,
};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use backfill::ChannelCursor;
use ingest::IngestQueue;
use outbound::OutboundState;

// ─── Config ───────────────────────────────────────────────────────────────────

/// The account this session belongs to. Used for the synthetic roster when a
/// membership fetch comes back empty.
#[derive(Clone, Debug)]
pub struct LocalUser {
    pub id:   i64,
    pub name: String,
}

/// Configuration for [`Pipeline::new`].
#[derive(Clone)]
pub struct Config {
    /// Maximum outbound chunk length, in Unicode code points.
    pub max_chunk_size:  usize,
    /// Maximum chunks per submitted message; longer text is rejected whole.
    pub max_chunk_count: usize,
    /// Maximum messages per ranged history fetch.
    pub history_limit:   usize,
    /// The local account (synthetic roster member of last resort).
    pub local_user:      LocalUser,
    /// What to do when a backfill fetch fails (default: retry once).
    pub retry_policy:    Arc<dyn RetryPolicy>,
    /// Where per-peer watermarks persist (default: in-memory only).
    pub cursor_store:    Arc<dyn CursorStore>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_chunk_size:  4096,
            max_chunk_count: 8,
            history_limit:   100,
            local_user:      LocalUser { id: 0, name: "me".into() },
            retry_policy:    Arc::new(RetryOnce::default()),
            cursor_store:    Arc::new(InMemoryStore::new()),
        }
    }
}

// ─── Pipeline ─────────────────────────────────────────────────────────────────

pub(crate) struct PipelineInner {
    pub(crate) network:  Arc<dyn NetworkClient>,
    pub(crate) host:     Arc<dyn ChatHost>,
    pub(crate) config:   Config,
    pub(crate) queue:    Mutex<IngestQueue>,
    /// Lock order: `cursors` before `queue` whenever both are held.
    pub(crate) cursors:  Mutex<HashMap<PeerId, ChannelCursor>>,
    pub(crate) outbound: Mutex<OutboundState>,
    pub(crate) stop:     CancellationToken,
}

/// The ingestion/outbound session. Cheap to clone — internally Arc-wrapped.
///
/// All state lives for the lifetime of this object; [`Pipeline::shutdown`]
/// discards everything still in flight without invoking the host or the
/// network client again.
#[derive(Clone)]
pub struct Pipeline {
    pub(crate) inner: Arc<PipelineInner>,
}

impl Pipeline {
    /// Build a session around the injected collaborators.
    pub fn new(
        config:  Config,
        network: Arc<dyn NetworkClient>,
        host:    Arc<dyn ChatHost>,
    ) -> Self {
        debug!("[courier] pipeline up (cursor store: {})", config.cursor_store.name());
        Self {
            inner: Arc::new(PipelineInner {
                network,
                host,
                config,
                queue:    Mutex::new(IngestQueue::default()),
                cursors:  Mutex::new(HashMap::new()),
                outbound: Mutex::new(OutboundState::default()),
                stop:     CancellationToken::new(),
            }),
        }
    }

    /// Number of entries still waiting in the ingestion queue.
    pub async fn pending_entries(&self) -> usize {
        self.inner.queue.lock().await.len()
    }

    /// Discard-on-shutdown teardown: everything still queued or in flight is
    /// dropped. Neither the host nor the network client is invoked for it.
    pub async fn shutdown(&self) {
        self.inner.stop.cancel();
        self.inner.queue.lock().await.clear();
        {
            let mut cursors = self.inner.cursors.lock().await;
            for cursor in cursors.values_mut() {
                cursor.waiters.clear();
            }
        }
        self.inner.outbound.lock().await.fifo.clear();
        debug!("[courier] pipeline down");
    }
}

#![allow(dead_code)] // not every test file exercises every fake

//! Fake collaborators shared by the integration tests.
//!
//! `FakeNetwork` resolves everything from in-memory tables and can hold
//! individual operations behind zero-permit semaphores, so tests control the
//! exact completion order of side-loads. `FakeHost` records everything the
//! pipeline pushes at it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use courier_pipeline::{
    ChatHost, MediaRef, Message, NetworkClient, NetworkError, PeerId, RenderedMessage, Roster,
};

// ─── FakeNetwork ──────────────────────────────────────────────────────────────

pub struct FakeNetwork {
    /// Per-media gates; a download for a gated token waits for a permit.
    pub download_gates:    Mutex<HashMap<String, Arc<Semaphore>>>,
    pub fail_downloads:    AtomicBool,
    /// channel_id → full history, ascending ids.
    pub history:           Mutex<HashMap<i64, Vec<Message>>>,
    pub history_gate:      Arc<Semaphore>,
    pub fail_history:      AtomicBool,
    pub history_calls:     AtomicUsize,
    /// channel_id → membership roster.
    pub participants:      Mutex<HashMap<i64, Roster>>,
    pub participant_calls: AtomicUsize,
    /// chat_id → classic-group roster.
    pub full_chats:        Mutex<HashMap<i64, Roster>>,
    pub full_chat_gate:    Arc<Semaphore>,
    pub full_chat_calls:   AtomicUsize,
    /// Recorded sends, in call order.
    pub sent:              Mutex<Vec<(PeerId, String)>>,
    pub docs:              Mutex<Vec<(PeerId, PathBuf, String)>>,
    /// Text sends containing this substring fail.
    pub fail_sends_containing: Mutex<Option<String>>,
}

impl Default for FakeNetwork {
    fn default() -> Self {
        Self {
            download_gates:    Mutex::new(HashMap::new()),
            fail_downloads:    AtomicBool::new(false),
            history:           Mutex::new(HashMap::new()),
            history_gate:      Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
            fail_history:      AtomicBool::new(false),
            history_calls:     AtomicUsize::new(0),
            participants:      Mutex::new(HashMap::new()),
            participant_calls: AtomicUsize::new(0),
            full_chats:        Mutex::new(HashMap::new()),
            full_chat_gate:    Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
            full_chat_calls:   AtomicUsize::new(0),
            sent:              Mutex::new(Vec::new()),
            docs:              Mutex::new(Vec::new()),
            fail_sends_containing: Mutex::new(None),
        }
    }
}

impl FakeNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hold downloads of `token` until the returned semaphore gets a permit.
    pub fn gate_download(&self, token: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.download_gates.lock().unwrap().insert(token.to_string(), gate.clone());
        gate
    }

    /// A network whose history and full-chat fetches block until their gates
    /// receive permits.
    pub fn with_closed_gates() -> Arc<Self> {
        let mut net = Self::default();
        net.history_gate   = Arc::new(Semaphore::new(0));
        net.full_chat_gate = Arc::new(Semaphore::new(0));
        Arc::new(net)
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl NetworkClient for FakeNetwork {
    async fn download_media(&self, media: &MediaRef) -> Result<PathBuf, NetworkError> {
        let gate = self.download_gates.lock().unwrap().get(media.token()).cloned();
        if let Some(gate) = gate {
            let permit = gate.acquire().await.map_err(|_| NetworkError::Dropped)?;
            permit.forget();
        }
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(NetworkError::Other("storage offline".into()));
        }
        Ok(PathBuf::from(format!("/tmp/courier-test/{}", media.token())))
    }

    async fn fetch_full_chat(&self, chat_id: i64) -> Result<Roster, NetworkError> {
        self.full_chat_calls.fetch_add(1, Ordering::SeqCst);
        let permit = self.full_chat_gate.acquire().await.map_err(|_| NetworkError::Dropped)?;
        permit.forget();
        Ok(self.full_chats.lock().unwrap().get(&chat_id).cloned().unwrap_or_default())
    }

    async fn fetch_history(
        &self,
        channel_id: i64,
        from_id:    i64,
        limit:      usize,
    ) -> Result<Vec<Message>, NetworkError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let permit = self.history_gate.acquire().await.map_err(|_| NetworkError::Dropped)?;
        permit.forget();
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(NetworkError::Rpc { code: 500, name: "HISTORY_UNAVAILABLE".into() });
        }
        let all = self.history.lock().unwrap().get(&channel_id).cloned().unwrap_or_default();
        Ok(all.into_iter().filter(|m| m.id > from_id).take(limit).collect())
    }

    async fn fetch_participants(&self, channel_id: i64) -> Result<Roster, NetworkError> {
        self.participant_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.participants.lock().unwrap().get(&channel_id).cloned().unwrap_or_default())
    }

    async fn send_text(&self, destination: &PeerId, text: &str) -> Result<(), NetworkError> {
        let fail_pattern = self.fail_sends_containing.lock().unwrap().clone();
        if fail_pattern.is_some_and(|p| text.contains(&p)) {
            return Err(NetworkError::Rpc { code: 400, name: "PEER_FLOOD".into() });
        }
        self.sent.lock().unwrap().push((*destination, text.to_string()));
        Ok(())
    }

    async fn send_document(
        &self,
        destination: &PeerId,
        path:        &Path,
        mime_type:   &str,
    ) -> Result<(), NetworkError> {
        self.docs.lock().unwrap().push((*destination, path.to_path_buf(), mime_type.to_string()));
        Ok(())
    }
}

// ─── FakeHost ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeHost {
    pub displayed: Mutex<Vec<RenderedMessage>>,
    pub system:    Mutex<Vec<(PeerId, String)>>,
    pub names:     Mutex<HashMap<PeerId, String>>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn displayed_texts(&self) -> Vec<String> {
        self.displayed.lock().unwrap().iter().map(|m| m.text.clone()).collect()
    }

    pub fn displayed_len(&self) -> usize {
        self.displayed.lock().unwrap().len()
    }
}

impl ChatHost for FakeHost {
    fn display(&self, message: RenderedMessage) {
        self.displayed.lock().unwrap().push(message);
    }

    fn system_message(&self, peer: &PeerId, text: &str) {
        self.system.lock().unwrap().push((*peer, text.to_string()));
    }

    fn peer_name(&self, peer: &PeerId) -> Option<String> {
        self.names.lock().unwrap().get(peer).cloned()
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Let spawned pipeline tasks run to quiescence.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}

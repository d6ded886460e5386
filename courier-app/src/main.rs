//! courier-app — pipeline demo against a simulated network client.
//!
//! Runs the full ingestion/outbound pipeline with canned collaborators:
//! a channel that needs backfill, a photo side-load, a group roster fetch,
//! and a batch of outbound sends. No real network is touched.
//!
//!   cargo run -p courier-app

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use tokio::time::sleep;

use courier_pipeline::{
    ChatHost, Config, LocalUser, MediaRef, Message, NetworkClient, NetworkError, PeerId,
    Pipeline, RenderedMessage, Roster, RosterMember,
};

#[tokio::main]
async fn main() {
    // Enable logging: RUST_LOG=courier_pipeline=debug cargo run -p courier-app
    if std::env::var("RUST_LOG").is_err() {
        // SAFETY: single-threaded at this point, no other threads reading env
        unsafe { std::env::set_var("RUST_LOG", "courier_pipeline=info,courier_app=info"); }
    }
    env_logger::init();

    run().await;
}

async fn run() {
    let network = Arc::new(SimulatedNetwork::new());
    let host    = Arc::new(TerminalHost::default());

    let pipeline = Pipeline::new(
        Config {
            local_user: LocalUser { id: 1, name: "you".into() },
            ..Config::default()
        },
        network.clone(),
        host.clone(),
    );

    let channel = PeerId::Channel(1000);
    let group   = PeerId::Group(2000);
    let alice   = PeerId::User(10);

    println!("── inbound ─────────────────────────────────────────────");

    // First contact with the channel: triggers a backfill of ids 1..=2,
    // which must render before this live message.
    pipeline.on_message(Message::text(3, channel, Some(10), "and that's the plan"), None).await;

    // A photo and a follow-up text from Alice. The text waits for the photo.
    pipeline.on_message(Message::photo(100, alice, Some(10), MediaRef("vacation.jpg".into())), None).await;
    pipeline.on_message(Message::text(101, alice, Some(10), "taken last week!"), None).await;

    // Group message: roster is fetched once, then names resolve.
    pipeline.on_message(Message::text(50, group, Some(11), "anyone around?"), None).await;

    sleep(Duration::from_millis(300)).await;

    println!("── outbound ────────────────────────────────────────────");

    pipeline.submit("hello! try `cargo run` yourself", alice).await.unwrap();
    pipeline.submit("psst", PeerId::Secret(3)).await.unwrap();
    match pipeline.submit(&"x".repeat(40_000), alice).await {
        Ok(_)  => println!("unexpectedly accepted"),
        Err(e) => println!("rejected as expected: {e}"),
    }

    sleep(Duration::from_millis(300)).await;

    pipeline.shutdown().await;
    println!("── done ────────────────────────────────────────────────");
}

// ─── SimulatedNetwork ─────────────────────────────────────────────────────────

/// Canned responses with small artificial latencies.
struct SimulatedNetwork {
    history:      Mutex<HashMap<i64, Vec<Message>>>,
    participants: Mutex<HashMap<i64, Roster>>,
    full_chats:   Mutex<HashMap<i64, Roster>>,
}

impl SimulatedNetwork {
    fn new() -> Self {
        let channel = PeerId::Channel(1000);
        let mut history = HashMap::new();
        history.insert(1000, vec![
            Message::text(1, channel, Some(10), "we ship thursday"),
            Message::text(2, channel, Some(11), "docs first, please"),
        ]);

        let mut participants = HashMap::new();
        participants.insert(1000, Roster {
            members: vec![
                RosterMember { user_id: 10, name: "alice".into(), admin: true },
                RosterMember { user_id: 11, name: "bob".into(),   admin: false },
            ],
        });

        let mut full_chats = HashMap::new();
        full_chats.insert(2000, Roster {
            members: vec![
                RosterMember { user_id: 11, name: "bob".into(), admin: false },
            ],
        });

        Self {
            history:      Mutex::new(history),
            participants: Mutex::new(participants),
            full_chats:   Mutex::new(full_chats),
        }
    }
}

#[async_trait]
impl NetworkClient for SimulatedNetwork {
    async fn download_media(&self, media: &MediaRef) -> Result<PathBuf, NetworkError> {
        sleep(Duration::from_millis(120)).await;
        Ok(PathBuf::from(format!("/tmp/courier-demo/{}", media.token())))
    }

    async fn fetch_full_chat(&self, chat_id: i64) -> Result<Roster, NetworkError> {
        sleep(Duration::from_millis(60)).await;
        Ok(self.full_chats.lock().unwrap().get(&chat_id).cloned().unwrap_or_default())
    }

    async fn fetch_history(
        &self,
        channel_id: i64,
        from_id:    i64,
        limit:      usize,
    ) -> Result<Vec<Message>, NetworkError> {
        sleep(Duration::from_millis(100)).await;
        let all = self.history.lock().unwrap().get(&channel_id).cloned().unwrap_or_default();
        Ok(all.into_iter().filter(|m| m.id > from_id).take(limit).collect())
    }

    async fn fetch_participants(&self, channel_id: i64) -> Result<Roster, NetworkError> {
        sleep(Duration::from_millis(40)).await;
        Ok(self.participants.lock().unwrap().get(&channel_id).cloned().unwrap_or_default())
    }

    async fn send_text(&self, destination: &PeerId, text: &str) -> Result<(), NetworkError> {
        sleep(Duration::from_millis(30)).await;
        println!("  → {destination}: {text}");
        Ok(())
    }

    async fn send_document(
        &self,
        destination: &PeerId,
        path:        &Path,
        mime_type:   &str,
    ) -> Result<(), NetworkError> {
        sleep(Duration::from_millis(80)).await;
        println!("  → {destination}: [document {} ({mime_type})]", path.display());
        Ok(())
    }
}

// ─── TerminalHost ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct TerminalHost;

impl ChatHost for TerminalHost {
    fn display(&self, message: RenderedMessage) {
        let time = message.date.with_timezone(&Local).format("%H:%M:%S");
        let who  = message.sender_name
            .or_else(|| message.sender.map(|id| format!("user{id}")))
            .unwrap_or_else(|| message.peer.to_string());

        if let Some(placeholder) = &message.failure {
            println!("  [{time}] {} <{who}> ⚠ {placeholder}", message.peer);
            return;
        }
        match &message.attachment {
            Some(path) => println!(
                "  [{time}] {} <{who}> {} [file: {}]",
                message.peer, message.text, path.display()
            ),
            None => println!("  [{time}] {} <{who}> {}", message.peer, message.text),
        }
    }

    fn system_message(&self, peer: &PeerId, text: &str) {
        println!("  [system] {peer}: {text}");
    }

    fn peer_name(&self, peer: &PeerId) -> Option<String> {
        match peer {
            PeerId::User(10) => Some("alice".into()),
            PeerId::User(11) => Some("bob".into()),
            _ => None,
        }
    }
}

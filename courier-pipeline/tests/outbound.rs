//! Outbound scheduler scenarios: chunking, ordering, markup, and failure
//! isolation.

mod common;

use std::sync::Arc;

use courier_pipeline::{Config, NoRetries, PeerId, Pipeline, SubmitError};

use common::{FakeHost, FakeNetwork, settle};

fn small_chunk_config(size: usize, count: usize) -> Config {
    Config {
        max_chunk_size:  size,
        max_chunk_count: count,
        retry_policy:    Arc::new(NoRetries),
        ..Config::default()
    }
}

fn pipeline(net: &Arc<FakeNetwork>, host: &Arc<FakeHost>, config: Config) -> Pipeline {
    Pipeline::new(config, net.clone(), host.clone())
}

// ─── Chunking ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn long_text_splits_into_ordered_chunks() {
    let net  = FakeNetwork::new();
    let host = FakeHost::new();
    let p    = pipeline(&net, &host, small_chunk_config(1000, 4));

    let text: String = (0..2100).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    let queued = p.submit(&text, PeerId::User(1)).await.unwrap();
    assert_eq!(queued, 3);
    settle().await;

    let sent = net.sent_texts();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].chars().count(), 1000);
    assert_eq!(sent[1].chars().count(), 1000);
    assert_eq!(sent[2].chars().count(), 100);
    assert_eq!(sent.concat(), text, "concatenated chunks reproduce the original");
}

#[tokio::test]
async fn oversized_text_is_rejected_whole() {
    let net  = FakeNetwork::new();
    let host = FakeHost::new();
    let p    = pipeline(&net, &host, small_chunk_config(10, 2));

    let result = p.submit(&"x".repeat(25), PeerId::User(1)).await;
    assert_eq!(result, Err(SubmitError::Oversized { length: 25, limit: 20 }));
    settle().await;

    assert!(net.sent_texts().is_empty(), "no partial chunks may be sent");
}

// ─── Ordering ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn submission_order_is_global_across_destinations() {
    let net  = FakeNetwork::new();
    let host = FakeHost::new();
    let p    = pipeline(&net, &host, small_chunk_config(100, 4));

    p.submit("first",  PeerId::User(1)).await.unwrap();
    p.submit("second", PeerId::User(2)).await.unwrap();
    p.submit("third",  PeerId::User(1)).await.unwrap();
    settle().await;

    let sent = net.sent.lock().unwrap();
    let order: Vec<(PeerId, &str)> = sent.iter().map(|(p, t)| (*p, t.as_str())).collect();
    assert_eq!(order, vec![
        (PeerId::User(1), "first"),
        (PeerId::User(2), "second"),
        (PeerId::User(1), "third"),
    ]);
}

// ─── Markup ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn code_spans_become_host_markup() {
    let net  = FakeNetwork::new();
    let host = FakeHost::new();
    let p    = pipeline(&net, &host, small_chunk_config(100, 4));

    p.submit("run `make` now", PeerId::User(1)).await.unwrap();
    settle().await;

    assert_eq!(net.sent_texts(), vec!["run <code>make</code> now"]);
}

#[tokio::test]
async fn secret_chats_get_plain_text() {
    let net  = FakeNetwork::new();
    let host = FakeHost::new();
    let p    = pipeline(&net, &host, small_chunk_config(100, 4));

    p.submit("run `make` now", PeerId::Secret(3)).await.unwrap();
    settle().await;

    assert_eq!(net.sent_texts(), vec!["run make now"], "secret transport carries no markup");
}

#[tokio::test]
async fn inline_images_upload_as_documents() {
    let net  = FakeNetwork::new();
    let host = FakeHost::new();
    let p    = pipeline(&net, &host, small_chunk_config(100, 4));

    p.submit("see <img src=\"/tmp/shot.png\"> attached", PeerId::User(1)).await.unwrap();
    settle().await;

    assert_eq!(net.sent_texts(), vec!["see  attached"]);
    let docs = net.docs.lock().unwrap();
    assert_eq!(docs.len(), 1);
    assert!(docs[0].1.ends_with("shot.png"));
    assert_eq!(docs[0].2, "image/png");
}

#[tokio::test]
async fn markup_only_text_queues_nothing() {
    let net  = FakeNetwork::new();
    let host = FakeHost::new();
    let p    = pipeline(&net, &host, small_chunk_config(100, 4));

    let queued = p.submit("<font color=\"#f00\"></font>", PeerId::User(1)).await.unwrap();
    assert_eq!(queued, 0);
    settle().await;
    assert!(net.sent_texts().is_empty());
}

// ─── Failure isolation ────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_send_surfaces_system_message_and_rest_still_goes() {
    let net  = FakeNetwork::new();
    *net.fail_sends_containing.lock().unwrap() = Some("second".into());
    let host = FakeHost::new();
    host.names.lock().unwrap().insert(PeerId::User(1), "Bob".into());
    let p = pipeline(&net, &host, small_chunk_config(100, 4));

    p.submit("first",  PeerId::User(1)).await.unwrap();
    p.submit("second", PeerId::User(1)).await.unwrap();
    p.submit("third",  PeerId::User(1)).await.unwrap();
    settle().await;

    assert_eq!(net.sent_texts(), vec!["first", "third"], "later chunks are not cancelled");

    let system = host.system.lock().unwrap();
    assert_eq!(system.len(), 1);
    assert_eq!(system[0].0, PeerId::User(1));
    assert!(system[0].1.contains("Bob"), "failure is attributed to the destination");
}

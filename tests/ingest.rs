use std::sync::{Arc, Mutex};
use std::time::Duration;

use group_chat::chat::{Outbox, Publisher, ingest};
use group_chat::codec;
use group_chat::error::PublishError;
use group_chat::message_log::{MessageLog, Render};
use group_chat::network::Subscription;
use group_chat::ChatMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Screen {
    lines: Mutex<Vec<String>>,
}

impl Render for Screen {
    fn render(&self, author: &str, text: &str) {
        self.lines.lock().unwrap().push(format!("{author}: {text}"));
    }
}

/// Loops every published payload straight back into the subscription, the
/// way a broadcast layer that echoes our own messages would.
struct Echo {
    sender: mpsc::Sender<Vec<u8>>,
}

impl Publisher for Echo {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), PublishError> {
        self.sender
            .send(payload)
            .await
            .map_err(|_| PublishError::NetworkClosed)
    }
}

fn remote(clock: u64, sender_id: &str, text: &str) -> ChatMessage {
    ChatMessage {
        clock,
        sender_id: sender_id.to_string(),
        display_name: String::new(),
        text: text.to_string(),
    }
}

async fn wait_for_lines(screen: &Screen, count: usize) -> Vec<String> {
    for _ in 0..100 {
        let lines = screen.lines.lock().unwrap().clone();
        if lines.len() >= count {
            return lines;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    screen.lines.lock().unwrap().clone()
}

#[tokio::test]
async fn own_messages_echoed_back_are_shown_once() {
    let (sender, receiver) = mpsc::channel(64);
    let mut subscription = Subscription::new(receiver);
    let log = Arc::new(MessageLog::with_renderer(Screen::default()));
    let shutdown = CancellationToken::new();

    let ingestion = tokio::spawn({
        let log = log.clone();
        let shutdown = shutdown.clone();
        async move { ingest(&mut subscription, &log, &shutdown).await }
    });

    // Two remote peers, one of them flooding the same message through two neighbours.
    let hello = remote(3, "12D3KooWRemoteAAAAAA", "hello");
    sender.send(codec::encode(&hello)).await.unwrap();
    sender.send(codec::encode(&hello)).await.unwrap();
    sender
        .send(codec::encode(&remote(0, "12D3KooWRemoteBBBBBB", "late")))
        .await
        .unwrap();
    sender.send(b"\x00garbage".to_vec()).await.unwrap();
    wait_for_lines(log.renderer(), 2).await;

    let outbox = Outbox::new(log.clone(), "12D3KooWLocalCCCCCC".to_string(), "me".to_string());
    let echo = Echo {
        sender: sender.clone(),
    };
    let sent = outbox.send(&echo, "hi all").await.unwrap();
    assert_eq!(sent.clock, 4);

    let lines = wait_for_lines(log.renderer(), 3).await;
    // Give the echoed copy time to pass through ingestion.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let lines_after = log.renderer().lines.lock().unwrap().clone();
    assert_eq!(lines, lines_after);
    assert_eq!(
        lines,
        vec!["AAAAAA: hello", "BBBBBB: late", "me: hi all"]
    );
    assert_eq!(log.len(), 3);
    assert_eq!(log.next_clock(), 5);

    shutdown.cancel();
    ingestion.await.unwrap().unwrap();
}

#[tokio::test]
async fn closed_subscription_is_fatal() {
    let (sender, receiver) = mpsc::channel(1);
    let mut subscription = Subscription::new(receiver);
    let log = MessageLog::with_renderer(Screen::default());
    drop(sender);

    let err = ingest(&mut subscription, &log, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("subscription closed"));
}

//! The two halves of a running chat peer.
//!
//! [`ingest`] turns broadcast payloads into log entries; [`Outbox`] turns
//! typed lines into broadcast payloads. They share nothing but the
//! [`MessageLog`].

use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use crate::codec;
use crate::common::ChatMessage;
use crate::error::{PublishError, TransportFatalError};
use crate::message_log::{AppendResult, MessageLog, Render};
use crate::network::{NetworkHandle, Subscription};

/// Something that can put a payload on the chat topic.
pub trait Publisher {
    fn publish(&self, payload: Vec<u8>) -> impl Future<Output = Result<(), PublishError>> + Send;
}

impl Publisher for NetworkHandle {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), PublishError> {
        NetworkHandle::publish(self, payload).await
    }
}

/// Feeds every delivered payload through the codec into `log` until
/// `shutdown` fires or the subscription dies.
pub async fn ingest<R: Render>(
    subscription: &mut Subscription,
    log: &MessageLog<R>,
    shutdown: &CancellationToken,
) -> Result<(), TransportFatalError> {
    loop {
        let payload = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(()),
            next = subscription.next() => next?,
        };

        match codec::decode(&payload) {
            Ok(message) => {
                if log.append(message) == AppendResult::Duplicate {
                    log::trace!("Dropped duplicate message");
                }
            }
            Err(err) => {
                log::error!(
                    "{err} (dropped {} bytes: {})",
                    payload.len(),
                    preview(&payload)
                );
            }
        }
    }
}

const PREVIEW_CHARS: usize = 64;

/// Printable head of an undecodable payload for the error log.
fn preview(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head:?}...")
    } else {
        format!("{head:?}")
    }
}

/// Stamps, encodes and publishes this peer's own messages.
pub struct Outbox<R> {
    log: Arc<MessageLog<R>>,
    sender_id: String,
    display_name: String,
}

impl<R: Render> Outbox<R> {
    pub fn new(log: Arc<MessageLog<R>>, sender_id: String, display_name: String) -> Self {
        Self {
            log,
            sender_id,
            display_name,
        }
    }

    /// Publishes `text` and shows it locally. The broadcast layer does not
    /// deliver a peer's own messages back to it, and a peer with no
    /// subscribed neighbours still sees what it typed.
    pub async fn send<P: Publisher>(
        &self,
        publisher: &P,
        text: &str,
    ) -> Result<ChatMessage, PublishError> {
        let message = ChatMessage {
            clock: self.log.next_clock(),
            sender_id: self.sender_id.clone(),
            display_name: self.display_name.clone(),
            text: text.to_string(),
        };

        match publisher.publish(codec::encode(&message)).await {
            Ok(()) => {}
            Err(PublishError::NoPeers) => {
                log::warn!("No peers yet; message shown locally only");
            }
            Err(err) => return Err(err),
        }
        self.log.append(message.clone());
        Ok(message)
    }

    /// Sends one message per input line until end of input or shutdown.
    pub async fn run<P, I>(
        &self,
        publisher: &P,
        input: I,
        shutdown: &CancellationToken,
    ) -> io::Result<()>
    where
        P: Publisher,
        I: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                return Ok(());
            };

            if line.trim().is_empty() {
                continue;
            }
            if let Err(err) = self.send(publisher, &line).await {
                log::error!("Could not publish message: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::sync::mpsc;

    use super::*;
    use crate::message_log::tests::CollectingRenderer;

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<Vec<u8>>>,
        reject: bool,
        alone: bool,
    }

    impl Publisher for RecordingPublisher {
        async fn publish(&self, payload: Vec<u8>) -> Result<(), PublishError> {
            if self.reject {
                return Err(PublishError::Rejected("MessageTooLarge".to_string()));
            }
            if self.alone {
                return Err(PublishError::NoPeers);
            }
            self.published.lock().unwrap().push(payload);
            Ok(())
        }
    }

    fn message(clock: u64, text: &str) -> ChatMessage {
        ChatMessage {
            clock,
            sender_id: "QmRemotePeerXYZ123".to_string(),
            display_name: String::new(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn ingest_decodes_and_deduplicates() {
        let (sender, receiver) = mpsc::channel(16);
        let mut subscription = Subscription::new(receiver);
        let log = MessageLog::with_renderer(CollectingRenderer::default());
        let shutdown = CancellationToken::new();

        sender.send(codec::encode(&message(4, "first"))).await.unwrap();
        sender.send(b"{ definitely not a message".to_vec()).await.unwrap();
        sender.send(codec::encode(&message(4, "first"))).await.unwrap();
        sender.send(codec::encode(&message(1, "second"))).await.unwrap();
        drop(sender);

        let result = ingest(&mut subscription, &log, &shutdown).await;
        assert!(result.is_err(), "closed subscription is fatal");

        assert_eq!(log.renderer().lines(), vec!["XYZ123: first", "XYZ123: second"]);
        assert_eq!(log.next_clock(), 5);
    }

    #[tokio::test]
    async fn ingest_stops_on_shutdown() {
        let (_sender, receiver) = mpsc::channel(1);
        let mut subscription = Subscription::new(receiver);
        let log = MessageLog::with_renderer(CollectingRenderer::default());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        assert!(ingest(&mut subscription, &log, &shutdown).await.is_ok());
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn send_stamps_current_clock_and_shows_locally() {
        let log = Arc::new(MessageLog::with_renderer(CollectingRenderer::default()));
        log.append(message(9, "earlier"));
        let outbox = Outbox::new(log.clone(), "QmLocalPeer123456".to_string(), "me".to_string());
        let publisher = RecordingPublisher::default();

        let sent = outbox.send(&publisher, "hello").await.unwrap();
        assert_eq!(sent.clock, 10);
        assert_eq!(log.next_clock(), 11);

        let published = publisher.published.lock().unwrap().clone();
        assert_eq!(published.len(), 1);
        assert_eq!(codec::decode(&published[0]).unwrap(), sent);
        assert_eq!(log.renderer().lines().last().unwrap(), "me: hello");

        // The same message echoed back by the network is not shown twice.
        assert_eq!(log.append(sent), AppendResult::Duplicate);
    }

    #[tokio::test]
    async fn rejected_publish_is_not_shown() {
        let log = Arc::new(MessageLog::with_renderer(CollectingRenderer::default()));
        let outbox = Outbox::new(log.clone(), "QmLocalPeer123456".to_string(), String::new());
        let publisher = RecordingPublisher {
            reject: true,
            ..Default::default()
        };

        assert!(outbox.send(&publisher, "lost").await.is_err());
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn lines_typed_without_peers_are_still_shown() {
        let log = Arc::new(MessageLog::with_renderer(CollectingRenderer::default()));
        let outbox = Outbox::new(log.clone(), "QmLocalPeer123456".to_string(), "me".to_string());
        let publisher = RecordingPublisher {
            alone: true,
            ..Default::default()
        };

        let sent = outbox.send(&publisher, "anyone here?").await.unwrap();
        assert_eq!(sent.clock, 0);
        assert_eq!(log.renderer().lines(), vec!["me: anyone here?"]);
        assert_eq!(log.next_clock(), 1);
        assert_eq!(log.append(sent), AppendResult::Duplicate);
        assert_eq!(log.renderer().lines().len(), 1);
    }

    #[test]
    fn preview_truncates_and_escapes_payloads() {
        assert_eq!(preview(b"{ broken"), r#""{ broken""#);
        assert_eq!(preview(&[b'a', 0xff, b'\n']), "\"a\u{fffd}\\n\"");

        let long = vec![b'x'; 100];
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.matches('x').count(), PREVIEW_CHARS);
    }

    #[tokio::test]
    async fn run_sends_each_non_empty_line() {
        let log = Arc::new(MessageLog::with_renderer(CollectingRenderer::default()));
        let outbox = Outbox::new(log.clone(), "QmLocalPeer123456".to_string(), String::new());
        let publisher = RecordingPublisher::default();
        let shutdown = CancellationToken::new();

        let input: &[u8] = b"one\n\n  \ntwo\nthree";
        outbox.run(&publisher, input, &shutdown).await.unwrap();

        assert_eq!(
            log.renderer().lines(),
            vec!["123456: one", "123456: two", "123456: three"]
        );
        let clocks: Vec<u64> = publisher
            .published
            .lock()
            .unwrap()
            .iter()
            .map(|p| codec::decode(p).unwrap().clock)
            .collect();
        assert_eq!(clocks, vec![0, 1, 2]);
    }
}

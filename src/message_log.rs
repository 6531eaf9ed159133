use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::common::ChatMessage;

/// Outcome of [`MessageLog::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendResult {
    Admitted,
    Duplicate,
}

/// Where admitted messages end up.
pub trait Render: Send + Sync {
    fn render(&self, author: &str, text: &str);
}

/// Writes chat lines through the `log` facade at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRenderer;

impl Render for LogRenderer {
    fn render(&self, author: &str, text: &str) {
        log::info!("{author}:\t{text}");
    }
}

#[derive(Debug, Default)]
struct Inner {
    seen: HashSet<ChatMessage>,
    clock: u64,
}

/// Deduplicating, clock-keeping log of every chat message this peer has shown.
///
/// Shared between the ingestion task and the send path behind an `Arc`. The
/// lock covers the membership check, the insert and the clock tick only;
/// rendering happens after it is released.
#[derive(Debug)]
pub struct MessageLog<R = LogRenderer> {
    inner: Mutex<Inner>,
    renderer: R,
}

impl MessageLog<LogRenderer> {
    pub fn new() -> Self {
        Self::with_renderer(LogRenderer)
    }
}

impl Default for MessageLog<LogRenderer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Render> MessageLog<R> {
    pub fn with_renderer(renderer: R) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            renderer,
        }
    }

    pub fn append(&self, message: ChatMessage) -> AppendResult {
        {
            let mut inner = self.lock();
            if inner.seen.contains(&message) {
                return AppendResult::Duplicate;
            }
            if message.clock >= inner.clock {
                inner.clock = message.clock.saturating_add(1);
            }
            inner.seen.insert(message.clone());
        }

        self.renderer.render(&message.author(), &message.text);
        AppendResult::Admitted
    }

    /// Clock value to stamp on the next outbound message.
    pub fn next_clock(&self) -> u64 {
        self.lock().clock
    }

    pub fn len(&self) -> usize {
        self.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    // A panic while holding the lock cannot leave `Inner` half-updated: the
    // clock tick and the insert are both infallible.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct CollectingRenderer {
        pub lines: Mutex<Vec<String>>,
    }

    impl CollectingRenderer {
        pub fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl Render for CollectingRenderer {
        fn render(&self, author: &str, text: &str) {
            self.lines.lock().unwrap().push(format!("{author}: {text}"));
        }
    }

    fn message(clock: u64, sender_id: &str, text: &str) -> ChatMessage {
        ChatMessage {
            clock,
            sender_id: sender_id.to_string(),
            display_name: String::new(),
            text: text.to_string(),
        }
    }

    #[test]
    fn append_is_idempotent() {
        let log = MessageLog::with_renderer(CollectingRenderer::default());
        let m = message(3, "QmABCDEFGHIJKL", "hello");

        assert_eq!(log.append(m.clone()), AppendResult::Admitted);
        assert_eq!(log.append(m), AppendResult::Duplicate);

        assert_eq!(log.len(), 1);
        assert_eq!(log.renderer().lines(), vec!["GHIJKL: hello"]);
    }

    #[test]
    fn duplicates_are_structural() {
        let log = MessageLog::with_renderer(CollectingRenderer::default());
        let first = message(1, "QmPeerOne", "same");
        let redelivered = ChatMessage {
            text: String::from("same"),
            ..first.clone()
        };

        log.append(first);
        assert_eq!(log.append(redelivered), AppendResult::Duplicate);

        // Any differing field makes it a different message.
        assert_eq!(log.append(message(2, "QmPeerOne", "same")), AppendResult::Admitted);
        let named = ChatMessage {
            display_name: "one".to_string(),
            ..message(1, "QmPeerOne", "same")
        };
        assert_eq!(log.append(named), AppendResult::Admitted);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn clock_advances_past_admitted_messages() {
        let log = MessageLog::with_renderer(CollectingRenderer::default());
        assert_eq!(log.next_clock(), 0);

        log.append(message(0, "QmPeerOne", "a"));
        assert_eq!(log.next_clock(), 1);

        log.append(message(7, "QmPeerTwo", "b"));
        assert_eq!(log.next_clock(), 8);

        // An older message is still shown but never moves the clock back.
        assert_eq!(log.append(message(2, "QmPeerOne", "c")), AppendResult::Admitted);
        assert_eq!(log.next_clock(), 8);

        log.append(message(8, "QmPeerOne", "d"));
        assert_eq!(log.next_clock(), 9);
    }

    #[test]
    fn clock_is_monotonic_over_any_sequence() {
        let log = MessageLog::with_renderer(CollectingRenderer::default());
        let clocks = [5, 1, 9, 9, 0, 3, 12, 11, 12];
        let mut previous = log.next_clock();

        for (i, clock) in clocks.into_iter().enumerate() {
            log.append(message(clock, "QmPeer", &i.to_string()));
            let current = log.next_clock();
            assert!(current >= previous);
            assert!(current >= clock + 1);
            previous = current;
        }
    }

    #[test]
    fn clock_saturates_at_max() {
        let log = MessageLog::with_renderer(CollectingRenderer::default());
        log.append(message(u64::MAX, "QmPeer", "end of time"));
        assert_eq!(log.next_clock(), u64::MAX);
    }

    #[test]
    fn renders_display_name_when_present() {
        let log = MessageLog::with_renderer(CollectingRenderer::default());
        log.append(ChatMessage {
            display_name: "alice".to_string(),
            ..message(0, "QmABCDEFGHIJKL", "hi")
        });
        assert_eq!(log.renderer().lines(), vec!["alice: hi"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_render_each_message_once() {
        const N: usize = 64;
        let log = Arc::new(MessageLog::with_renderer(CollectingRenderer::default()));

        let mut handles = Vec::new();
        for i in 0..N {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                let m = message(i as u64, "QmABCDEFGHIJKL", &format!("msg {i}"));
                // Every message arrives twice, as if from two different neighbours.
                log.append(m.clone());
                log.append(m);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut lines = log.renderer().lines();
        assert_eq!(lines.len(), N);
        lines.sort();
        lines.dedup();
        assert_eq!(lines.len(), N);
        assert_eq!(log.len(), N);
        assert_eq!(log.next_clock(), N as u64);
    }
}

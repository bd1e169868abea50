//! Typed publish/subscribe bus for workbench events.
//!
//! Subscribers filter by NATS-style subject patterns over dot-separated
//! tokens:
//! - `*` matches exactly one token: `vault.file.*` matches `vault.file.open`
//!   but not `vault.active`
//! - `>` matches one or more tokens (only at the end): `vault.>` matches
//!   every vault event
//! - anything else requires an exact token match
//!
//! Fan-out rides on `tokio::sync::broadcast`; a slow subscriber lags and
//! skips, it never blocks the publisher.

use std::time::Instant;

use tokio::sync::broadcast;
use tracing::warn;

use lattice_types::VaultEvent;

/// Trait for payloads that know their subject.
pub trait HasSubject {
    fn subject(&self) -> &str;
}

impl HasSubject for VaultEvent {
    fn subject(&self) -> &str {
        VaultEvent::subject(self)
    }
}

/// A message published on the bus.
#[derive(Clone, Debug)]
pub struct BusMessage<T> {
    /// The subject (derived from the payload).
    pub subject: String,
    /// The payload data.
    pub payload: T,
    /// When this message was published.
    pub timestamp: Instant,
}

/// Check if a subject matches a pattern.
pub fn matches_pattern(pattern: &str, subject: &str) -> bool {
    let pattern_tokens: Vec<&str> = pattern.split('.').collect();
    let subject_tokens: Vec<&str> = subject.split('.').collect();

    let mut pi = 0;
    let mut si = 0;

    while pi < pattern_tokens.len() && si < subject_tokens.len() {
        match pattern_tokens[pi] {
            ">" => {
                // `>` must be at the end and matches one or more remaining tokens
                return pi == pattern_tokens.len() - 1 && si < subject_tokens.len();
            }
            "*" => {
                pi += 1;
                si += 1;
            }
            token => {
                if token != subject_tokens[si] {
                    return false;
                }
                pi += 1;
                si += 1;
            }
        }
    }

    pi == pattern_tokens.len() && si == subject_tokens.len()
}

/// A typed event bus with pattern-filtered subscriptions.
pub struct EventBus<T: HasSubject + Clone> {
    tx: broadcast::Sender<BusMessage<T>>,
}

impl<T: HasSubject + Clone> EventBus<T> {
    /// Create a bus with the given per-subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. A bus with no subscribers drops it silently.
    pub fn publish(&self, payload: T) {
        let msg = BusMessage {
            subject: payload.subject().to_string(),
            payload,
            timestamp: Instant::now(),
        };
        // Error just means no subscribers right now.
        let _ = self.tx.send(msg);
    }

    /// Subscribe to events whose subject matches `pattern`.
    pub fn subscribe(&self, pattern: impl Into<String>) -> Subscription<T> {
        Subscription {
            pattern: pattern.into(),
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: HasSubject + Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(256)
    }
}

/// A pattern-filtered subscription.
pub struct Subscription<T> {
    pattern: String,
    rx: broadcast::Receiver<BusMessage<T>>,
}

impl<T: Clone> Subscription<T> {
    /// Receive the next matching message, or `None` when the bus is gone.
    ///
    /// Lagging (the subscriber fell behind the buffer) skips the lost
    /// messages and keeps receiving.
    pub async fn recv(&mut self) -> Option<BusMessage<T>> {
        loop {
            match self.rx.recv().await {
                Ok(msg) if matches_pattern(&self.pattern, &msg.subject) => return Some(msg),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(pattern = %self.pattern, skipped = n, "bus subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Drain whatever is immediately available and matching.
    pub fn drain(&mut self) -> Vec<BusMessage<T>> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(msg) if matches_pattern(&self.pattern, &msg.subject) => out.push(msg),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        out
    }
}

// ============================================================================
// Tests
// ============================================================================

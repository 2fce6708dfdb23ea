//! Error channel for counter store operations.
//!
//! Operations never return their failures to the caller. Each failure is
//! logged, broadcast to live subscribers and kept in a bounded buffer that
//! can be inspected later.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use super::error::{ErrorKind, StoreError};
use crate::config::{DEFAULT_ERROR_LOG_CAPACITY, MAX_ERROR_LOG_CAPACITY};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    /// Public operation that hit the failure (`store`, `query`, `list`).
    pub operation: &'static str,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ErrorChannel {
    sender: broadcast::Sender<ErrorEvent>,
    log: Mutex<VecDeque<ErrorEvent>>,
    capacity: usize,
    total: AtomicU64,
}

impl ErrorChannel {
    /// `capacity` bounds both the buffered log and the broadcast backlog.
    /// It is clamped to [`MAX_ERROR_LOG_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_ERROR_LOG_CAPACITY);
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            log: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            total: AtomicU64::new(0),
        }
    }

    /// Live stream of errors reported after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ErrorEvent> {
        self.sender.subscribe()
    }

    pub fn report(&self, operation: &'static str, error: &StoreError) {
        let event = ErrorEvent {
            kind: error.kind(),
            operation,
            message: error.to_string(),
            occurred_at: Utc::now(),
        };

        tracing::warn!(
            operation = operation,
            kind = %event.kind,
            "Counter store error: {}",
            event.message
        );
        self.total.fetch_add(1, Ordering::Relaxed);

        if self.capacity > 0 {
            let mut log = self.log.lock();
            if log.len() == self.capacity {
                log.pop_front();
            }
            log.push_back(event.clone());
        }

        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Buffered events, oldest first.
    pub fn recent(&self) -> Vec<ErrorEvent> {
        self.log.lock().iter().cloned().collect()
    }

    /// Take and clear the buffered events.
    pub fn drain(&self) -> Vec<ErrorEvent> {
        self.log.lock().drain(..).collect()
    }

    /// Errors reported since creation, including ones evicted from the log.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl Default for ErrorChannel {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BackendError;

    fn query_error(message: &str) -> StoreError {
        StoreError::Query(BackendError::Database(message.to_string()))
    }

    #[test]
    fn test_report_buffers_event() {
        let channel = ErrorChannel::new(8);
        channel.report("query", &query_error("boom"));

        let events = channel.recent();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ErrorKind::Query);
        assert_eq!(events[0].operation, "query");
        assert!(events[0].message.contains("boom"));
    }

    #[test]
    fn test_log_is_bounded() {
        let channel = ErrorChannel::new(2);
        for i in 0..5 {
            channel.report("query", &query_error(&format!("e{}", i)));
        }

        let messages: Vec<String> = channel.recent().into_iter().map(|e| e.message).collect();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("e3"));
        assert!(messages[1].contains("e4"));
        assert_eq!(channel.total(), 5);
    }

    #[test]
    fn test_drain_empties_log() {
        let channel = ErrorChannel::new(4);
        channel.report("list", &query_error("x"));

        assert_eq!(channel.drain().len(), 1);
        assert!(channel.recent().is_empty());
        assert_eq!(channel.total(), 1);
    }

    #[test]
    fn test_zero_capacity_still_counts() {
        let channel = ErrorChannel::new(0);
        channel.report("store", &query_error("x"));
        assert!(channel.recent().is_empty());
        assert_eq!(channel.total(), 1);
    }

    #[test]
    fn test_oversized_capacity_is_clamped() {
        let channel = ErrorChannel::new(usize::MAX);
        assert_eq!(channel.capacity, MAX_ERROR_LOG_CAPACITY);

        channel.report("store", &query_error("x"));
        assert_eq!(channel.recent().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let channel = ErrorChannel::new(4);
        let mut rx = channel.subscribe();

        channel.report("store", &StoreError::IdSpaceExhausted("cpu".into()));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, ErrorKind::Resolution);
        assert_eq!(event.operation, "store");
    }
}

//! In-memory EventBus implementation
//!
//! Keeps a bounded replay history and a broadcast channel for live
//! subscribers. With ~30 samples per second per session the history would
//! otherwise grow without limit, so the oldest events are evicted first.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};

use super::ProctorEvent;
use super::bus::{EventBus, EventSeq};

/// Events retained for replay when no limit is given
pub const DEFAULT_HISTORY_LIMIT: usize = 10_000;

pub struct MemoryEventBus {
    events: RwLock<VecDeque<(EventSeq, ProctorEvent)>>,
    history_limit: usize,
    next_seq: AtomicU64,
    tx: broadcast::Sender<(EventSeq, ProctorEvent)>,
}

impl MemoryEventBus {
    /// Create a bus with the given broadcast channel capacity
    pub fn new(capacity: usize) -> Self {
        Self::with_history_limit(capacity, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(capacity: usize, history_limit: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            events: RwLock::new(VecDeque::new()),
            history_limit,
            next_seq: AtomicU64::new(0),
            tx,
        }
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, event: ProctorEvent) -> EventSeq {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);

        if self.history_limit > 0 {
            let mut events = self.events.write().await;
            events.push_back((seq, event.clone()));
            while events.len() > self.history_limit {
                events.pop_front();
            }
        }

        // No receivers is fine
        let _ = self.tx.send((seq, event));

        seq
    }

    fn subscribe(&self) -> broadcast::Receiver<(EventSeq, ProctorEvent)> {
        self.tx.subscribe()
    }

    async fn events_from(&self, seq: EventSeq) -> Vec<(EventSeq, ProctorEvent)> {
        self.events
            .read()
            .await
            .iter()
            .filter(|(s, _)| *s >= seq)
            .cloned()
            .collect()
    }

    async fn get_session_events(&self, session_id: &str) -> Vec<(EventSeq, ProctorEvent)> {
        self.events
            .read()
            .await
            .iter()
            .filter(|(_, event)| event.session_id() == session_id)
            .cloned()
            .collect()
    }

    fn current_seq(&self) -> EventSeq {
        self.next_seq.load(Ordering::SeqCst)
    }
}

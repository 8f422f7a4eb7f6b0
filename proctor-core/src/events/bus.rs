//! EventBus trait definition

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::ProctorEvent;

/// Sequence number for events (monotonically increasing)
pub type EventSeq = u64;

/// Event bus carrying engine events to the transport
///
/// Live subscribers get a broadcast receiver; late joiners (an admin
/// dashboard opened mid-exam) can replay retained history.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event, returns its sequence number
    async fn publish(&self, event: ProctorEvent) -> EventSeq;

    /// Subscribe to all events from now (live stream)
    fn subscribe(&self) -> broadcast::Receiver<(EventSeq, ProctorEvent)>;

    /// Retained events starting from a sequence number
    async fn events_from(&self, seq: EventSeq) -> Vec<(EventSeq, ProctorEvent)>;

    /// Retained events for one session
    async fn get_session_events(&self, session_id: &str) -> Vec<(EventSeq, ProctorEvent)>;

    /// Current sequence number (high water mark)
    fn current_seq(&self) -> EventSeq;
}

//! Per-session processing lane
//!
//! A lane is one tokio task draining a bounded mailbox in arrival order. When
//! the mailbox is full the oldest queued sample is evicted to make room;
//! control messages are never evicted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::EndReason;
use super::state::{ScoringPipeline, SessionState};
use crate::aggregator::{RiskSnapshot, RiskUpdate};
use crate::events::{EventBus, ProctorEvent, ViolationNotice};
use crate::evidence::{EvidenceSink, EvidenceTrigger};
use crate::metrics::EngineMetrics;
use crate::signal::SignalSample;
use crate::store::SessionRecord;
use crate::violation::EvidenceRef;

pub(crate) enum LaneMessage {
    Sample(SignalSample),
    AttachEvidence {
        violation_id: Uuid,
        evidence: EvidenceRef,
    },
    /// Reply once everything queued before it has been processed
    Flush(oneshot::Sender<RiskSnapshot>),
    End {
        reason: EndReason,
        at: DateTime<Utc>,
        reply: oneshot::Sender<SessionRecord>,
    },
}

/// Outcome of offering a sample to a mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    Queued,
    /// Queued after evicting the oldest sample
    DroppedOldest,
    Closed,
}

#[derive(Default)]
struct MailboxState {
    queue: VecDeque<LaneMessage>,
    samples: usize,
    closed: bool,
}

/// Bounded drop-oldest queue with a single consumer
pub(crate) struct Mailbox {
    state: Mutex<MailboxState>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl Mailbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(MailboxState::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn offer(&self, sample: SignalSample) -> Offer {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return Offer::Closed;
            }
            let mut outcome = Offer::Queued;
            if state.samples >= self.capacity {
                if let Some(index) = state
                    .queue
                    .iter()
                    .position(|m| matches!(m, LaneMessage::Sample(_)))
                {
                    state.queue.remove(index);
                    state.samples -= 1;
                    outcome = Offer::DroppedOldest;
                }
            }
            state.queue.push_back(LaneMessage::Sample(sample));
            state.samples += 1;
            outcome
        };
        if outcome == Offer::DroppedOldest {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        outcome
    }

    /// Queue a control message. Returns false once the mailbox is closed.
    pub(crate) fn send_control(&self, message: LaneMessage) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.queue.push_back(message);
        }
        self.notify.notify_one();
        true
    }

    /// Close the mailbox with a final message
    ///
    /// Queued samples are discarded; queued control messages still run
    /// before `last`. Returns the number of discarded samples, or `None` if
    /// the mailbox was already closed.
    pub(crate) fn close(&self, last: LaneMessage) -> Option<usize> {
        let discarded = {
            let mut state = self.lock();
            if state.closed {
                return None;
            }
            state.closed = true;
            let discarded = state.samples;
            state
                .queue
                .retain(|m| !matches!(m, LaneMessage::Sample(_)));
            state.samples = 0;
            state.queue.push_back(last);
            discarded
        };
        self.notify.notify_one();
        Some(discarded)
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().queue.len()
    }

    fn try_recv(&self) -> Result<LaneMessage, bool> {
        let mut state = self.lock();
        match state.queue.pop_front() {
            Some(message) => {
                if matches!(message, LaneMessage::Sample(_)) {
                    state.samples -= 1;
                }
                Ok(message)
            }
            None => Err(state.closed),
        }
    }

    /// Next message, or `None` once closed and drained
    pub(crate) async fn recv(&self) -> Option<LaneMessage> {
        loop {
            match self.try_recv() {
                Ok(message) => return Some(message),
                Err(true) => return None,
                Err(false) => self.notify.notified().await,
            }
        }
    }
}

/// Routes saved evidence back into a live lane
struct LaneEvidenceSink {
    mailbox: Weak<Mailbox>,
}

impl EvidenceSink for LaneEvidenceSink {
    fn deliver(&self, violation_id: Uuid, evidence: EvidenceRef) -> bool {
        self.mailbox.upgrade().is_some_and(|mailbox| {
            mailbox.send_control(LaneMessage::AttachEvidence {
                violation_id,
                evidence,
            })
        })
    }
}

/// Collaborators every lane shares
pub(crate) struct LaneContext {
    pub(crate) pipeline: ScoringPipeline,
    pub(crate) evidence: EvidenceTrigger,
    pub(crate) event_bus: Arc<dyn EventBus>,
    pub(crate) metrics: Arc<EngineMetrics>,
}

/// Registry-side handle to a running lane
pub(crate) struct SessionLane {
    mailbox: Arc<Mailbox>,
    snapshot: watch::Receiver<RiskSnapshot>,
    task: JoinHandle<()>,
}

impl SessionLane {
    pub(crate) fn spawn(state: SessionState, context: Arc<LaneContext>) -> Self {
        let mailbox = Arc::new(Mailbox::new(context.pipeline.config().lane.queue_capacity));
        let (snapshot_tx, snapshot) = watch::channel(state.snapshot(0));
        let task = tokio::spawn(run(state, Arc::clone(&mailbox), snapshot_tx, context));
        Self {
            mailbox,
            snapshot,
            task,
        }
    }

    pub(crate) fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Latest published snapshot with the live drop count
    pub(crate) fn snapshot(&self) -> RiskSnapshot {
        let mut snapshot = self.snapshot.borrow().clone();
        snapshot.dropped_samples = self.mailbox.dropped();
        snapshot
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn run(
    mut state: SessionState,
    mailbox: Arc<Mailbox>,
    snapshot_tx: watch::Sender<RiskSnapshot>,
    context: Arc<LaneContext>,
) {
    let session_id = state.session_id().to_string();
    debug!(%session_id, "session lane started");

    while let Some(message) = mailbox.recv().await {
        match message {
            LaneMessage::Sample(sample) => {
                let frame = sample.frame.clone();
                let updates = state.observe(&sample, &context.pipeline);
                if updates.is_empty() {
                    continue;
                }
                for update in &updates {
                    if let RiskUpdate::Opened { violation, .. } = update {
                        context.metrics.violation_opened();
                        info!(
                            %session_id,
                            kind = %violation.kind,
                            severity = violation.severity.as_str(),
                            score = update.score(),
                            "violation activated"
                        );
                        let sink = LaneEvidenceSink {
                            mailbox: Arc::downgrade(&mailbox),
                        };
                        context.evidence.on_activated(violation, frame.clone(), sink);
                    } else {
                        context.metrics.violations_closed(1);
                        debug!(%session_id, kind = %update.violation().kind, "violation cleared");
                    }
                    publish_update(&context, &session_id, update).await;
                }
                snapshot_tx.send_replace(state.snapshot(mailbox.dropped()));
            }
            LaneMessage::AttachEvidence {
                violation_id,
                evidence,
            } => {
                if state.attach_evidence(violation_id, evidence.clone()) {
                    context
                        .event_bus
                        .publish(ProctorEvent::EvidenceAttached {
                            session_id: session_id.clone(),
                            violation_id,
                            evidence_ref: evidence,
                        })
                        .await;
                }
            }
            LaneMessage::Flush(reply) => {
                let _ = reply.send(state.snapshot(mailbox.dropped()));
            }
            LaneMessage::End { reason, at, reply } => {
                let closed = state.finish(at);
                context.metrics.violations_closed(closed.len() as u64);
                let score = state.risk().score();
                for violation in &closed {
                    context
                        .event_bus
                        .publish(ProctorEvent::ViolationUpdate {
                            session_id: session_id.clone(),
                            risk_score: score,
                            violation: ViolationNotice::from(violation),
                        })
                        .await;
                }
                snapshot_tx.send_replace(state.snapshot(mailbox.dropped()));
                let _ = reply.send(state.to_record(reason, at, mailbox.dropped()));
                break;
            }
        }
    }

    debug!(%session_id, "session lane stopped");
}

async fn publish_update(context: &LaneContext, session_id: &str, update: &RiskUpdate) {
    context
        .event_bus
        .publish(ProctorEvent::ViolationUpdate {
            session_id: session_id.to_string(),
            risk_score: update.score(),
            violation: ViolationNotice::from(update.violation()),
        })
        .await;
}

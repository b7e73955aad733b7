use crate::config::{IngressSettings, OverflowPolicy};
use crate::controls::{ControlId, ParticipantId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

// Button input kind reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Down,
    Press,
    Up,
}

// Raw participant input with the service timestamp preserved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    pub control_id: ControlId,
    pub participant_id: ParticipantId,
    pub kind: EventKind,
    pub server_timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngressError {
    #[error("Ingress buffer full ({capacity} events), event rejected")]
    Full { capacity: usize },
}

#[derive(Debug)]
struct IngressShared {
    queue: Mutex<VecDeque<InputEvent>>,
    settings: IngressSettings,
    dropped_total: AtomicU64,
    dropped_since_drain: AtomicU64,
}

/// Producer-side buffer shared by every transport callback.
///
/// Cloning is cheap; all clones feed the same queue. The lock is only held for a
/// push or for swapping the whole queue out, so producers never wait on a tick.
#[derive(Debug, Clone)]
pub struct EventIngress {
    shared: Arc<IngressShared>,
}

impl EventIngress {
    pub fn new(settings: IngressSettings) -> Self {
        let settings = IngressSettings {
            capacity: settings.capacity.max(1),
            ..settings
        };
        debug!("Creating event ingress with settings: {:?}", settings);

        Self {
            shared: Arc::new(IngressShared {
                queue: Mutex::new(VecDeque::with_capacity(settings.capacity.min(1024))),
                settings,
                dropped_total: AtomicU64::new(0),
                dropped_since_drain: AtomicU64::new(0),
            }),
        }
    }

    pub fn enqueue(
        &self,
        control_id: impl Into<ControlId>,
        participant_id: u64,
        kind: EventKind,
        server_timestamp_ms: i64,
    ) -> Result<(), IngressError> {
        self.push(InputEvent {
            control_id: control_id.into(),
            participant_id: ParticipantId(participant_id),
            kind,
            server_timestamp_ms,
        })
    }

    pub fn push(&self, event: InputEvent) -> Result<(), IngressError> {
        let capacity = self.shared.settings.capacity;
        let mut queue = self.lock_queue();

        if queue.len() >= capacity {
            match self.shared.settings.overflow_policy {
                OverflowPolicy::DropOldest => {
                    if let Some(oldest) = queue.pop_front() {
                        self.shared.dropped_total.fetch_add(1, Ordering::Relaxed);
                        self.shared
                            .dropped_since_drain
                            .fetch_add(1, Ordering::Relaxed);
                        debug!(
                            "Ingress full, dropped oldest event for control {}",
                            oldest.control_id
                        );
                    }
                }
                OverflowPolicy::Reject => {
                    self.shared.dropped_total.fetch_add(1, Ordering::Relaxed);
                    self.shared
                        .dropped_since_drain
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Ingress full, rejected event for control {}",
                        event.control_id
                    );
                    return Err(IngressError::Full { capacity });
                }
            }
        }

        queue.push_back(event);
        Ok(())
    }

    /// Takes every buffered event, leaving an empty queue behind.
    /// Returns the events and how many were dropped since the previous drain.
    pub(crate) fn drain(&self) -> (Vec<InputEvent>, u64) {
        let events = {
            let mut queue = self.lock_queue();
            mem::take(&mut *queue)
        };
        let dropped = self.shared.dropped_since_drain.swap(0, Ordering::Relaxed);
        (events.into(), dropped)
    }

    pub fn pending(&self) -> usize {
        self.lock_queue().len()
    }

    pub fn dropped_total(&self) -> u64 {
        self.shared.dropped_total.load(Ordering::Relaxed)
    }

    pub fn settings(&self) -> &IngressSettings {
        &self.shared.settings
    }

    // A producer panicking mid-push cannot leave the deque half-written, so a
    // poisoned lock is still safe to use.
    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<InputEvent>> {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
#[path = "tests/event_ingress_tests.rs"]
mod tests;

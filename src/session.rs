//! Interactive session - the explicit owner of all per-session state
//!
//! A session ties the pieces of [`crate::interactive`] together:
//!
//! ```text
//! transport ──► EventIngress ──► Aggregator::do_work ──► TickSnapshot ──► ButtonControl
//!                                                                         │
//!           CommandSink ◄── set_progress / trigger_cooldown ◄─────────────┘
//! ```
//!
//! Nothing here is process-global; hosts and tests create as many sessions as
//! they need and hand views out from them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::SessionSettings;
use crate::controls::{ControlDefinition, ControlId, ControlRegistry, ParticipantId};
use crate::interactive::aggregator::{Aggregator, TickSnapshot};
use crate::interactive::button_control::ButtonControl;
use crate::interactive::cooldown::{CooldownGate, NegativeCooldown};
use crate::interactive::count_state::ButtonCounts;
use crate::interactive::event_ingress::EventIngress;
use crate::transport::{CommandSink, OutboundCommand, TransportError};

/// Errors surfaced by session write operations.
///
/// Reads never fail: a lookup miss reads as zero, false or "not cooling down".
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown control: {0}")]
    UnknownControl(ControlId),

    #[error("Transport unavailable: {0}")]
    TransportUnavailable(#[from] TransportError),
}

impl From<NegativeCooldown> for SessionError {
    fn from(e: NegativeCooldown) -> Self {
        SessionError::InvalidArgument(e.to_string())
    }
}

#[derive(Debug)]
struct SessionShared {
    settings: SessionSettings,
    registry: RwLock<ControlRegistry>,
    aggregator: Aggregator,
    cooldowns: CooldownGate,
    // Last progress value the sink accepted, per control
    progress: Mutex<HashMap<ControlId, f32>>,
    sink: Arc<dyn CommandSink>,
    clock: Arc<dyn Clock>,
}

/// Cheap, cloneable handle to one interactive session
#[derive(Debug, Clone)]
pub struct InteractiveSession {
    shared: Arc<SessionShared>,
}

impl InteractiveSession {
    pub fn new(settings: SessionSettings, sink: Arc<dyn CommandSink>) -> Self {
        Self::with_clock(settings, sink, Arc::new(SystemClock))
    }

    pub fn with_clock(
        settings: SessionSettings,
        sink: Arc<dyn CommandSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!("Creating interactive session with settings: {:?}", settings);
        let ingress = EventIngress::new(settings.ingress.clone());
        let aggregator = Aggregator::new(ingress, settings.tick.clone());

        Self {
            shared: Arc::new(SessionShared {
                settings,
                registry: RwLock::new(ControlRegistry::new()),
                aggregator,
                cooldowns: CooldownGate::new(clock.clone()),
                progress: Mutex::new(HashMap::new()),
                sink,
                clock,
            }),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.shared.settings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.shared.clock
    }

    pub fn register_control(&self, definition: ControlDefinition) {
        self.write_registry().insert(definition);
    }

    pub fn register_controls(&self, definitions: impl IntoIterator<Item = ControlDefinition>) {
        let mut registry = self.write_registry();
        let mut added = 0;
        for definition in definitions {
            registry.insert(definition);
            added += 1;
        }
        info!("Registered {} controls ({} total)", added, registry.len());
    }

    /// Forgets a control together with its cooldown and progress mirror
    pub fn remove_control(&self, control_id: &ControlId) -> Option<Arc<ControlDefinition>> {
        let removed = self.write_registry().remove(control_id);
        if removed.is_some() {
            self.shared.cooldowns.clear(control_id);
            self.lock_progress().remove(control_id);
            info!("Removed control {}", control_id);
        }
        removed
    }

    pub fn definition(&self, control_id: &ControlId) -> Option<Arc<ControlDefinition>> {
        self.read_registry().get(control_id)
    }

    pub fn is_registered(&self, control_id: &ControlId) -> bool {
        self.read_registry().contains(control_id)
    }

    /// Producer handle for transport callbacks
    pub fn ingress(&self) -> EventIngress {
        self.shared.aggregator.ingress().clone()
    }

    /// Applies every buffered event and publishes the new window.
    ///
    /// Call once per host tick. Overlapping calls are serialized.
    pub fn do_work(&self) -> Arc<TickSnapshot> {
        let registry = self.read_registry();
        self.shared.aggregator.do_work(&registry)
    }

    pub fn snapshot(&self) -> Arc<TickSnapshot> {
        self.shared.aggregator.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<TickSnapshot>> {
        self.shared.aggregator.subscribe()
    }

    pub fn button(&self, control_id: &ControlId) -> Option<ButtonControl> {
        self.definition(control_id)
            .map(|definition| ButtonControl::new(self.clone(), definition))
    }

    /// Views of every registered button, sorted by control id
    pub fn buttons(&self) -> Vec<ButtonControl> {
        let registry = self.read_registry();
        let mut ids: Vec<_> = registry.ids().cloned().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| registry.get(&id))
            .map(|definition| ButtonControl::new(self.clone(), definition))
            .collect()
    }

    pub fn buttons_in_scene(&self, scene_id: &str) -> Vec<ButtonControl> {
        self.read_registry()
            .controls_in_scene(scene_id)
            .into_iter()
            .map(|definition| ButtonControl::new(self.clone(), definition))
            .collect()
    }

    /// Counts of the latest window; zero for unknown controls or participants
    pub fn counts(
        &self,
        control_id: &ControlId,
        participant_id: Option<ParticipantId>,
    ) -> ButtonCounts {
        self.snapshot().button_counts(control_id, participant_id)
    }

    /// Starts a cooldown on a control and tells the service about it.
    ///
    /// Last writer wins. The local gate changes only after the sink accepted the
    /// command, and concurrent triggers reach the sink in the order they are
    /// stored. Returns the new expiration in epoch milliseconds.
    pub fn trigger_cooldown(
        &self,
        control_id: &ControlId,
        duration_ms: i64,
    ) -> Result<i64, SessionError> {
        self.ensure_registered(control_id)?;
        self.shared
            .cooldowns
            .trigger_with(control_id, duration_ms, |expiration_ms| {
                self.send(OutboundCommand::SetControlCooldown {
                    control_id: control_id.clone(),
                    expiration_ms,
                })
            })
    }

    pub fn remaining_cooldown(&self, control_id: &ControlId) -> i64 {
        self.shared.cooldowns.remaining_ms(control_id)
    }

    /// Drops cooldown entries that already ran out
    pub fn prune_cooldowns(&self) -> usize {
        let pruned = self.shared.cooldowns.prune_expired();
        if pruned > 0 {
            debug!("Pruned {} expired cooldowns", pruned);
        }
        pruned
    }

    /// Pushes a progress value (0.0 to 1.0) for a control to the service.
    ///
    /// Values outside the range, and NaN, are rejected rather than clamped.
    /// Concurrent calls reach the sink in the order the mirror records them.
    pub fn set_progress(&self, control_id: &ControlId, progress: f32) -> Result<(), SessionError> {
        self.ensure_registered(control_id)?;
        if !(0.0..=1.0).contains(&progress) {
            warn!(
                "Rejected progress {} for control {}: outside 0.0..=1.0",
                progress, control_id
            );
            return Err(SessionError::InvalidArgument(format!(
                "progress must be within 0.0..=1.0, got {progress}"
            )));
        }

        // Held across the send so the mirror matches the last accepted command
        let mut mirror = self.lock_progress();
        self.send(OutboundCommand::SetControlProgress {
            control_id: control_id.clone(),
            progress,
        })?;
        mirror.insert(control_id.clone(), progress);
        debug!("Control {} progress set to {:.3}", control_id, progress);
        Ok(())
    }

    /// Last progress value sent for the control, 0.0 if none was sent
    pub fn progress(&self, control_id: &ControlId) -> f32 {
        self.lock_progress()
            .get(control_id)
            .copied()
            .unwrap_or_default()
    }

    fn ensure_registered(&self, control_id: &ControlId) -> Result<(), SessionError> {
        if self.is_registered(control_id) {
            Ok(())
        } else {
            warn!("Operation on unknown control {}", control_id);
            Err(SessionError::UnknownControl(control_id.clone()))
        }
    }

    fn send(&self, command: OutboundCommand) -> Result<(), SessionError> {
        self.shared.sink.send(command).map_err(|e| {
            error!("Failed to send outbound command: {}", e);
            SessionError::TransportUnavailable(e)
        })
    }

    // The registry is only replaced wholesale per entry, so a poisoned lock
    // still guards a consistent map.
    fn read_registry(&self) -> RwLockReadGuard<'_, ControlRegistry> {
        self.shared
            .registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, ControlRegistry> {
        self.shared
            .registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_progress(&self) -> MutexGuard<'_, HashMap<ControlId, f32>> {
        self.shared
            .progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;

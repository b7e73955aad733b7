use crate::clock::Clock;
use crate::controls::ControlId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cooldown duration must not be negative, got {0}ms")]
pub struct NegativeCooldown(pub i64);

/// Per-control cooldown expirations.
///
/// The gate is advisory: nothing happens when a cooldown runs out, callers ask
/// [`CooldownGate::remaining_ms`] before accepting a trigger.
#[derive(Debug)]
pub struct CooldownGate {
    clock: Arc<dyn Clock>,
    expirations: Mutex<HashMap<ControlId, i64>>,
}

impl CooldownGate {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            expirations: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a cooldown, replacing any running one for the control
    pub fn trigger(
        &self,
        control_id: &ControlId,
        duration_ms: i64,
    ) -> Result<i64, NegativeCooldown> {
        self.trigger_with(control_id, duration_ms, |_| Ok(()))
    }

    /// Starts a cooldown once `publish` accepted the new expiration.
    ///
    /// The gate stays locked from computing the expiration until it is stored,
    /// so concurrent triggers publish and store in the same order. Nothing is
    /// stored when `publish` fails.
    pub fn trigger_with<E>(
        &self,
        control_id: &ControlId,
        duration_ms: i64,
        publish: impl FnOnce(i64) -> Result<(), E>,
    ) -> Result<i64, E>
    where
        E: From<NegativeCooldown>,
    {
        if duration_ms < 0 {
            warn!(
                "Ignoring cooldown for control {}: {}",
                control_id,
                NegativeCooldown(duration_ms)
            );
            return Err(NegativeCooldown(duration_ms).into());
        }

        let mut expirations = self.lock();
        let now_ms = self.clock.now_ms();
        let expiration_ms = now_ms.saturating_add(duration_ms);
        publish(expiration_ms)?;

        expirations.retain(|_, expiration| *expiration > now_ms);
        expirations.insert(control_id.clone(), expiration_ms);
        debug!(
            "Control {} cooling down until {} ({}ms)",
            control_id, expiration_ms, duration_ms
        );
        Ok(expiration_ms)
    }

    /// Milliseconds until the control may trigger again, never negative
    pub fn remaining_ms(&self, control_id: &ControlId) -> i64 {
        let now_ms = self.clock.now_ms();
        self.lock()
            .get(control_id)
            .map_or(0, |expiration| expiration.saturating_sub(now_ms).max(0))
    }

    pub fn expiration_ms(&self, control_id: &ControlId) -> Option<i64> {
        self.lock().get(control_id).copied()
    }

    pub fn clear(&self, control_id: &ControlId) {
        self.lock().remove(control_id);
    }

    /// Removes expired entries, returns how many were removed
    pub fn prune_expired(&self) -> usize {
        let now_ms = self.clock.now_ms();
        let mut expirations = self.lock();
        let before = expirations.len();
        expirations.retain(|_, expiration| *expiration > now_ms);
        before - expirations.len()
    }

    pub fn active_count(&self) -> usize {
        let now_ms = self.clock.now_ms();
        self.lock()
            .values()
            .filter(|expiration| **expiration > now_ms)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ControlId, i64>> {
        self.expirations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
#[path = "tests/cooldown_tests.rs"]
mod tests;

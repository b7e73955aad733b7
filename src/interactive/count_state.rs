use crate::controls::{ControlId, ParticipantId};
use crate::interactive::event_ingress::{EventKind, InputEvent};
use std::collections::HashMap;

/// Down/press/up counters for one window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonCounts {
    pub downs: u32,
    pub presses: u32,
    pub ups: u32,
}

impl ButtonCounts {
    pub fn record(&mut self, kind: EventKind) {
        let counter = match kind {
            EventKind::Down => &mut self.downs,
            EventKind::Press => &mut self.presses,
            EventKind::Up => &mut self.ups,
        };
        *counter = counter.saturating_add(1);
    }

    pub fn went_down(&self) -> bool {
        self.downs > 0
    }

    pub fn is_pressed(&self) -> bool {
        self.presses > 0
    }

    pub fn went_up(&self) -> bool {
        self.ups > 0
    }

    pub fn is_empty(&self) -> bool {
        self.downs == 0 && self.presses == 0 && self.ups == 0
    }
}

/// Aggregate and per-participant counts of one control
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlCounts {
    total: ButtonCounts,
    participants: HashMap<ParticipantId, ButtonCounts>,
    first_event_ms: Option<i64>,
    last_event_ms: Option<i64>,
}

impl ControlCounts {
    fn record(&mut self, participant_id: ParticipantId, kind: EventKind, timestamp_ms: i64) {
        self.total.record(kind);
        self.participants
            .entry(participant_id)
            .or_default()
            .record(kind);

        // Events may arrive out of order, keep the window bounds by value
        self.first_event_ms = Some(
            self.first_event_ms
                .map_or(timestamp_ms, |t| t.min(timestamp_ms)),
        );
        self.last_event_ms = Some(
            self.last_event_ms
                .map_or(timestamp_ms, |t| t.max(timestamp_ms)),
        );
    }

    pub fn total(&self) -> ButtonCounts {
        self.total
    }

    /// Counts of one participant; zero when they sent nothing this window
    pub fn participant(&self, participant_id: ParticipantId) -> ButtonCounts {
        self.participants
            .get(&participant_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn participants(&self) -> impl Iterator<Item = (ParticipantId, ButtonCounts)> + '_ {
        self.participants.iter().map(|(id, counts)| (*id, *counts))
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn first_event_ms(&self) -> Option<i64> {
        self.first_event_ms
    }

    pub fn last_event_ms(&self) -> Option<i64> {
        self.last_event_ms
    }
}

/// Counts of every control that saw input in one tick window.
///
/// Only the aggregator builds one of these; once published inside a snapshot it
/// is never mutated again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountState {
    controls: HashMap<ControlId, ControlCounts>,
}

impl CountState {
    pub(crate) fn apply(&mut self, event: &InputEvent) {
        self.controls
            .entry(event.control_id.clone())
            .or_default()
            .record(event.participant_id, event.kind, event.server_timestamp_ms);
    }

    pub fn control(&self, control_id: &ControlId) -> Option<&ControlCounts> {
        self.controls.get(control_id)
    }

    /// Aggregate counts, or per participant when `participant_id` is given
    pub fn counts(
        &self,
        control_id: &ControlId,
        participant_id: Option<ParticipantId>,
    ) -> ButtonCounts {
        match (self.controls.get(control_id), participant_id) {
            (Some(counts), Some(participant_id)) => counts.participant(participant_id),
            (Some(counts), None) => counts.total(),
            (None, _) => ButtonCounts::default(),
        }
    }

    pub fn active_controls(&self) -> impl Iterator<Item = (&ControlId, &ControlCounts)> {
        self.controls.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/count_state_tests.rs"]
mod tests;

//! Read-only view of one button control
//!
//! A [`ButtonControl`] never stores counts. Every read goes to the session's
//! latest published [`TickSnapshot`], so all views agree within a tick no matter
//! in which order the host queries them.

use std::sync::Arc;

use crate::controls::{ControlDefinition, ControlId, ControlKind, ParticipantId};
use crate::interactive::aggregator::TickSnapshot;
use crate::interactive::count_state::ButtonCounts;
use crate::session::{InteractiveSession, SessionError};

#[derive(Debug, Clone)]
pub struct ButtonControl {
    session: InteractiveSession,
    definition: Arc<ControlDefinition>,
}

impl ButtonControl {
    pub(crate) fn new(session: InteractiveSession, definition: Arc<ControlDefinition>) -> Self {
        Self {
            session,
            definition,
        }
    }

    pub fn control_id(&self) -> &ControlId {
        &self.definition.control_id
    }

    pub fn definition(&self) -> &ControlDefinition {
        &self.definition
    }

    pub fn disabled(&self) -> bool {
        self.definition.disabled
    }

    pub fn help_text(&self) -> &str {
        &self.definition.help_text
    }

    pub fn etag(&self) -> &str {
        &self.definition.etag
    }

    pub fn scene_id(&self) -> &str {
        &self.definition.scene_id
    }

    pub fn button_text(&self) -> &str {
        match &self.definition.kind {
            ControlKind::Button { button_text, .. } => button_text,
        }
    }

    pub fn cost(&self) -> u32 {
        match &self.definition.kind {
            ControlKind::Button { cost, .. } => *cost,
        }
    }

    /// Counts from the latest window, aggregate when `participant_id` is `None`
    pub fn counts(&self, participant_id: Option<ParticipantId>) -> ButtonCounts {
        self.counts_in(&self.session.snapshot(), participant_id)
    }

    /// Counts from a specific window the caller already holds
    pub fn counts_in(
        &self,
        snapshot: &TickSnapshot,
        participant_id: Option<ParticipantId>,
    ) -> ButtonCounts {
        snapshot.button_counts(self.control_id(), participant_id)
    }

    /// Whether any participant pushed the button down in the last window
    pub fn button_down(&self) -> bool {
        self.counts(None).went_down()
    }

    pub fn button_pressed(&self) -> bool {
        self.counts(None).is_pressed()
    }

    /// Whether any participant released the button in the last window
    pub fn button_up(&self) -> bool {
        self.counts(None).went_up()
    }

    pub fn count_of_button_downs(&self) -> u32 {
        self.counts(None).downs
    }

    pub fn count_of_button_presses(&self) -> u32 {
        self.counts(None).presses
    }

    pub fn count_of_button_ups(&self) -> u32 {
        self.counts(None).ups
    }

    pub fn button_down_by(&self, participant_id: ParticipantId) -> bool {
        self.counts(Some(participant_id)).went_down()
    }

    pub fn button_pressed_by(&self, participant_id: ParticipantId) -> bool {
        self.counts(Some(participant_id)).is_pressed()
    }

    pub fn button_up_by(&self, participant_id: ParticipantId) -> bool {
        self.counts(Some(participant_id)).went_up()
    }

    pub fn count_of_button_downs_by(&self, participant_id: ParticipantId) -> u32 {
        self.counts(Some(participant_id)).downs
    }

    pub fn count_of_button_presses_by(&self, participant_id: ParticipantId) -> u32 {
        self.counts(Some(participant_id)).presses
    }

    pub fn count_of_button_ups_by(&self, participant_id: ParticipantId) -> u32 {
        self.counts(Some(participant_id)).ups
    }

    /// Participants that sent anything in the last window
    pub fn participants(&self) -> Vec<(ParticipantId, ButtonCounts)> {
        let snapshot = self.session.snapshot();
        let mut participants: Vec<_> = snapshot
            .counts()
            .control(self.control_id())
            .map(|counts| counts.participants().collect())
            .unwrap_or_default();
        participants.sort_by_key(|(id, _)| *id);
        participants
    }

    /// Milliseconds before the button may be triggered again
    pub fn remaining_cooldown(&self) -> i64 {
        self.session.remaining_cooldown(self.control_id())
    }

    /// Last progress value sent for this button (not confirmed by the service)
    pub fn progress(&self) -> f32 {
        self.session.progress(self.control_id())
    }

    pub fn set_progress(&self, progress: f32) -> Result<(), SessionError> {
        self.session.set_progress(self.control_id(), progress)
    }

    pub fn trigger_cooldown(&self, duration_ms: i64) -> Result<i64, SessionError> {
        self.session.trigger_cooldown(self.control_id(), duration_ms)
    }
}

//! Control identities and definitions
//!
//! Definitions come from an external scene source; this module only models them
//! and keeps the registry a session consults when routing events and commands.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Immutable identifier of a control
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlId(Arc<str>);

impl ControlId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ControlId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ControlId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

/// Remote participant identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ParticipantId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlKind {
    Button {
        button_text: String,
        /// Spark cost charged by the service when the button is triggered
        cost: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDefinition {
    pub control_id: ControlId,
    pub disabled: bool,
    pub help_text: String,
    /// Version stamp of the definition source
    pub etag: String,
    pub scene_id: String,
    #[serde(flatten)]
    pub kind: ControlKind,
}

impl ControlDefinition {
    pub fn button(
        control_id: impl Into<ControlId>,
        scene_id: impl Into<String>,
        button_text: impl Into<String>,
        cost: u32,
    ) -> Self {
        Self {
            control_id: control_id.into(),
            disabled: false,
            help_text: String::new(),
            etag: String::new(),
            scene_id: scene_id.into(),
            kind: ControlKind::Button {
                button_text: button_text.into(),
                cost,
            },
        }
    }

    pub fn with_help_text(mut self, help_text: impl Into<String>) -> Self {
        self.help_text = help_text.into();
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = etag.into();
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

/// Controls known to the active session
#[derive(Debug, Default, Clone)]
pub struct ControlRegistry {
    controls: HashMap<ControlId, Arc<ControlDefinition>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition, replacing an older one with the same id.
    /// Returns the replaced definition.
    pub fn insert(&mut self, definition: ControlDefinition) -> Option<Arc<ControlDefinition>> {
        let id = definition.control_id.clone();
        let previous = self.controls.insert(id.clone(), Arc::new(definition));
        match &previous {
            Some(old) => warn!("Replaced definition of control {} (etag {})", id, old.etag),
            None => debug!("Registered control {}", id),
        }
        previous
    }

    pub fn remove(&mut self, control_id: &ControlId) -> Option<Arc<ControlDefinition>> {
        self.controls.remove(control_id)
    }

    pub fn get(&self, control_id: &ControlId) -> Option<Arc<ControlDefinition>> {
        self.controls.get(control_id).cloned()
    }

    pub fn contains(&self, control_id: &ControlId) -> bool {
        self.controls.contains_key(control_id)
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ControlId> {
        self.controls.keys()
    }

    /// Controls belonging to one scene, sorted by id
    pub fn controls_in_scene(&self, scene_id: &str) -> Vec<Arc<ControlDefinition>> {
        let mut in_scene: Vec<_> = self
            .controls
            .values()
            .filter(|definition| definition.scene_id == scene_id)
            .cloned()
            .collect();
        in_scene.sort_by(|a, b| a.control_id.cmp(&b.control_id));
        in_scene
    }
}

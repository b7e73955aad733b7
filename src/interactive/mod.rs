//! Interaction-event aggregation for button controls
//!
//! Processing pipeline:
//!
//! 1. [`event_ingress`] - Bounded, thread-safe buffer fed by transport callbacks
//! 2. [`aggregator`] - Per-tick drain/count/publish pass (`do_work`)
//! 3. [`count_state`] - Aggregate and per-participant counters of one window
//! 4. [`cooldown`] - Advisory per-control cooldown gate
//! 5. [`button_control`] - Read-only views handed to the host
//!
//! # Architecture
//!
//! ```text
//! Participants ──► Ingress ──► Aggregator ──► TickSnapshot ──► ButtonControl
//!                  (buffer)    (do_work)      (watch channel)   (reads)
//! ```
//!
//! Producers only ever touch the ingress. The aggregator is the single writer of
//! count windows and readers switch between windows atomically.

pub mod aggregator;
pub mod button_control;
pub mod cooldown;
pub mod count_state;
pub mod event_ingress;

pub use aggregator::{Aggregator, TickReport, TickSnapshot};
pub use button_control::ButtonControl;
pub use cooldown::CooldownGate;
pub use count_state::{ButtonCounts, ControlCounts, CountState};
pub use event_ingress::{EventIngress, EventKind, IngressError, InputEvent};

//! Aggregates asynchronous participant input on interactive broadcast controls
//! into deterministic, tick-aligned snapshots.
//!
//! ```text
//! controls/     - control identities, definitions, registry
//! interactive/  - ingress, counting pass, cooldowns, button views
//! session       - explicit session object owning all of the above
//! transport     - outbound command sink
//! config        - TOML session settings
//! clock         - injectable epoch-millisecond clock
//! ```

pub mod clock;
pub mod config;
pub mod controls;
pub mod interactive;
pub mod session;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{OverflowPolicy, SessionSettings};
pub use controls::{ControlDefinition, ControlId, ControlKind, ParticipantId};
pub use interactive::{ButtonControl, ButtonCounts, EventKind, TickReport, TickSnapshot};
pub use session::{InteractiveSession, SessionError};
pub use transport::{ChannelCommandSink, CommandSink, OutboundCommand, TransportError};

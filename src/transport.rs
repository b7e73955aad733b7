//! Outbound command path
//!
//! The wire transport lives outside this crate. Sessions hand commands to a
//! [`CommandSink`] and never wait for acknowledgement; a sink that cannot take a
//! command reports it so the caller can decide whether to retry.

use crate::controls::ControlId;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Commands sent downstream to the interactive service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum OutboundCommand {
    SetControlProgress {
        control_id: ControlId,
        progress: f32,
    },
    SetControlCooldown {
        control_id: ControlId,
        /// Absolute expiration in epoch milliseconds
        expiration_ms: i64,
    },
}

impl OutboundCommand {
    pub fn control_id(&self) -> &ControlId {
        match self {
            Self::SetControlProgress { control_id, .. } => control_id,
            Self::SetControlCooldown { control_id, .. } => control_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Outbound command buffer is full")]
    Full,

    #[error("Outbound command channel is closed")]
    Closed,
}

/// Fire-and-forget sink for outbound commands
pub trait CommandSink: Send + Sync + fmt::Debug {
    fn send(&self, command: OutboundCommand) -> Result<(), TransportError>;
}

/// Sink backed by a bounded tokio channel; the receiving half belongs to the transport
#[derive(Debug, Clone)]
pub struct ChannelCommandSink {
    sender: mpsc::Sender<OutboundCommand>,
}

impl ChannelCommandSink {
    pub fn new(sender: mpsc::Sender<OutboundCommand>) -> Self {
        Self { sender }
    }

    /// Creates a sink together with the receiver the transport should drain
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundCommand>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        debug!("Created outbound command channel with capacity {}", capacity);
        (Self::new(sender), receiver)
    }
}

impl CommandSink for ChannelCommandSink {
    fn send(&self, command: OutboundCommand) -> Result<(), TransportError> {
        match self.sender.try_send(command) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(command)) => {
                error!(
                    "Dropping command for control {}: outbound buffer full",
                    command.control_id()
                );
                Err(TransportError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(command)) => {
                error!(
                    "Dropping command for control {}: transport closed",
                    command.control_id()
                );
                Err(TransportError::Closed)
            }
        }
    }
}

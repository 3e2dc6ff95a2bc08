//! # Events
//!
//! Observability sink the reconciler reports outcomes to.
//!
//! Recording is fire-and-forget: an [`EventSink`] must never block the
//! reconciler. [`ChannelEventSink`] pushes into a bounded channel and drops
//! events when it is full; a background task (see `k8s::recorder`) drains the
//! channel into Kubernetes Events.

use crate::resource::ResourceIdentity;
use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Reason attached to a successful reconciliation
pub const REASON_SYNCED: &str = "Synced";

/// Reason attached to a failed replica mutation
pub const REASON_SCALE_FAILED: &str = "ScaleFailed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("Normal"),
            Self::Warning => f.write_str("Warning"),
        }
    }
}

/// One recorded outcome: subject, severity, reason code and message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerEvent {
    pub subject: ResourceIdentity,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
}

impl ControllerEvent {
    pub fn normal(
        subject: ResourceIdentity,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            subject,
            event_type: EventType::Normal,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn warning(
        subject: ResourceIdentity,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            subject,
            event_type: EventType::Warning,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Destination for reconciliation events
pub trait EventSink: Send + Sync {
    /// Record an event without waiting for it to be persisted
    fn record(&self, event: ControllerEvent);
}

/// [`EventSink`] backed by a bounded mpsc channel
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::Sender<ControllerEvent>,
}

impl ChannelEventSink {
    /// Create a sink and the receiver its events arrive on
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ControllerEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn record(&self, event: ControllerEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(
                    resource = %event.subject,
                    reason = %event.reason,
                    "event buffer full, dropping event"
                );
            }
            Err(TrySendError::Closed(event)) => {
                warn!(
                    resource = %event.subject,
                    reason = %event.reason,
                    "event publisher stopped, dropping event"
                );
            }
        }
    }
}

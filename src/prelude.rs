//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use replica_controller::prelude::*;
//! ```

// Engine
pub use crate::cache::ResourceCache;
pub use crate::controller::{
    Controller, ControllerError, ControllerOptions, ControllerState, SyncPolicy,
};
pub use crate::queue::{QueueItem, RateLimiter, WorkQueue};
pub use crate::reconciler::{
    ReconcileError, ReconcileOutcome, Reconciler, ReplicaScaler, ScaleError,
};
pub use crate::translator::{EventTranslator, Notification, SourceEvent};

// Data model
pub use crate::resource::{
    ReplicaState, ResourceIdentity, ResourcePayload, ResourceSnapshot, TranslationError,
};

// Observability sink
pub use crate::events::{ChannelEventSink, ControllerEvent, EventSink, EventType};

// Config
pub use crate::config::{Cli, ControllerConfig};

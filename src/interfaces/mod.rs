//! Abstract interfaces for periscope components.
//!
//! These traits define the contracts for:
//! - Event storage (retention aggregates)
//! - Action definitions (named multi-step event filters)
//! - Session recording storage (snapshot events and recording aggregates)

pub mod action_store;
pub mod event_store;
pub mod recording_store;

pub use action_store::ActionStore;
pub use event_store::{EventRecord, EventStore, Result, StorageError};
pub use recording_store::{RecordingEvent, RecordingStore};

/// Tenant identifier. Every store call is scoped to exactly one team.
pub type TeamId = i64;

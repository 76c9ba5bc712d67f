//! Shared storage integration tests.
//!
//! Tests the EventStore, ActionStore and RecordingStore interfaces against
//! all implementations. Each implementation module imports these test
//! functions and runs them. Every test uses its own team id so the suites
//! can share one database.

pub mod action_store_tests;
pub mod event_store_tests;
pub mod recording_store_tests;

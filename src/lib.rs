//! Periscope - product analytics query core
//!
//! Computes retention cohort matrices from stored events and reconstructs
//! session recordings from chunked snapshot streams, correlating them back
//! to abstract sessions.

pub mod config;
pub mod interfaces;
pub mod replay;
pub mod retention;
pub mod services;
pub mod storage;
pub mod utils;

//! Pure utility functions.
//!
//! These are stateless helper functions used across the codebase.

pub mod bootstrap;

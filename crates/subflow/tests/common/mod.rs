//! Shared test utilities for subflow integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated jobs with temp input/output folders
//! - stub collaborators that record calls and can fail or block on demand

pub mod harness;
pub mod stubs;

pub use harness::TestHarness;
pub use stubs::*;

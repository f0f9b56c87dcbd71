//! Shared test utilities for clearview integration tests.
//!
//! This module provides:
//! - `TestHarness` wrapping a workspace around a scripted fake processor
//! - Builders for intake batches

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{eventually, ScriptedProcessor, TestHarness};

//! Shared test utilities for confmirror integration tests.
//!
//! This module provides:
//! - `MirrorHarness` for an isolated store and template directory
//! - `RunningMirror` to drive a coordinator and wait on its events

pub mod harness;

pub use harness::{wait_until, MirrorHarness};

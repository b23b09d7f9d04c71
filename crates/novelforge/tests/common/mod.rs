//! Shared test utilities for novelforge integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring an `Engine` to a temp output directory
//! - Fake capabilities that persist through the real library

pub mod fakes;
pub mod harness;

pub use fakes::{FakeBinder, FakeFetcher, FakeSite, RecordingMailer};
pub use harness::TestHarness;

// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Concierge integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockChannel`] - Mock messaging channel with captured sends and scripted media
//! - [`MockResponder`] - Mock AI responder with queued replies
//! - [`MockSpeech`] / [`MockVision`] - Mock media collaborators
//! - [`TestHarness`] - Full router over a temp SQLite database

pub mod harness;
pub mod mock_channel;
pub mod mock_media;
pub mod mock_responder;

pub use harness::TestHarness;
pub use mock_channel::MockChannel;
pub use mock_media::{MockSpeech, MockVision};
pub use mock_responder::MockResponder;

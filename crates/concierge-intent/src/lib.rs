// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword intent detection for the message router.
//!
//! Both detectors are pure: no network, no state, no allocation beyond the
//! lowercased input.

pub mod faq;
pub mod phrases;

pub use faq::{FaqMatch, FaqMatcher};
pub use phrases::PhraseDetector;

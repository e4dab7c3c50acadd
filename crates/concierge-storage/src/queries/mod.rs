// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table family.

pub mod activities;
pub mod conversations;
pub mod escalations;
pub mod snapshots;

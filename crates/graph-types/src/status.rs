// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Categorized status codes shared by every error type in the workspace.
//!
//! Rust callers work with per-crate `thiserror` enums; each of those
//! exposes a `status()` accessor mapping the concrete failure onto one of
//! these categories. The categories — not the Rust enums — are the stable
//! contract of the public surface.

use std::fmt;

/// The error category of a failed runtime call.
///
/// Success is represented by `Ok(_)` on the Rust side and has no variant
/// here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// An allocation failed.
    OutOfMemory,
    /// An asynchronous request has not completed yet.
    Incomplete,
    /// A required value was absent.
    UnexpectedNull,
    /// A semantic violation: bad type, bad dimension, cyclic graph, …
    BadData,
    /// A kernel or driver reported a failure.
    OpFailed,
    /// A client-provided memory region could not be mapped.
    Unmappable,
    /// The call is not legal in the object's current phase.
    BadState,
    /// The compilation deadline fired; retrying may succeed.
    MissedDeadlineTransient,
    /// The compilation deadline fired; retrying will not help.
    MissedDeadlinePersistent,
    /// A resource limit was hit; retrying may succeed.
    ResourceExhaustedTransient,
    /// A resource limit was hit; retrying will not help.
    ResourceExhaustedPersistent,
}

impl Status {
    /// Returns the stable label for this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutOfMemory => "out_of_memory",
            Self::Incomplete => "incomplete",
            Self::UnexpectedNull => "unexpected_null",
            Self::BadData => "bad_data",
            Self::OpFailed => "op_failed",
            Self::Unmappable => "unmappable",
            Self::BadState => "bad_state",
            Self::MissedDeadlineTransient => "missed_deadline_transient",
            Self::MissedDeadlinePersistent => "missed_deadline_persistent",
            Self::ResourceExhaustedTransient => "resource_exhausted_transient",
            Self::ResourceExhaustedPersistent => "resource_exhausted_persistent",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

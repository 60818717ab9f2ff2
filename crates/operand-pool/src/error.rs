// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for operand value storage.

use graph_types::Status;

/// Errors raised by the value arena, memory regions, and the tracker.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// A referenced range falls outside the memory region.
    #[error("range [{offset}, {offset}+{length}) outside memory of {size} bytes")]
    RangeOutOfBounds { offset: u32, length: u32, size: usize },

    /// A zero-length constant reference.
    #[error("constant reference must have non-zero length")]
    ZeroLength,

    /// The arena or a consolidated pool outgrew the 32-bit location width.
    #[error("value storage exceeds the 32-bit offset space ({0} bytes)")]
    StorageExhausted(usize),

    /// The tracker hit the pool-index cap.
    #[error("too many distinct memory pools ({0})")]
    TooManyMemories(usize),

    /// A client file could not be read into a memory region.
    #[error("cannot map client memory: {0}")]
    Unmappable(#[from] std::io::Error),
}

impl PoolError {
    /// Maps this error onto its stable status category.
    pub fn status(&self) -> Status {
        match self {
            Self::RangeOutOfBounds { .. } | Self::ZeroLength | Self::TooManyMemories(_) => {
                Status::BadData
            }
            Self::StorageExhausted(_) => Status::OutOfMemory,
            Self::Unmappable(_) => Status::Unmappable,
        }
    }
}

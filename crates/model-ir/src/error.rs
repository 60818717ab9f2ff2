// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for graph construction and finalization.

use graph_types::{FeatureLevel, LifeTime, Status};

/// Errors that can occur while building or finishing a model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A previous `add_operation` failure invalidated the builder.
    #[error("{op} called on an invalidated model builder")]
    Invalidated { op: &'static str },

    /// `identify_inputs_and_outputs` may be called exactly once.
    #[error("inputs and outputs were already identified")]
    IoAlreadyIdentified,

    /// An operand index points past the operand table.
    #[error("operand {index} out of range ({count} operands)")]
    OperandOutOfRange { index: u32, count: u32 },

    /// The operand table hit its cap.
    #[error("too many operands ({0})")]
    TooManyOperands(u32),

    /// The operation list hit its cap.
    #[error("too many operations ({0})")]
    TooManyOperations(u32),

    /// An operand was added with non-default lifetime, location, or
    /// extra parameters.
    #[error("operand {index} must be added as a plain temporary")]
    NotPristine { index: u32 },

    /// An illegal lifetime transition was requested.
    #[error("operand {index}: illegal lifetime transition {from:?} -> {to:?}")]
    LifetimeViolation {
        index: u32,
        from: LifeTime,
        to: LifeTime,
    },

    /// A value was set on a tensor with unspecified extents.
    #[error("operand {index} is not fully specified")]
    NotFullySpecified { index: u32 },

    /// The value length does not match the computed operand size.
    #[error("operand {index}: value is {actual} bytes, type requires {expected}")]
    SizeMismatch {
        index: u32,
        expected: usize,
        actual: usize,
    },

    /// Per-channel parameters on a non-per-channel type.
    #[error("operand {index} does not take per-channel quantization")]
    NotPerChannel { index: u32 },

    /// The channel dimension is out of rank or unspecified.
    #[error("operand {index}: channel dim {channel_dim} invalid for rank {rank}")]
    BadChannelDim {
        index: u32,
        channel_dim: u32,
        rank: usize,
    },

    /// Scale count must equal the channel extent.
    #[error("operand {index}: {actual} scales for channel extent {expected}")]
    ChannelCountMismatch {
        index: u32,
        expected: u32,
        actual: usize,
    },

    /// A per-channel scale must be positive.
    #[error("operand {index}: per-channel scale {scale} at channel {channel} must be > 0")]
    BadChannelScale {
        index: u32,
        channel: usize,
        scale: f32,
    },

    /// Extension data on a non-extension operand.
    #[error("operand {index} is not an extension type")]
    NotExtensionType { index: u32 },

    /// A subgraph reference on a non-subgraph operand.
    #[error("operand {index} is not a subgraph reference type")]
    NotSubgraphType { index: u32 },

    /// An operation output must be writable.
    #[error("operation output operand {index} has lifetime {lifetime:?}")]
    OutputNotWritable { index: u32, lifetime: LifeTime },

    /// An operand appears more than once across the I/O lists.
    #[error("operand {index} duplicated in the input/output lists")]
    DuplicateIo { index: u32 },

    /// Two operations write the same operand.
    #[error("operand {index} is written by more than one operation")]
    MultipleWriters { index: u32 },

    /// The graph contains a cycle or a never-written operand.
    #[error("graph contains at least one cycle or one never-written operand")]
    CyclicGraph,

    /// A model output is never written by any operation.
    #[error("model output operand {index} is never written")]
    UnwrittenOutput { index: u32 },

    /// The model requires a newer runtime than this one.
    #[error("model requires feature level {required}, runtime supports {supported}")]
    VersionTooNew {
        required: FeatureLevel,
        supported: FeatureLevel,
    },

    /// A type-system failure.
    #[error(transparent)]
    Type(#[from] graph_types::TypeError),

    /// A value-storage failure.
    #[error(transparent)]
    Pool(#[from] operand_pool::PoolError),

    /// A structural operation-validation failure.
    #[error(transparent)]
    Op(#[from] op_registry::OpError),
}

impl ModelError {
    /// Maps this error onto its stable status category.
    pub fn status(&self) -> Status {
        match self {
            Self::Invalidated { .. } | Self::IoAlreadyIdentified => Status::BadState,
            Self::Type(e) => e.status(),
            Self::Pool(e) => e.status(),
            Self::Op(e) => e.status(),
            _ => Status::BadData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ModelError::Invalidated { op: "add_operand" }.status(),
            Status::BadState
        );
        assert_eq!(ModelError::CyclicGraph.status(), Status::BadData);
        let pool = ModelError::Pool(operand_pool::PoolError::StorageExhausted(1));
        assert_eq!(pool.status(), Status::OutOfMemory);
    }
}

// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for operation validation, preparation, and execution.

use graph_types::Status;

/// Errors raised by operation entries.
#[derive(Debug, thiserror::Error)]
pub enum OpError {
    /// The operation code has no registered entry.
    #[error("operation {0} is not registered")]
    UnregisteredOperation(String),

    /// Wrong number of inputs.
    #[error("{operation} expects {expected} inputs, got {actual}")]
    WrongInputCount {
        operation: String,
        expected: String,
        actual: usize,
    },

    /// Wrong number of outputs.
    #[error("{operation} expects {expected} outputs, got {actual}")]
    WrongOutputCount {
        operation: String,
        expected: usize,
        actual: usize,
    },

    /// An operand has the wrong type for its slot.
    #[error("{operation} input {index} must be {expected}, got {actual}")]
    WrongOperandType {
        operation: String,
        index: usize,
        expected: String,
        actual: String,
    },

    /// A required operand was omitted.
    #[error("{operation} input {index} is omitted but the operation does not allow it")]
    OmittedOperand { operation: String, index: usize },

    /// Input shapes cannot be combined.
    #[error("{operation}: incompatible shapes {lhs:?} and {rhs:?}")]
    IncompatibleShapes {
        operation: String,
        lhs: Vec<u32>,
        rhs: Vec<u32>,
    },

    /// A zero-sized input reached an operation that rejects them.
    #[error("{operation} input {index} has zero elements")]
    ZeroSizedInput { operation: String, index: usize },

    /// The kernel failed at execution time.
    #[error("{operation} kernel failed: {detail}")]
    KernelFailed { operation: String, detail: String },
}

impl OpError {
    /// Maps this error onto its stable status category.
    pub fn status(&self) -> Status {
        match self {
            Self::KernelFailed { .. } => Status::OpFailed,
            _ => Status::BadData,
        }
    }
}

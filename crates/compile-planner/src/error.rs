// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for compilation and planning.

use graph_types::Status;

/// Errors that can occur while compiling a model into a plan.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The candidate device list is empty.
    #[error("compilation requires at least one device")]
    NoDevices,

    /// No offered device supports an operation and fallback is barred.
    #[error("no device supports operation {operation} at position {position}")]
    UnsupportedOperation { operation: String, position: usize },

    /// A plan query used an out-of-range I/O index.
    #[error("{role} index {index} out of range ({count})")]
    IoIndexOutOfRange {
        role: &'static str,
        index: usize,
        count: usize,
    },

    /// Cache file descriptors could not be duplicated.
    #[error("cannot duplicate cache file: {0}")]
    CacheIo(#[from] std::io::Error),

    /// The configuration file is malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A device failed while preparing a model or step.
    #[error(transparent)]
    Device(#[from] device_registry::DeviceError),

    /// Sub-model extraction failed.
    #[error(transparent)]
    Model(#[from] model_ir::ModelError),
}

impl CompileError {
    /// Maps this error onto its stable status category.
    pub fn status(&self) -> Status {
        match self {
            Self::NoDevices => Status::UnexpectedNull,
            Self::UnsupportedOperation { .. } | Self::IoIndexOutOfRange { .. } => Status::BadData,
            Self::CacheIo(_) => Status::UnexpectedNull,
            Self::Config(_) => Status::BadData,
            Self::Device(e) => e.status(),
            Self::Model(e) => e.status(),
        }
    }
}

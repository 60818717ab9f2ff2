// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operation descriptors.
//!
//! An [`Operation`] connects input operands to output operands. Its
//! [`OperationType`] determines the expected arities and operand-type
//! patterns; structural validation itself lives in the operation
//! registry.

use crate::extension::{decompose_type_id, is_extension_code};
use crate::FeatureLevel;

/// The kind of computation an operation performs, with its stable code.
///
/// Base codes are densely packed from 0; the legacy OEM band starts at
/// 10000; extension operations carry a composed 32-bit id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum OperationType {
    Add,
    AveragePool2d,
    Concatenation,
    Conv2d,
    DepthwiseConv2d,
    DepthToSpace,
    Dequantize,
    FullyConnected,
    L2Normalization,
    L2Pool2d,
    LocalResponseNormalization,
    Logistic,
    MaxPool2d,
    Mul,
    Relu,
    Relu6,
    Reshape,
    ResizeBilinear,
    Softmax,
    SpaceToDepth,
    Tanh,
    BatchToSpaceNd,
    Div,
    Pad,
    SpaceToBatchNd,
    Sub,
    Transpose,
    ResizeNearestNeighbor,
    /// Legacy OEM operation. Deprecated; use extensions instead.
    OemOperation,
    /// An extension operation, identified by its composed 32-bit id.
    Extension(u32),
}

impl OperationType {
    /// Decodes a numeric operation code.
    pub fn from_code(code: u32) -> Option<Self> {
        if is_extension_code(code) {
            return Some(Self::Extension(code));
        }
        match code {
            0 => Some(Self::Add),
            1 => Some(Self::AveragePool2d),
            2 => Some(Self::Concatenation),
            3 => Some(Self::Conv2d),
            4 => Some(Self::DepthwiseConv2d),
            5 => Some(Self::DepthToSpace),
            6 => Some(Self::Dequantize),
            9 => Some(Self::FullyConnected),
            11 => Some(Self::L2Normalization),
            12 => Some(Self::L2Pool2d),
            13 => Some(Self::LocalResponseNormalization),
            14 => Some(Self::Logistic),
            17 => Some(Self::MaxPool2d),
            18 => Some(Self::Mul),
            19 => Some(Self::Relu),
            21 => Some(Self::Relu6),
            22 => Some(Self::Reshape),
            23 => Some(Self::ResizeBilinear),
            25 => Some(Self::Softmax),
            26 => Some(Self::SpaceToDepth),
            28 => Some(Self::Tanh),
            29 => Some(Self::BatchToSpaceNd),
            30 => Some(Self::Div),
            32 => Some(Self::Pad),
            33 => Some(Self::SpaceToBatchNd),
            36 => Some(Self::Sub),
            37 => Some(Self::Transpose),
            94 => Some(Self::ResizeNearestNeighbor),
            10000 => Some(Self::OemOperation),
            _ => None,
        }
    }

    /// Returns the stable numeric code.
    pub fn code(&self) -> u32 {
        match self {
            Self::Add => 0,
            Self::AveragePool2d => 1,
            Self::Concatenation => 2,
            Self::Conv2d => 3,
            Self::DepthwiseConv2d => 4,
            Self::DepthToSpace => 5,
            Self::Dequantize => 6,
            Self::FullyConnected => 9,
            Self::L2Normalization => 11,
            Self::L2Pool2d => 12,
            Self::LocalResponseNormalization => 13,
            Self::Logistic => 14,
            Self::MaxPool2d => 17,
            Self::Mul => 18,
            Self::Relu => 19,
            Self::Relu6 => 21,
            Self::Reshape => 22,
            Self::ResizeBilinear => 23,
            Self::Softmax => 25,
            Self::SpaceToDepth => 26,
            Self::Tanh => 28,
            Self::BatchToSpaceNd => 29,
            Self::Div => 30,
            Self::Pad => 32,
            Self::SpaceToBatchNd => 33,
            Self::Sub => 36,
            Self::Transpose => 37,
            Self::ResizeNearestNeighbor => 94,
            Self::OemOperation => 10000,
            Self::Extension(id) => *id,
        }
    }

    /// Returns `true` for extension operations.
    pub fn is_extension(&self) -> bool {
        matches!(self, Self::Extension(_))
    }

    /// Returns `true` for the legacy OEM operation.
    pub fn is_oem(&self) -> bool {
        matches!(self, Self::OemOperation)
    }

    /// The extension prefix, for extension operations.
    pub fn extension_prefix(&self) -> Option<u16> {
        match self {
            Self::Extension(id) => Some(decompose_type_id(*id).0),
            _ => None,
        }
    }

    /// The feature level that introduced this operation.
    pub fn feature_level(&self) -> FeatureLevel {
        match self {
            Self::BatchToSpaceNd | Self::Div | Self::Pad | Self::SpaceToBatchNd
            | Self::Sub | Self::Transpose => FeatureLevel::V1_1,
            Self::ResizeNearestNeighbor | Self::Extension(_) => FeatureLevel::V1_2,
            _ => FeatureLevel::V1_0,
        }
    }

    /// Returns a human-readable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::AveragePool2d => "AVERAGE_POOL_2D",
            Self::Concatenation => "CONCATENATION",
            Self::Conv2d => "CONV_2D",
            Self::DepthwiseConv2d => "DEPTHWISE_CONV_2D",
            Self::DepthToSpace => "DEPTH_TO_SPACE",
            Self::Dequantize => "DEQUANTIZE",
            Self::FullyConnected => "FULLY_CONNECTED",
            Self::L2Normalization => "L2_NORMALIZATION",
            Self::L2Pool2d => "L2_POOL_2D",
            Self::LocalResponseNormalization => "LOCAL_RESPONSE_NORMALIZATION",
            Self::Logistic => "LOGISTIC",
            Self::MaxPool2d => "MAX_POOL_2D",
            Self::Mul => "MUL",
            Self::Relu => "RELU",
            Self::Relu6 => "RELU6",
            Self::Reshape => "RESHAPE",
            Self::ResizeBilinear => "RESIZE_BILINEAR",
            Self::Softmax => "SOFTMAX",
            Self::SpaceToDepth => "SPACE_TO_DEPTH",
            Self::Tanh => "TANH",
            Self::BatchToSpaceNd => "BATCH_TO_SPACE_ND",
            Self::Div => "DIV",
            Self::Pad => "PAD",
            Self::SpaceToBatchNd => "SPACE_TO_BATCH_ND",
            Self::Sub => "SUB",
            Self::Transpose => "TRANSPOSE",
            Self::ResizeNearestNeighbor => "RESIZE_NEAREST_NEIGHBOR",
            Self::OemOperation => "OEM_OPERATION",
            Self::Extension(_) => "EXTENSION",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Extension(id) => {
                let (prefix, inner) = decompose_type_id(*id);
                write!(f, "EXTENSION({prefix:#06x}, {inner})")
            }
            other => f.write_str(other.as_str()),
        }
    }
}

/// A computation connecting input operands to output operands.
///
/// Indices point into the owning subgraph's operand table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub operation_type: OperationType,
    pub inputs: Vec<u32>,
    pub outputs: Vec<u32>,
}

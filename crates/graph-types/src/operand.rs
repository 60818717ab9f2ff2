// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operand descriptors: types, lifetimes, locations, quantization.
//!
//! An [`Operand`] is a typed node in a computation graph — a tensor, a
//! scalar, a constant, a subgraph reference, or an I/O placeholder. The
//! [`LifeTime`] classifies where its data comes from; the
//! [`DataLocation`] points into a value arena or memory pool for
//! constants and is ignored otherwise.

use crate::extension::{decompose_type_id, is_extension_code};
use crate::FeatureLevel;

// ── Operand types ──────────────────────────────────────────────────

/// The element type of an operand, with its stable numeric code.
///
/// Base scalar and tensor types occupy the low code space; the legacy OEM
/// band starts at 10000; extension types carry a composed 32-bit id
/// (`(prefix << 16) | inner_code`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum OperandType {
    /// A 32-bit float scalar.
    Float32,
    /// A signed 32-bit integer scalar.
    Int32,
    /// An unsigned 32-bit integer scalar.
    UInt32,
    /// A tensor of 32-bit floats.
    TensorFloat32,
    /// A tensor of signed 32-bit integers.
    TensorInt32,
    /// A tensor of 8-bit asymmetrically quantized unsigned values.
    TensorQuant8Asymm,
    /// A boolean scalar.
    Bool,
    /// A tensor of 16-bit symmetrically quantized signed values.
    TensorQuant16Symm,
    /// A tensor of 16-bit floats.
    TensorFloat16,
    /// A tensor of 8-bit booleans.
    TensorBool8,
    /// A 16-bit float scalar.
    Float16,
    /// A tensor of 8-bit symmetrically quantized values with per-channel scales.
    TensorQuant8SymmPerChannel,
    /// A tensor of 16-bit asymmetrically quantized unsigned values.
    TensorQuant16Asymm,
    /// A tensor of 8-bit symmetrically quantized signed values.
    TensorQuant8Symm,
    /// A tensor of 8-bit asymmetrically quantized signed values.
    TensorQuant8AsymmSigned,
    /// A reference to a subgraph.
    Subgraph,
    /// Legacy OEM scalar. Deprecated; use extensions instead.
    OemScalar,
    /// Legacy opaque OEM byte tensor. Size checks are skipped for this type.
    TensorOemByte,
    /// An extension type, identified by its composed 32-bit id.
    Extension(u32),
}

impl OperandType {
    /// Decodes a numeric type code.
    ///
    /// Codes above 16 bits are extension ids and always decode; unknown
    /// codes in the base space return `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        if is_extension_code(code) {
            return Some(Self::Extension(code));
        }
        match code {
            0 => Some(Self::Float32),
            1 => Some(Self::Int32),
            2 => Some(Self::UInt32),
            3 => Some(Self::TensorFloat32),
            4 => Some(Self::TensorInt32),
            5 => Some(Self::TensorQuant8Asymm),
            6 => Some(Self::Bool),
            7 => Some(Self::TensorQuant16Symm),
            8 => Some(Self::TensorFloat16),
            9 => Some(Self::TensorBool8),
            10 => Some(Self::Float16),
            11 => Some(Self::TensorQuant8SymmPerChannel),
            12 => Some(Self::TensorQuant16Asymm),
            13 => Some(Self::TensorQuant8Symm),
            14 => Some(Self::TensorQuant8AsymmSigned),
            15 => Some(Self::Subgraph),
            10000 => Some(Self::OemScalar),
            10001 => Some(Self::TensorOemByte),
            _ => None,
        }
    }

    /// Returns the stable numeric code.
    pub fn code(&self) -> u32 {
        match self {
            Self::Float32 => 0,
            Self::Int32 => 1,
            Self::UInt32 => 2,
            Self::TensorFloat32 => 3,
            Self::TensorInt32 => 4,
            Self::TensorQuant8Asymm => 5,
            Self::Bool => 6,
            Self::TensorQuant16Symm => 7,
            Self::TensorFloat16 => 8,
            Self::TensorBool8 => 9,
            Self::Float16 => 10,
            Self::TensorQuant8SymmPerChannel => 11,
            Self::TensorQuant16Asymm => 12,
            Self::TensorQuant8Symm => 13,
            Self::TensorQuant8AsymmSigned => 14,
            Self::Subgraph => 15,
            Self::OemScalar => 10000,
            Self::TensorOemByte => 10001,
            Self::Extension(id) => *id,
        }
    }

    /// Returns `true` for extension types.
    pub fn is_extension(&self) -> bool {
        matches!(self, Self::Extension(_))
    }

    /// Returns `true` for the legacy OEM types.
    pub fn is_oem(&self) -> bool {
        matches!(self, Self::OemScalar | Self::TensorOemByte)
    }

    /// The extension prefix, for extension types.
    pub fn extension_prefix(&self) -> Option<u16> {
        match self {
            Self::Extension(id) => Some(decompose_type_id(*id).0),
            _ => None,
        }
    }

    /// Returns `true` if this base type is a tensor type.
    ///
    /// Extension types report `false` here; the registry resolves their
    /// tensor-ness from the registered definition.
    pub fn is_base_tensor(&self) -> bool {
        matches!(
            self,
            Self::TensorFloat32
                | Self::TensorInt32
                | Self::TensorQuant8Asymm
                | Self::TensorQuant16Symm
                | Self::TensorFloat16
                | Self::TensorBool8
                | Self::TensorQuant8SymmPerChannel
                | Self::TensorQuant16Asymm
                | Self::TensorQuant8Symm
                | Self::TensorQuant8AsymmSigned
                | Self::TensorOemByte
        )
    }

    /// Returns `true` for the quantized tensor types.
    pub fn is_quantized(&self) -> bool {
        matches!(
            self,
            Self::TensorQuant8Asymm
                | Self::TensorQuant16Symm
                | Self::TensorQuant16Asymm
                | Self::TensorQuant8Symm
                | Self::TensorQuant8AsymmSigned
                | Self::TensorQuant8SymmPerChannel
        )
    }

    /// The per-element byte size of a base type.
    ///
    /// `Subgraph` operands carry no data and report 0. Extension types
    /// have no intrinsic size — the registry answers for them.
    pub fn base_element_size(&self) -> usize {
        match self {
            Self::Float32 | Self::Int32 | Self::UInt32 => 4,
            Self::TensorFloat32 | Self::TensorInt32 => 4,
            Self::TensorQuant16Symm | Self::TensorQuant16Asymm => 2,
            Self::TensorFloat16 | Self::Float16 => 2,
            Self::TensorQuant8Asymm
            | Self::TensorQuant8Symm
            | Self::TensorQuant8AsymmSigned
            | Self::TensorQuant8SymmPerChannel
            | Self::TensorBool8
            | Self::Bool => 1,
            Self::OemScalar | Self::TensorOemByte => 1,
            Self::Subgraph => 0,
            Self::Extension(_) => 0,
        }
    }

    /// The feature level that introduced this type.
    pub fn feature_level(&self) -> FeatureLevel {
        match self {
            Self::Float32
            | Self::Int32
            | Self::UInt32
            | Self::TensorFloat32
            | Self::TensorInt32
            | Self::TensorQuant8Asymm
            | Self::OemScalar
            | Self::TensorOemByte => FeatureLevel::V1_0,
            Self::Bool
            | Self::TensorQuant16Symm
            | Self::TensorFloat16
            | Self::TensorBool8
            | Self::Float16
            | Self::TensorQuant8SymmPerChannel
            | Self::TensorQuant16Asymm
            | Self::TensorQuant8Symm
            | Self::Extension(_) => FeatureLevel::V1_2,
            Self::TensorQuant8AsymmSigned | Self::Subgraph => FeatureLevel::V1_3,
        }
    }

    /// Returns a human-readable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Float32 => "FLOAT32",
            Self::Int32 => "INT32",
            Self::UInt32 => "UINT32",
            Self::TensorFloat32 => "TENSOR_FLOAT32",
            Self::TensorInt32 => "TENSOR_INT32",
            Self::TensorQuant8Asymm => "TENSOR_QUANT8_ASYMM",
            Self::Bool => "BOOL",
            Self::TensorQuant16Symm => "TENSOR_QUANT16_SYMM",
            Self::TensorFloat16 => "TENSOR_FLOAT16",
            Self::TensorBool8 => "TENSOR_BOOL8",
            Self::Float16 => "FLOAT16",
            Self::TensorQuant8SymmPerChannel => "TENSOR_QUANT8_SYMM_PER_CHANNEL",
            Self::TensorQuant16Asymm => "TENSOR_QUANT16_ASYMM",
            Self::TensorQuant8Symm => "TENSOR_QUANT8_SYMM",
            Self::TensorQuant8AsymmSigned => "TENSOR_QUANT8_ASYMM_SIGNED",
            Self::Subgraph => "SUBGRAPH",
            Self::OemScalar => "OEM_SCALAR",
            Self::TensorOemByte => "TENSOR_OEM_BYTE",
            Self::Extension(_) => "EXTENSION",
        }
    }
}

impl std::fmt::Display for OperandType {
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

// ── Lifetime ───────────────────────────────────────────────────────

/// Classifies where an operand's data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifeTime {
    /// Produced and consumed inside the graph; no backing data.
    Temporary,
    /// A constant copied into the model's inline value arena.
    ConstantCopy,
    /// A constant living in a memory pool.
    ConstantReference,
    /// An omitted optional operand.
    NoValue,
    /// An input of the subgraph, bound at execution time.
    SubgraphInput,
    /// An output of the subgraph, bound at execution time.
    SubgraphOutput,
    /// A reference to another finished model.
    SubgraphReference,
    /// A large constant held by the builder, consolidated into a pool at
    /// finish time. Never observed on a finished model.
    Pointer,
}

impl LifeTime {
    /// Returns `true` for the constant lifetimes.
    pub fn is_constant(&self) -> bool {
        matches!(self, Self::ConstantCopy | Self::ConstantReference | Self::Pointer)
    }

    /// Whether a builder mutation may move an operand from `self` to `to`.
    ///
    /// All value-setting transitions start from `Temporary`; the only
    /// later move is the finish-time `Pointer → ConstantReference`
    /// consolidation.
    pub fn can_transition_to(&self, to: LifeTime) -> bool {
        match self {
            Self::Temporary => !matches!(to, Self::Temporary),
            Self::Pointer => matches!(to, Self::ConstantReference),
            _ => false,
        }
    }
}

// ── Location and extra parameters ──────────────────────────────────

/// Where a constant operand's bytes live.
///
/// `pool_index` selects the memory pool (0 is the inline arena for
/// `ConstantCopy`); ignored for non-constant lifetimes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DataLocation {
    pub pool_index: u32,
    pub offset: u32,
    pub length: u32,
}

/// Type-specific extra operand parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ExtraParams {
    /// No extra parameters.
    #[default]
    None,
    /// Per-channel quantization: one scale per extent of `channel_dim`.
    Channel { scales: Vec<f32>, channel_dim: u32 },
    /// Opaque extension data.
    Extension(Vec<u8>),
}

// ── Operand ────────────────────────────────────────────────────────

/// A typed node in a computation graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub operand_type: OperandType,
    /// Ordered extents; `0` means unspecified (legal only for graph I/O
    /// until the operand is bound).
    pub dimensions: Vec<u32>,
    /// Quantization scale; meaningful only for quantized types.
    pub scale: f32,
    /// Quantization zero point; meaningful only for quantized types.
    pub zero_point: i32,
    pub lifetime: LifeTime,
    pub location: DataLocation,
    pub extra_params: ExtraParams,
}

impl Operand {
    /// Creates a temporary operand with no value.
    pub fn new(operand_type: OperandType, dimensions: Vec<u32>, scale: f32, zero_point: i32) -> Self {
        Self {
            operand_type,
            dimensions,
            scale,
            zero_point,
            lifetime: LifeTime::Temporary,
            location: DataLocation::default(),
            extra_params: ExtraParams::None,
        }
    }

    /// A tensor is fully specified when none of its extents is 0.
    /// Scalars are always fully specified.
    pub fn is_fully_specified(&self) -> bool {
        self.dimensions.iter().all(|&d| d != 0)
    }

    /// The number of elements, if every extent is specified.
    pub fn num_elements(&self) -> Option<u128> {
        if !self.is_fully_specified() {
            return None;
        }
        Some(self.dimensions.iter().map(|&d| d as u128).product())
    }
}

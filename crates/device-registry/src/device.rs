// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The [`Device`] capability trait and its request/response types.

use crate::DeviceError;
use graph_types::{ExecutionPreference, Extension, OperandType, Priority};
use model_ir::Model;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Width of the compilation caching token.
pub const CACHE_TOKEN_LEN: usize = 32;

/// Broad device class, used for reporting and policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Cpu,
    Gpu,
    Accel,
    Other,
}

/// Relative performance numbers for one operand type on a device.
///
/// Lower is better on both axes; the planner weighs them by the
/// compilation preference.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PerformanceInfo {
    /// Execution time relative to the CPU reference (1.0 = parity).
    pub exec_time: f32,
    /// Power usage relative to the CPU reference (1.0 = parity).
    pub power_usage: f32,
}

impl Default for PerformanceInfo {
    fn default() -> Self {
        Self {
            exec_time: 1.0,
            power_usage: 1.0,
        }
    }
}

/// Memory-layout preference for execution I/O buffers.
///
/// Both fields are positive powers of two, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MemoryPreference {
    pub alignment: u32,
    pub padding: u32,
}

impl Default for MemoryPreference {
    fn default() -> Self {
        Self {
            alignment: 64,
            padding: 64,
        }
    }
}

impl MemoryPreference {
    /// Component-wise maximum. Both sides are powers of two, so the
    /// maximum is also their least common multiple.
    pub fn max(self, other: MemoryPreference) -> MemoryPreference {
        MemoryPreference {
            alignment: self.alignment.max(other.alignment),
            padding: self.padding.max(other.padding),
        }
    }
}

/// Compilation caching information, forwarded verbatim to devices.
#[derive(Debug)]
pub enum CacheInfo {
    /// A cache directory (normalized with a trailing separator).
    Directory(PathBuf),
    /// Pre-opened cache files, duplicated on entry.
    Fds {
        model_cache: Vec<std::fs::File>,
        data_cache: Vec<std::fs::File>,
    },
}

/// An extension attribute attached to a compilation.
#[derive(Debug, Clone)]
pub struct ExtensionAttribute {
    /// Composed `(prefix << 16) | attribute_code` id.
    pub id: u32,
    pub data: Vec<u8>,
}

/// Everything a device needs to compile a (sub)model.
#[derive(Debug, Default)]
pub struct PrepareRequest {
    pub preference: ExecutionPreference,
    pub priority: Priority,
    /// Absolute deadline; computed once per compilation.
    pub deadline: Option<Instant>,
    /// Cache location shared by every step of the compilation.
    pub cache: Option<Arc<CacheInfo>>,
    /// Token uniquely keying the compiled artifact per device.
    pub token: Option<[u8; CACHE_TOKEN_LEN]>,
    pub extension_attributes: Vec<ExtensionAttribute>,
}

/// A device-compiled model, opaque to the core.
#[derive(Debug)]
pub struct PreparedModel {
    device: String,
    model: Arc<Model>,
}

impl PreparedModel {
    /// Creates a prepared-model handle (called by device impls).
    pub fn new(device: impl Into<String>, model: Arc<Model>) -> Self {
        Self {
            device: device.into(),
            model,
        }
    }

    /// Name of the device that compiled this model.
    pub fn device_name(&self) -> &str {
        &self.device
    }

    /// The model this artifact was compiled from.
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }
}

/// The narrow capability surface the core sees of an execution device.
///
/// Implemented by real driver devices, the process-local
/// [`CpuDevice`](crate::CpuDevice), and test fakes.
pub trait Device: Send + Sync {
    /// Stable device name.
    fn name(&self) -> &str;

    /// Driver/device version string.
    fn version(&self) -> &str;

    /// The broad device class.
    fn device_type(&self) -> DeviceType;

    /// Vendor extensions this device understands.
    fn supported_extensions(&self) -> Vec<Extension> {
        Vec::new()
    }

    /// One flag per operation of `model.operations()`, in run order.
    fn supported_operations(&self, model: &Model) -> Vec<bool>;

    /// Performance of operations consuming `operand_type`.
    fn performance(&self, operand_type: OperandType) -> PerformanceInfo;

    /// Performance under relaxed float32→float16 computation.
    fn relaxed_performance(&self) -> PerformanceInfo {
        self.performance(OperandType::TensorFloat32)
    }

    /// Preferred alignment/padding for execution I/O buffers.
    fn memory_preference(&self) -> MemoryPreference {
        MemoryPreference::default()
    }

    /// Compiles `model` for this device.
    ///
    /// May block until the driver responds or `request.deadline` fires.
    fn prepare_model(
        &self,
        model: Arc<Model>,
        request: &PrepareRequest,
    ) -> Result<PreparedModel, DeviceError>;
}

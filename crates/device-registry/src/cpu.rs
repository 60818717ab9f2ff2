// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The process-local CPU reference device.
//!
//! Always available, supports every registered built-in operation, and
//! is the fallback target when a driver device fails to prepare a
//! partitioned step. It never claims extensions or OEM operations —
//! those belong to the driver that defined them, which is exactly why
//! the planner refuses to fall back for models that use them.

use crate::device::{
    Device, DeviceType, MemoryPreference, PerformanceInfo, PreparedModel, PrepareRequest,
};
use crate::DeviceError;
use graph_types::{OperandType, OperationType};
use model_ir::Model;
use op_registry::OperationRegistry;
use std::sync::Arc;
use std::time::Instant;

/// The built-in reference device.
#[derive(Debug, Default)]
pub struct CpuDevice;

impl CpuDevice {
    pub fn new() -> Self {
        Self
    }

    fn supports(&self, operation_type: OperationType) -> bool {
        match operation_type {
            OperationType::Extension(_) | OperationType::OemOperation => false,
            base => OperationRegistry::global().is_registered(base),
        }
    }
}

impl Device for CpuDevice {
    fn name(&self) -> &str {
        "cpu-reference"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Cpu
    }

    fn supported_operations(&self, model: &Model) -> Vec<bool> {
        model
            .operations()
            .iter()
            .map(|op| self.supports(op.operation_type))
            .collect()
    }

    fn performance(&self, _operand_type: OperandType) -> PerformanceInfo {
        // The reference device defines parity.
        PerformanceInfo::default()
    }

    fn memory_preference(&self) -> MemoryPreference {
        MemoryPreference {
            alignment: 64,
            padding: 64,
        }
    }

    fn prepare_model(
        &self,
        model: Arc<Model>,
        request: &PrepareRequest,
    ) -> Result<PreparedModel, DeviceError> {
        if let Some(deadline) = request.deadline {
            if Instant::now() > deadline {
                return Err(DeviceError::MissedDeadline { transient: true });
            }
        }
        if let Some(op) = model
            .operations()
            .iter()
            .find(|op| !self.supports(op.operation_type))
        {
            return Err(DeviceError::UnsupportedOperation {
                device: self.name().to_string(),
                operation: op.operation_type.to_string(),
            });
        }
        tracing::debug!(
            "cpu-reference prepared model with {} operations",
            model.operations().len(),
        );
        Ok(PreparedModel::new(self.name(), model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_types::{Operand, OperandType};
    use model_ir::ModelBuilder;

    fn relu_model() -> Arc<Model> {
        let mut builder = ModelBuilder::new();
        let a = builder
            .add_operand(Operand::new(OperandType::TensorFloat32, vec![4], 0.0, 0))
            .unwrap();
        let out = builder
            .add_operand(Operand::new(OperandType::TensorFloat32, vec![4], 0.0, 0))
            .unwrap();
        builder
            .add_operation(OperationType::Relu, vec![a], vec![out])
            .unwrap();
        builder.identify_inputs_and_outputs(vec![a], vec![out]).unwrap();
        Arc::new(builder.finish().unwrap())
    }

    #[test]
    fn test_supports_builtins() {
        let model = relu_model();
        let cpu = CpuDevice::new();
        assert_eq!(cpu.supported_operations(&model), vec![true]);
    }

    #[test]
    fn test_prepare_model() {
        let cpu = CpuDevice::new();
        let prepared = cpu
            .prepare_model(relu_model(), &PrepareRequest::default())
            .unwrap();
        assert_eq!(prepared.device_name(), "cpu-reference");
    }

    #[test]
    fn test_expired_deadline() {
        let cpu = CpuDevice::new();
        let request = PrepareRequest {
            deadline: Some(Instant::now() - std::time::Duration::from_millis(1)),
            ..PrepareRequest::default()
        };
        assert!(matches!(
            cpu.prepare_model(relu_model(), &request),
            Err(DeviceError::MissedDeadline { transient: true })
        ));
    }

    #[test]
    fn test_memory_preference_is_power_of_two() {
        let pref = CpuDevice::new().memory_preference();
        assert!(pref.alignment.is_power_of_two() && pref.alignment >= 4);
        assert!(pref.padding.is_power_of_two() && pref.padding >= 4);
    }
}

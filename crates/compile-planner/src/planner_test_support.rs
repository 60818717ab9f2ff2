// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Shared fixtures for planner tests: small models and fake devices.

use device_registry::{
    Device, DeviceError, DeviceType, MemoryPreference, PerformanceInfo, PreparedModel,
    PrepareRequest,
};
use graph_types::{Operand, OperandType, OperationType};
use model_ir::{Model, ModelBuilder};
use std::sync::Arc;

/// A chain of `n` RELU operations: input -> relu -> … -> output.
pub(crate) fn relu_chain_model(n: usize) -> Arc<Model> {
    let mut builder = ModelBuilder::new();
    let mut previous = builder
        .add_operand(Operand::new(OperandType::TensorFloat32, vec![4], 0.0, 0))
        .unwrap();
    let input = previous;
    for _ in 0..n {
        let next = builder
            .add_operand(Operand::new(OperandType::TensorFloat32, vec![4], 0.0, 0))
            .unwrap();
        builder
            .add_operation(OperationType::Relu, vec![previous], vec![next])
            .unwrap();
        previous = next;
    }
    builder
        .identify_inputs_and_outputs(vec![input], vec![previous])
        .unwrap();
    Arc::new(builder.finish().unwrap())
}

/// `out = relu(mul(add(a, b), c))` — three ops of three types.
pub(crate) fn add_mul_relu_model() -> Arc<Model> {
    let mut builder = ModelBuilder::new();
    let tensor = |b: &mut ModelBuilder<'static>| {
        b.add_operand(Operand::new(OperandType::TensorFloat32, vec![2, 2], 0.0, 0))
            .unwrap()
    };
    let a = tensor(&mut builder);
    let b = tensor(&mut builder);
    let c = tensor(&mut builder);
    let act = builder
        .add_operand(Operand::new(OperandType::Int32, vec![], 0.0, 0))
        .unwrap();
    builder.set_operand_value(act, Some(&0i32.to_ne_bytes())).unwrap();
    let sum = tensor(&mut builder);
    let product = tensor(&mut builder);
    let out = tensor(&mut builder);
    builder
        .add_operation(OperationType::Add, vec![a, b, act], vec![sum])
        .unwrap();
    builder
        .add_operation(OperationType::Mul, vec![sum, c, act], vec![product])
        .unwrap();
    builder
        .add_operation(OperationType::Relu, vec![product], vec![out])
        .unwrap();
    builder
        .identify_inputs_and_outputs(vec![a, b, c], vec![out])
        .unwrap();
    Arc::new(builder.finish().unwrap())
}

type SupportFn = Box<dyn Fn(OperationType) -> bool + Send + Sync>;

/// A scriptable device for planner tests.
pub(crate) struct FakeDevice {
    pub name: String,
    pub supports: SupportFn,
    pub perf: PerformanceInfo,
    pub memory: MemoryPreference,
    pub fail_prepare: bool,
}

impl FakeDevice {
    pub(crate) fn supporting(
        name: &str,
        types: &'static [OperationType],
    ) -> Self {
        Self {
            name: name.to_string(),
            supports: Box::new(move |t| types.contains(&t)),
            perf: PerformanceInfo { exec_time: 0.5, power_usage: 0.5 },
            memory: MemoryPreference { alignment: 16, padding: 16 },
            fail_prepare: false,
        }
    }

    pub(crate) fn supporting_all(name: &str) -> Self {
        Self {
            name: name.to_string(),
            supports: Box::new(|_| true),
            perf: PerformanceInfo { exec_time: 0.5, power_usage: 0.5 },
            memory: MemoryPreference { alignment: 16, padding: 16 },
            fail_prepare: false,
        }
    }
}

impl Device for FakeDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        "test"
    }

    fn device_type(&self) -> DeviceType {
        DeviceType::Accel
    }

    fn supported_operations(&self, model: &Model) -> Vec<bool> {
        model
            .operations()
            .iter()
            .map(|op| (self.supports)(op.operation_type))
            .collect()
    }

    fn performance(&self, _operand_type: OperandType) -> PerformanceInfo {
        self.perf
    }

    fn memory_preference(&self) -> MemoryPreference {
        self.memory
    }

    fn prepare_model(
        &self,
        model: Arc<Model>,
        request: &PrepareRequest,
    ) -> Result<PreparedModel, DeviceError> {
        if let Some(deadline) = request.deadline {
            if std::time::Instant::now() > deadline {
                return Err(DeviceError::MissedDeadline { transient: true });
            }
        }
        if self.fail_prepare {
            return Err(DeviceError::PrepareFailed {
                device: self.name.clone(),
                detail: "scripted failure".to_string(),
            });
        }
        Ok(PreparedModel::new(self.name.clone(), model))
    }
}

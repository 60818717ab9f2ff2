// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! End-to-end compilation scenarios over the public API: build a graph,
//! finish it, compile it against devices, inspect the plan.

use compile_planner::{Compilation, CompileError, IoRole, PartitionPolicy};
use device_registry::{
    CpuDevice, Device, DeviceError, DeviceType, MemoryPreference, PerformanceInfo, PreparedModel,
    PrepareRequest,
};
use graph_types::{
    ExecutionPreference, Operand, OperandType, OperationType, Status, TypeRegistry,
};
use model_ir::{Model, ModelBuilder, ModelError};
use std::sync::Arc;

// ── Fixtures ───────────────────────────────────────────────────────

fn float_tensor(dims: &[u32]) -> Operand {
    Operand::new(OperandType::TensorFloat32, dims.to_vec(), 0.0, 0)
}

fn int_scalar() -> Operand {
    Operand::new(OperandType::Int32, vec![], 0.0, 0)
}

/// Two `[2, 2]` float inputs, one ADD, one `[2, 2]` output.
fn scalar_add_model() -> Arc<Model> {
    let mut builder = ModelBuilder::new();
    let a = builder.add_operand(float_tensor(&[2, 2])).unwrap();
    let b = builder.add_operand(float_tensor(&[2, 2])).unwrap();
    let act = builder.add_operand(int_scalar()).unwrap();
    let out = builder.add_operand(float_tensor(&[2, 2])).unwrap();
    builder.set_operand_value(act, Some(&0i32.to_ne_bytes())).unwrap();
    builder
        .add_operation(OperationType::Add, vec![a, b, act], vec![out])
        .unwrap();
    builder.identify_inputs_and_outputs(vec![a, b], vec![out]).unwrap();
    Arc::new(builder.finish().unwrap())
}

/// `relu(mul(add(a, b), c))` — three operations.
fn three_op_model() -> Arc<Model> {
    let mut builder = ModelBuilder::new();
    let a = builder.add_operand(float_tensor(&[2, 2])).unwrap();
    let b = builder.add_operand(float_tensor(&[2, 2])).unwrap();
    let c = builder.add_operand(float_tensor(&[2, 2])).unwrap();
    let act = builder.add_operand(int_scalar()).unwrap();
    builder.set_operand_value(act, Some(&0i32.to_ne_bytes())).unwrap();
    let sum = builder.add_operand(float_tensor(&[2, 2])).unwrap();
    let product = builder.add_operand(float_tensor(&[2, 2])).unwrap();
    let out = builder.add_operand(float_tensor(&[2, 2])).unwrap();
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

struct TestDevice {
    name: &'static str,
    supported: &'static [OperationType],
    fail_prepare: bool,
    memory: MemoryPreference,
}

impl TestDevice {
    fn new(name: &'static str, supported: &'static [OperationType]) -> Self {
        Self {
            name,
            supported,
            fail_prepare: false,
            memory: MemoryPreference { alignment: 32, padding: 16 },
        }
    }
}

impl Device for TestDevice {
    fn name(&self) -> &str {
        self.name
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
            .map(|op| self.supported.contains(&op.operation_type))
            .collect()
    }
    fn performance(&self, _operand_type: OperandType) -> PerformanceInfo {
        PerformanceInfo { exec_time: 0.25, power_usage: 0.25 }
    }
    fn memory_preference(&self) -> MemoryPreference {
        self.memory
    }
    fn prepare_model(
        &self,
        model: Arc<Model>,
        _request: &PrepareRequest,
    ) -> Result<PreparedModel, DeviceError> {
        if self.fail_prepare {
            return Err(DeviceError::PrepareFailed {
                device: self.name.to_string(),
                detail: "scripted".to_string(),
            });
        }
        Ok(PreparedModel::new(self.name, model))
    }
}

// ── Scenario 1: scalar add on the CPU reference ────────────────────

#[test]
fn scalar_add_compiles_simple_on_cpu() {
    let model = scalar_add_model();
    let cpu: Arc<dyn Device> = Arc::new(CpuDevice::new());
    let compilation = Compilation::for_devices(model, vec![cpu]).unwrap();
    let plan = compilation.finish().unwrap();

    assert!(plan.is_simple());
    assert!(plan.is_valid());
    for index in 0..2 {
        let pref = plan.memory_preference(IoRole::Input, index).unwrap();
        assert!(pref.alignment.is_power_of_two() && pref.alignment >= 4);
        assert!(pref.padding.is_power_of_two() && pref.padding >= 4);
    }
    let out = plan.memory_preference(IoRole::Output, 0).unwrap();
    assert!(out.alignment >= 4 && out.padding >= 4);
}

// ── Scenario 2/P1: stored order is topological ─────────────────────

#[test]
fn run_order_is_topological() {
    let mut builder = ModelBuilder::new();
    let operands: Vec<u32> = (0..4)
        .map(|_| builder.add_operand(float_tensor(&[2])).unwrap())
        .collect();
    builder
        .identify_inputs_and_outputs(vec![operands[0]], vec![operands[3]])
        .unwrap();
    // B consumes {2} producing {3}; then A consumes {0} producing {2}.
    builder
        .add_operation(OperationType::Relu, vec![operands[2]], vec![operands[3]])
        .unwrap();
    builder
        .add_operation(OperationType::Relu, vec![operands[0]], vec![operands[2]])
        .unwrap();
    let model = builder.finish().unwrap();

    // A (original position 1) is stored before B (original position 0).
    assert_eq!(model.sorted_index_map(), &[1, 0]);
    // P1: every temporary input's producer precedes its consumer.
    for (position, operation) in model.operations().iter().enumerate() {
        for &input in &operation.inputs {
            if model.operands()[input as usize].lifetime == graph_types::LifeTime::Temporary {
                let producer = model
                    .operations()
                    .iter()
                    .position(|op| op.outputs.contains(&input))
                    .expect("temporary has a producer");
                assert!(producer < position);
            }
        }
    }
}

// ── Scenario 3/P5: cycles are rejected ─────────────────────────────

#[test]
fn cyclic_graph_fails_finish() {
    let mut builder = ModelBuilder::new();
    let o: Vec<u32> = (0..4)
        .map(|_| builder.add_operand(float_tensor(&[2])).unwrap())
        .collect();
    let act = builder.add_operand(int_scalar()).unwrap();
    builder.set_operand_value(act, Some(&0i32.to_ne_bytes())).unwrap();
    builder.identify_inputs_and_outputs(vec![o[0]], vec![o[3]]).unwrap();
    // X: {0, 2} -> {1}; Y: {1} -> {2}; Z: {2} -> {3}.
    builder
        .add_operation(OperationType::Add, vec![o[0], o[2], act], vec![o[1]])
        .unwrap();
    builder
        .add_operation(OperationType::Relu, vec![o[1]], vec![o[2]])
        .unwrap();
    builder
        .add_operation(OperationType::Relu, vec![o[2]], vec![o[3]])
        .unwrap();

    let err = builder.finish().unwrap_err();
    assert_eq!(err.status(), Status::BadData);
}

// ── Scenario 4/P7: trailing defaults ───────────────────────────────

fn pool_model_with_layout_flag() -> Arc<Model> {
    let mut builder = ModelBuilder::new();
    let input = builder.add_operand(float_tensor(&[1, 4, 4, 1])).unwrap();
    let mut op_inputs = vec![input];
    for _ in 0..6 {
        let s = builder.add_operand(int_scalar()).unwrap();
        builder.set_operand_value(s, Some(&1i32.to_ne_bytes())).unwrap();
        op_inputs.push(s);
    }
    let layout = builder
        .add_operand(Operand::new(OperandType::Bool, vec![], 0.0, 0))
        .unwrap();
    builder.set_operand_value(layout, Some(&[0u8])).unwrap();
    op_inputs.push(layout);
    let output = builder.add_operand(float_tensor(&[1, 4, 4, 1])).unwrap();
    builder
        .add_operation(OperationType::AveragePool2d, op_inputs, vec![output])
        .unwrap();
    builder.identify_inputs_and_outputs(vec![input], vec![output]).unwrap();
    Arc::new(builder.finish().unwrap())
}

#[test]
fn trailing_bool_false_is_trimmed() {
    let model = pool_model_with_layout_flag();
    assert_eq!(model.operations()[0].inputs.len(), 7);
}

#[test]
fn trimming_is_idempotent() {
    // Rebuild a graph in the already-trimmed 7-input form; a second
    // finish pass drops nothing further.
    let trimmed = pool_model_with_layout_flag();
    assert_eq!(trimmed.operations()[0].inputs.len(), 7);

    let mut builder = ModelBuilder::new();
    let input = builder.add_operand(float_tensor(&[1, 4, 4, 1])).unwrap();
    let mut op_inputs = vec![input];
    for _ in 0..6 {
        let s = builder.add_operand(int_scalar()).unwrap();
        builder.set_operand_value(s, Some(&1i32.to_ne_bytes())).unwrap();
        op_inputs.push(s);
    }
    let output = builder.add_operand(float_tensor(&[1, 4, 4, 1])).unwrap();
    builder
        .add_operation(OperationType::AveragePool2d, op_inputs, vec![output])
        .unwrap();
    builder.identify_inputs_and_outputs(vec![input], vec![output]).unwrap();
    let again = builder.finish().unwrap();
    assert_eq!(again.operations()[0].inputs.len(), 7);
}

// ── Scenario 5: per-channel quantization sizing ────────────────────

#[test]
fn per_channel_quant_sizing() {
    let per_channel =
        || Operand::new(OperandType::TensorQuant8SymmPerChannel, vec![3, 4], 0.0, 0);

    let mut builder = ModelBuilder::new();
    let index = builder.add_operand(per_channel()).unwrap();
    builder
        .set_operand_per_channel_quant(index, &[0.1, 0.2, 0.3], 0)
        .unwrap();
    builder.set_operand_value(index, Some(&[0u8; 12])).unwrap();

    let mut builder = ModelBuilder::new();
    let index = builder.add_operand(per_channel()).unwrap();
    assert_eq!(
        builder
            .set_operand_value(index, Some(&[0u8; 11]))
            .unwrap_err()
            .status(),
        Status::BadData
    );
    assert_eq!(
        builder
            .set_operand_value(index, Some(&[0u8; 13]))
            .unwrap_err()
            .status(),
        Status::BadData
    );
    assert_eq!(
        builder
            .set_operand_per_channel_quant(index, &[0.1, 0.2, 0.3, 0.4], 0)
            .unwrap_err()
            .status(),
        Status::BadData
    );
}

// ── Scenario 6/P9: partitioned fallback and its gate ───────────────

#[test]
fn uncovered_operation_falls_back_to_cpu() {
    let model = three_op_model();
    let a: Arc<dyn Device> = Arc::new(TestDevice::new("dev-a", &[OperationType::Add]));
    let b: Arc<dyn Device> = Arc::new(TestDevice::new("dev-b", &[OperationType::Mul]));
    let mut compilation = Compilation::for_devices(model, vec![a, b]).unwrap();
    compilation.set_partitioning(PartitionPolicy::WithFallback);
    let plan = compilation.finish().unwrap();

    assert!(plan.is_simple());
    assert_eq!(plan.steps()[0].device().name(), "cpu-reference");
    assert!(!plan.fallback_from_error());
}

#[test]
fn prepare_failure_falls_back_with_telemetry_bit() {
    let model = three_op_model();
    let mut flaky = TestDevice::new(
        "flaky",
        &[OperationType::Add, OperationType::Mul, OperationType::Relu],
    );
    flaky.fail_prepare = true;
    let mut compilation = Compilation::for_devices(model, vec![Arc::new(flaky)]).unwrap();
    compilation.set_partitioning(PartitionPolicy::WithFallback);
    let plan = compilation.finish().unwrap();

    assert!(plan.is_simple());
    assert_eq!(plan.steps()[0].device().name(), "cpu-reference");
    assert!(plan.fallback_from_error());
}

#[test]
fn extension_operation_bars_fallback() {
    // Register an extension and build a model using its operation.
    let registry = TypeRegistry::global();
    registry
        .register_extensions(
            vec![graph_types::Extension::new("com.test.fallbackgate", vec![])],
            "test-device",
        )
        .unwrap();
    let ext_op = registry
        .extension_operation_type("com.test.fallbackgate", 1)
        .unwrap();

    let mut builder = ModelBuilder::new();
    let a = builder.add_operand(float_tensor(&[2])).unwrap();
    let out = builder.add_operand(float_tensor(&[2])).unwrap();
    builder.add_operation(ext_op, vec![a], vec![out]).unwrap();
    builder.identify_inputs_and_outputs(vec![a], vec![out]).unwrap();
    let model = Arc::new(builder.finish().unwrap());
    assert!(model.has_extension_operation());

    // A device that claims the op but fails to prepare: no fallback.
    struct ExtDevice;
    impl Device for ExtDevice {
        fn name(&self) -> &str {
            "ext-dev"
        }
        fn version(&self) -> &str {
            "test"
        }
        fn device_type(&self) -> DeviceType {
            DeviceType::Accel
        }
        fn supported_operations(&self, model: &Model) -> Vec<bool> {
            vec![true; model.operations().len()]
        }
        fn performance(&self, _t: OperandType) -> PerformanceInfo {
            PerformanceInfo::default()
        }
        fn prepare_model(
            &self,
            _model: Arc<Model>,
            _request: &PrepareRequest,
        ) -> Result<PreparedModel, DeviceError> {
            Err(DeviceError::PrepareFailed {
                device: "ext-dev".to_string(),
                detail: "scripted".to_string(),
            })
        }
    }

    let mut compilation =
        Compilation::for_devices(model, vec![Arc::new(ExtDevice)]).unwrap();
    compilation.set_partitioning(PartitionPolicy::WithFallback);
    let err = compilation.finish().unwrap_err();
    assert_eq!(err.status(), Status::OpFailed);
}

// ── Partitioned plans and memory preferences (P8) ──────────────────

#[test]
fn partitioned_plan_wires_step_roles() {
    let model = three_op_model();
    let a: Arc<dyn Device> = Arc::new(TestDevice::new(
        "dev-a",
        &[OperationType::Add, OperationType::Mul],
    ));
    let b: Arc<dyn Device> = Arc::new(TestDevice::new("dev-b", &[OperationType::Relu]));
    let mut compilation = Compilation::for_devices(model, vec![a, b]).unwrap();
    compilation.set_preference(ExecutionPreference::SustainedSpeed);
    let plan = compilation.finish().unwrap();

    assert!(!plan.is_simple());
    assert_eq!(plan.steps().len(), 2);
    plan.validate().unwrap();

    // Top-level input 0 surfaces exactly once, in step 0.
    let mut roles = Vec::new();
    plan.for_each_step_role_of_input(0, |step, role, local| roles.push((step, role, local)));
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].0, 0);
    assert_eq!(roles[0].1, IoRole::Input);

    // The model output comes out of the RELU step.
    let mut roles = Vec::new();
    plan.for_each_step_role_of_output(0, |step, role, local| roles.push((step, role, local)));
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].0, 1);
    assert_eq!(roles[0].1, IoRole::Output);

    // P8: the preference equals the max over the steps touching the I/O.
    let pref = plan.memory_preference(IoRole::Input, 0).unwrap();
    assert_eq!(pref.alignment, 32);
    assert!(pref.alignment.is_power_of_two());

    let bursts = plan.make_bursts();
    assert_eq!(bursts.len(), 2);
    assert_eq!(bursts[0].device_name, "dev-a");
}

#[test]
fn memory_preference_rejects_bad_index() {
    let model = scalar_add_model();
    let cpu: Arc<dyn Device> = Arc::new(CpuDevice::new());
    let plan = Compilation::for_devices(model, vec![cpu])
        .unwrap()
        .finish()
        .unwrap();
    let err = plan.memory_preference(IoRole::Input, 5).unwrap_err();
    assert!(matches!(err, CompileError::IoIndexOutOfRange { .. }));
}

// ── P6: arch-hash stability across equal builds ────────────────────

#[test]
fn arch_hash_is_stable_identity() {
    let first = scalar_add_model();
    let second = scalar_add_model();
    assert_eq!(first.arch_hash(), second.arch_hash());
    let different = three_op_model();
    assert_ne!(first.arch_hash(), different.arch_hash());
}

// ── P2/P3: index stability and lifetime monotonicity ───────────────

#[test]
fn builder_indices_and_lifetimes() {
    let mut builder = ModelBuilder::new();
    let mut indices = Vec::new();
    for _ in 0..5 {
        indices.push(builder.add_operand(float_tensor(&[1])).unwrap());
    }
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);

    builder.set_operand_value(0, Some(&[0u8; 4])).unwrap();
    // No mutation can take a constant back to temporary.
    let err = builder.set_operand_value(0, None).unwrap_err();
    assert!(matches!(err, ModelError::LifetimeViolation { .. }));
}

// ── Deadline propagation ───────────────────────────────────────────

#[test]
fn expired_deadline_surfaces_missed_deadline() {
    let model = scalar_add_model();
    let cpu: Arc<dyn Device> = Arc::new(CpuDevice::new());
    let mut compilation = Compilation::for_devices(model, vec![cpu]).unwrap();
    // A zero timeout expires before any device can be reached.
    compilation.set_timeout(std::time::Duration::from_nanos(0));
    let err = compilation.finish().unwrap_err();
    assert!(matches!(
        err.status(),
        Status::MissedDeadlineTransient | Status::MissedDeadlinePersistent
    ));
}

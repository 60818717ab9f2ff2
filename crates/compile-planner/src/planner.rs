// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The partitioning algorithm.
//!
//! Walks the model's operations in run order, picks the best-scoring
//! device for each, and coalesces runs won by the same device into
//! steps. Each step gets its own extracted sub-model with cross-step
//! operands promoted to step boundaries. Scoring weighs per-device
//! performance numbers by the compilation preference, with ties broken
//! by device-list order.

use crate::compilation::PartitionPolicy;
use crate::plan::{Plan, Step};
use crate::CompileError;
use device_registry::{CpuDevice, Device, DeviceError, PrepareRequest};
use graph_types::{ExecutionPreference, ExtraParams, LifeTime, Operand, OperandType, Operation};
use model_ir::{Model, ModelBuilder};
use std::collections::HashMap;
use std::sync::Arc;

/// Produces a plan for `model` over the offered devices.
pub(crate) fn partition_the_work(
    model: &Arc<Model>,
    devices: &[Arc<dyn Device>],
    preference: ExecutionPreference,
    policy: PartitionPolicy,
    request: &PrepareRequest,
) -> Result<Plan, CompileError> {
    if devices.is_empty() {
        return Err(CompileError::NoDevices);
    }

    let support: Vec<Vec<bool>> = devices
        .iter()
        .map(|device| device.supported_operations(model))
        .collect();

    // Trivial case: partitioning disabled — the whole model goes to the
    // first device that covers it.
    if policy == PartitionPolicy::NoPartition {
        if let Some(device_index) =
            (0..devices.len()).find(|&di| support[di].iter().all(|&s| s))
        {
            return prepare_simple(model, &devices[device_index], request);
        }
        return Err(coverage_error(model, &support));
    }

    // Trivial case: one fully capable device offered.
    if devices.len() == 1 && support[0].iter().all(|&s| s) {
        return match prepare_simple(model, &devices[0], request) {
            Ok(plan) => Ok(plan),
            Err(err) => fallback_or(model, policy, request, err, true),
        };
    }

    // Score every operation against every supporting device.
    let best: Vec<Option<usize>> = model
        .operations()
        .iter()
        .enumerate()
        .map(|(position, operation)| {
            let mut winner: Option<(usize, f32)> = None;
            for (device_index, device) in devices.iter().enumerate() {
                if !support[device_index][position] {
                    continue;
                }
                let score = score_operation(model, operation, device.as_ref(), preference);
                // Strict improvement only: earlier devices win ties.
                if winner.map_or(true, |(_, best_score)| score < best_score) {
                    winner = Some((device_index, score));
                }
            }
            winner.map(|(device_index, _)| device_index)
        })
        .collect();

    // Coverage gap: some operation is supported nowhere. Re-plan the
    // whole model onto the CPU reference when policy permits.
    if best.iter().any(Option::is_none) {
        let err = coverage_error(model, &support);
        return fallback_or(model, policy, request, err, false);
    }
    let best: Vec<usize> = best.into_iter().flatten().collect();

    // Single winner across the board: no need to partition.
    if best.windows(2).all(|pair| pair[0] == pair[1]) {
        let device = &devices[best[0]];
        return match prepare_simple(model, device, request) {
            Ok(plan) => Ok(plan),
            Err(err) => fallback_or(model, policy, request, err, true),
        };
    }

    // Greedy coalescing: a new step starts whenever the winning device
    // changes between adjacent operations in run order.
    let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
    for (position, &device_index) in best.iter().enumerate() {
        match groups.last_mut() {
            Some((group_device, positions)) if *group_device == device_index => {
                positions.push(position);
            }
            _ => groups.push((device_index, vec![position])),
        }
    }
    tracing::debug!(
        "partitioned into {} steps: {:?}",
        groups.len(),
        groups
            .iter()
            .map(|(di, ops)| (devices[*di].name(), ops.len()))
            .collect::<Vec<_>>(),
    );

    match build_compound(model, devices, &groups, request) {
        Ok(plan) => Ok(plan),
        Err(err) => fallback_or(model, policy, request, err, true),
    }
}

fn coverage_error(model: &Model, support: &[Vec<bool>]) -> CompileError {
    let position = (0..model.operations().len())
        .find(|&p| support.iter().all(|s| !s[p]))
        .unwrap_or(0);
    CompileError::UnsupportedOperation {
        operation: model.operations()[position].operation_type.to_string(),
        position,
    }
}

/// Applies the fallback policy after a planning or per-step failure.
///
/// Deadline expiry always surfaces. OEM and extension operations bar
/// fallback: the CPU reference cannot honor semantics it has never
/// seen.
fn fallback_or(
    model: &Arc<Model>,
    policy: PartitionPolicy,
    request: &PrepareRequest,
    err: CompileError,
    from_error: bool,
) -> Result<Plan, CompileError> {
    if matches!(err, CompileError::Device(DeviceError::MissedDeadline { .. })) {
        return Err(err);
    }
    if policy != PartitionPolicy::WithFallback {
        return Err(err);
    }
    if model.has_oem_operation() || model.has_extension_operation() {
        return Err(err);
    }
    tracing::warn!("falling back to cpu-reference after planning failure: {err}");
    let cpu: Arc<dyn Device> = Arc::new(CpuDevice::new());
    let plan = prepare_simple(model, &cpu, request)?;
    Ok(if from_error {
        plan.mark_fallback_from_error()
    } else {
        plan
    })
}

/// A one-step plan: the device compiles the model as-is.
fn prepare_simple(
    model: &Arc<Model>,
    device: &Arc<dyn Device>,
    request: &PrepareRequest,
) -> Result<Plan, CompileError> {
    let prepared = device.prepare_model(Arc::clone(model), request)?;
    let step = Step {
        index: 0,
        device: Arc::clone(device),
        submodel: Arc::clone(model),
        prepared,
        operation_indexes: (0..model.operations().len()).collect(),
        model_input_map: (0..model.input_indexes().len()).map(|i| (i, i)).collect(),
        model_output_map: (0..model.output_indexes().len()).map(|i| (i, i)).collect(),
        temp_input_map: Vec::new(),
        temp_output_map: Vec::new(),
    };
    Ok(Plan::simple(
        step,
        model.input_indexes().len(),
        model.output_indexes().len(),
    ))
}

/// Scores one operation on one device; lower is better.
fn score_operation(
    model: &Model,
    operation: &Operation,
    device: &dyn Device,
    preference: ExecutionPreference,
) -> f32 {
    let primary = operation
        .inputs
        .first()
        .map(|&i| model.operands()[i as usize].operand_type)
        .unwrap_or(OperandType::TensorFloat32);
    let uses_float32 = matches!(primary, OperandType::TensorFloat32 | OperandType::Float32);
    let perf = if model.is_relaxed() && uses_float32 {
        device.relaxed_performance()
    } else {
        device.performance(primary)
    };
    match preference {
        ExecutionPreference::LowPower => perf.power_usage,
        ExecutionPreference::FastSingleAnswer | ExecutionPreference::SustainedSpeed => {
            perf.exec_time
        }
    }
}

fn build_compound(
    model: &Arc<Model>,
    devices: &[Arc<dyn Device>],
    groups: &[(usize, Vec<usize>)],
    request: &PrepareRequest,
) -> Result<Plan, CompileError> {
    let mut producers: HashMap<u32, usize> = HashMap::new();
    let mut consumers: HashMap<u32, Vec<usize>> = HashMap::new();
    for (position, operation) in model.operations().iter().enumerate() {
        for &output in &operation.outputs {
            producers.insert(output, position);
        }
        for &input in &operation.inputs {
            consumers.entry(input).or_default().push(position);
        }
    }

    let mut steps = Vec::with_capacity(groups.len());
    for (step_index, (device_index, positions)) in groups.iter().enumerate() {
        let step = extract_step(
            model,
            step_index,
            &devices[*device_index],
            positions,
            &producers,
            &consumers,
            request,
        )?;
        steps.push(step);
    }

    let plan = Plan::compound(
        steps,
        model.input_indexes().len(),
        model.output_indexes().len(),
    );
    plan.validate()?;
    Ok(plan)
}

/// Builds one step: extracts the sub-model owning `positions`, promotes
/// cross-step operands to boundary I/O, and compiles it on `device`.
///
/// Constants are preserved verbatim — inline values are re-copied,
/// pool-backed values share the source pools, subgraph references share
/// the referenced models.
fn extract_step(
    model: &Arc<Model>,
    step_index: usize,
    device: &Arc<dyn Device>,
    positions: &[usize],
    producers: &HashMap<u32, usize>,
    consumers: &HashMap<u32, Vec<usize>>,
    request: &PrepareRequest,
) -> Result<Step, CompileError> {
    let operands = model.operands();
    let operations = model.operations();
    let in_step = |position: usize| positions.binary_search(&position).is_ok();

    // Local operand numbering, in first-reference order.
    let mut local_of: HashMap<u32, u32> = HashMap::new();
    let mut order: Vec<u32> = Vec::new();
    for &position in positions {
        let operation = &operations[position];
        for &global in operation.inputs.iter().chain(operation.outputs.iter()) {
            local_of.entry(global).or_insert_with(|| {
                order.push(global);
                (order.len() - 1) as u32
            });
        }
    }

    let mut builder = ModelBuilder::new();
    for &global in &order {
        let operand = &operands[global as usize];
        builder.add_operand(Operand::new(
            operand.operand_type,
            operand.dimensions.clone(),
            operand.scale,
            operand.zero_point,
        ))?;
    }

    for (local, &global) in order.iter().enumerate() {
        let operand = &operands[global as usize];
        let local = local as u32;
        match &operand.extra_params {
            ExtraParams::Channel { scales, channel_dim } => {
                builder.set_operand_per_channel_quant(local, scales, *channel_dim)?;
            }
            ExtraParams::Extension(data) => {
                builder.set_operand_extension_data(local, data)?;
            }
            ExtraParams::None => {}
        }
        match operand.lifetime {
            LifeTime::ConstantCopy => {
                let bytes = model.constant_bytes(operand).unwrap_or(&[]);
                builder.set_operand_value(local, Some(bytes))?;
            }
            LifeTime::ConstantReference => {
                let memory = model.pools()[operand.location.pool_index as usize].clone();
                builder.set_operand_value_from_memory(
                    local,
                    &memory,
                    operand.location.offset,
                    operand.location.length,
                )?;
            }
            LifeTime::NoValue => {
                builder.set_operand_value(local, None)?;
            }
            LifeTime::SubgraphReference => {
                let referenced = &model.referenced_models()[operand.location.offset as usize];
                builder.set_operand_value_from_model(local, referenced)?;
            }
            LifeTime::Temporary
            | LifeTime::SubgraphInput
            | LifeTime::SubgraphOutput
            | LifeTime::Pointer => {}
        }
    }

    // Classify I/O: model inputs stay inputs, cross-step operands
    // become boundary inputs/outputs of the step.
    let input_position: HashMap<u32, usize> = model
        .input_indexes()
        .iter()
        .enumerate()
        .map(|(position, &global)| (global, position))
        .collect();
    let output_position: HashMap<u32, usize> = model
        .output_indexes()
        .iter()
        .enumerate()
        .map(|(position, &global)| (global, position))
        .collect();

    let mut local_inputs: Vec<u32> = Vec::new();
    let mut local_outputs: Vec<u32> = Vec::new();
    let mut model_input_map = Vec::new();
    let mut model_output_map = Vec::new();
    let mut temp_input_map = Vec::new();
    let mut temp_output_map = Vec::new();

    for (local, &global) in order.iter().enumerate() {
        let operand = &operands[global as usize];
        let produced_here = producers.get(&global).is_some_and(|&p| in_step(p));
        let consumed_elsewhere = consumers
            .get(&global)
            .is_some_and(|cs| cs.iter().any(|&c| !in_step(c)));
        match operand.lifetime {
            LifeTime::SubgraphInput => {
                model_input_map.push((input_position[&global], local_inputs.len()));
                local_inputs.push(local as u32);
            }
            LifeTime::SubgraphOutput => {
                if produced_here {
                    model_output_map.push((output_position[&global], local_outputs.len()));
                    local_outputs.push(local as u32);
                } else {
                    // Produced by an earlier step; this step reads it.
                    temp_input_map.push((global, local_inputs.len()));
                    local_inputs.push(local as u32);
                }
            }
            LifeTime::Temporary => {
                if produced_here && consumed_elsewhere {
                    temp_output_map.push((global, local_outputs.len()));
                    local_outputs.push(local as u32);
                } else if !produced_here {
                    temp_input_map.push((global, local_inputs.len()));
                    local_inputs.push(local as u32);
                }
            }
            _ => {}
        }
    }

    for &position in positions {
        let operation = &operations[position];
        let inputs = operation.inputs.iter().map(|g| local_of[g]).collect();
        let outputs = operation.outputs.iter().map(|g| local_of[g]).collect();
        builder.add_operation(operation.operation_type, inputs, outputs)?;
    }
    builder.relax_float32_to_float16(model.is_relaxed())?;
    builder.identify_inputs_and_outputs(local_inputs, local_outputs)?;

    let submodel = Arc::new(builder.finish()?);
    let prepared = device.prepare_model(Arc::clone(&submodel), request)?;
    tracing::debug!(
        "step {step_index} on '{}': {} operations, {} boundary in, {} boundary out",
        device.name(),
        positions.len(),
        temp_input_map.len(),
        temp_output_map.len(),
    );

    Ok(Step {
        index: step_index,
        device: Arc::clone(device),
        submodel,
        prepared,
        operation_indexes: positions.to_vec(),
        model_input_map,
        model_output_map,
        temp_input_map,
        temp_output_map,
    })
}

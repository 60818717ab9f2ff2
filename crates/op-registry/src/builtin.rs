// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Structural validators for the built-in operation set.
//!
//! Validation here is the statically decidable part: arities (including
//! the versioned trailing-argument ranges), tensor-vs-scalar slots, and
//! the scalar parameter types the normalizer's trailing-default logic
//! dispatches on. Shape arithmetic that depends on run-time extents
//! belongs to `prepare`.

use crate::kernels;
use crate::registry::{OperationEntry, OperationRegistry, PrepareContext};
use crate::OpError;
use graph_types::{LifeTime, Operand, OperandType, Operation};

// ── Helpers ────────────────────────────────────────────────────────

fn wrong_inputs(op: &Operation, expected: &str) -> OpError {
    OpError::WrongInputCount {
        operation: op.operation_type.to_string(),
        expected: expected.to_string(),
        actual: op.inputs.len(),
    }
}

fn expect_inputs(op: &Operation, low: usize, high: usize) -> Result<(), OpError> {
    if op.inputs.len() < low || op.inputs.len() > high {
        let expected = if low == high {
            low.to_string()
        } else {
            format!("{low}..={high}")
        };
        return Err(wrong_inputs(op, &expected));
    }
    Ok(())
}

fn expect_outputs(op: &Operation, count: usize) -> Result<(), OpError> {
    if op.outputs.len() != count {
        return Err(OpError::WrongOutputCount {
            operation: op.operation_type.to_string(),
            expected: count,
            actual: op.outputs.len(),
        });
    }
    Ok(())
}

fn operand<'a>(op: &Operation, operands: &'a [Operand], slot: usize) -> &'a Operand {
    // Index bounds are checked by the builder before validation runs.
    &operands[op.inputs[slot] as usize]
}

fn is_omitted(operand: &Operand) -> bool {
    operand.lifetime == LifeTime::NoValue
}

fn expect_tensor(op: &Operation, operands: &[Operand], slot: usize) -> Result<(), OpError> {
    let o = operand(op, operands, slot);
    if is_omitted(o) {
        return Ok(());
    }
    if !o.operand_type.is_base_tensor() {
        return Err(OpError::WrongOperandType {
            operation: op.operation_type.to_string(),
            index: slot,
            expected: "a tensor type".to_string(),
            actual: o.operand_type.to_string(),
        });
    }
    Ok(())
}

fn expect_scalar_of(
    op: &Operation,
    operands: &[Operand],
    slot: usize,
    allowed: &[OperandType],
) -> Result<(), OpError> {
    let o = operand(op, operands, slot);
    if is_omitted(o) {
        return Ok(());
    }
    if !allowed.contains(&o.operand_type) {
        return Err(OpError::WrongOperandType {
            operation: op.operation_type.to_string(),
            index: slot,
            expected: allowed
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(" or "),
            actual: o.operand_type.to_string(),
        });
    }
    Ok(())
}

fn expect_same_type(op: &Operation, operands: &[Operand], a: usize, b: usize) -> Result<(), OpError> {
    let (oa, ob) = (operand(op, operands, a), operand(op, operands, b));
    if is_omitted(oa) || is_omitted(ob) {
        return Ok(());
    }
    if oa.operand_type != ob.operand_type {
        return Err(OpError::WrongOperandType {
            operation: op.operation_type.to_string(),
            index: b,
            expected: oa.operand_type.to_string(),
            actual: ob.operand_type.to_string(),
        });
    }
    Ok(())
}

const INT32: &[OperandType] = &[OperandType::Int32];
const BOOL: &[OperandType] = &[OperandType::Bool];
const TENSOR_INT32: &[OperandType] = &[OperandType::TensorInt32];

// ── Validators ─────────────────────────────────────────────────────

/// ADD / MUL / SUB / DIV: two tensors plus a fused-activation scalar.
fn validate_elementwise_binary(op: &Operation, operands: &[Operand]) -> Result<(), OpError> {
    expect_inputs(op, 3, 3)?;
    expect_outputs(op, 1)?;
    expect_tensor(op, operands, 0)?;
    expect_tensor(op, operands, 1)?;
    expect_same_type(op, operands, 0, 1)?;
    expect_scalar_of(op, operands, 2, INT32)
}

/// RELU / RELU6 / LOGISTIC / TANH / DEQUANTIZE: one tensor in, one out.
fn validate_unary(op: &Operation, operands: &[Operand]) -> Result<(), OpError> {
    expect_inputs(op, 1, 1)?;
    expect_outputs(op, 1)?;
    expect_tensor(op, operands, 0)
}

/// Pooling: 7/8 inputs with implicit padding, 10/11 with explicit.
fn validate_pool_2d(op: &Operation, operands: &[Operand]) -> Result<(), OpError> {
    let n = op.inputs.len();
    if !matches!(n, 7 | 8 | 10 | 11) {
        return Err(wrong_inputs(op, "7, 8, 10, or 11"));
    }
    expect_outputs(op, 1)?;
    expect_tensor(op, operands, 0)?;
    let scalar_params = if n >= 10 { 9 } else { 6 };
    for slot in 1..=scalar_params {
        expect_scalar_of(op, operands, slot, INT32)?;
    }
    if n == 8 || n == 11 {
        expect_scalar_of(op, operands, n - 1, BOOL)?;
    }
    Ok(())
}

/// CONV_2D: 7..=10 implicit, 10..=13 explicit. The count-10 form is
/// disambiguated by the type of input 7 (Bool = implicit layout flag,
/// Int32 = explicit padding).
fn validate_conv_2d(op: &Operation, operands: &[Operand]) -> Result<(), OpError> {
    expect_inputs(op, 7, 13)?;
    expect_outputs(op, 1)?;
    for slot in 0..3 {
        expect_tensor(op, operands, slot)?;
    }
    let explicit = op.inputs.len() > 10
        || (op.inputs.len() == 10
            && operand(op, operands, 7).operand_type == OperandType::Int32);
    let base = if explicit { 10 } else { 7 };
    for slot in 3..base {
        expect_scalar_of(op, operands, slot, INT32)?;
    }
    // Trailing extras: layout flag then two dilation factors.
    for slot in base..op.inputs.len() {
        if slot == base {
            expect_scalar_of(op, operands, slot, BOOL)?;
        } else {
            expect_scalar_of(op, operands, slot, INT32)?;
        }
    }
    Ok(())
}

/// DEPTHWISE_CONV_2D: 8..=11 implicit, 11..=14 explicit; input 8 type
/// disambiguates the count-11 form.
fn validate_depthwise_conv_2d(op: &Operation, operands: &[Operand]) -> Result<(), OpError> {
    expect_inputs(op, 8, 14)?;
    expect_outputs(op, 1)?;
    for slot in 0..3 {
        expect_tensor(op, operands, slot)?;
    }
    let explicit = op.inputs.len() > 11
        || (op.inputs.len() == 11
            && operand(op, operands, 8).operand_type == OperandType::Int32);
    let base = if explicit { 11 } else { 8 };
    for slot in 3..base {
        expect_scalar_of(op, operands, slot, INT32)?;
    }
    for slot in base..op.inputs.len() {
        if slot == base {
            expect_scalar_of(op, operands, slot, BOOL)?;
        } else {
            expect_scalar_of(op, operands, slot, INT32)?;
        }
    }
    Ok(())
}

/// CONCATENATION: n ≥ 1 tensors of one type plus the axis scalar.
fn validate_concatenation(op: &Operation, operands: &[Operand]) -> Result<(), OpError> {
    if op.inputs.len() < 2 {
        return Err(wrong_inputs(op, "at least 2"));
    }
    expect_outputs(op, 1)?;
    let last = op.inputs.len() - 1;
    for slot in 0..last {
        expect_tensor(op, operands, slot)?;
        expect_same_type(op, operands, 0, slot)?;
    }
    expect_scalar_of(op, operands, last, INT32)
}

/// FULLY_CONNECTED: input, weights, bias, fused activation.
fn validate_fully_connected(op: &Operation, operands: &[Operand]) -> Result<(), OpError> {
    expect_inputs(op, 4, 4)?;
    expect_outputs(op, 1)?;
    expect_tensor(op, operands, 0)?;
    expect_tensor(op, operands, 1)?;
    expect_tensor(op, operands, 2)?;
    expect_scalar_of(op, operands, 3, INT32)
}

/// RESHAPE: tensor plus target-shape tensor.
fn validate_reshape(op: &Operation, operands: &[Operand]) -> Result<(), OpError> {
    expect_inputs(op, 2, 2)?;
    expect_outputs(op, 1)?;
    expect_tensor(op, operands, 0)?;
    expect_scalar_of(op, operands, 1, TENSOR_INT32)
}

/// SOFTMAX: tensor, beta, optional axis.
fn validate_softmax(op: &Operation, operands: &[Operand]) -> Result<(), OpError> {
    expect_inputs(op, 2, 3)?;
    expect_outputs(op, 1)?;
    expect_tensor(op, operands, 0)?;
    expect_scalar_of(op, operands, 1, &[OperandType::Float32, OperandType::Float16])?;
    if op.inputs.len() == 3 {
        expect_scalar_of(op, operands, 2, INT32)?;
    }
    Ok(())
}

/// DEPTH_TO_SPACE / SPACE_TO_DEPTH: tensor, block size, optional layout.
fn validate_block_rearrange(op: &Operation, operands: &[Operand]) -> Result<(), OpError> {
    expect_inputs(op, 2, 3)?;
    expect_outputs(op, 1)?;
    expect_tensor(op, operands, 0)?;
    expect_scalar_of(op, operands, 1, INT32)?;
    if op.inputs.len() == 3 {
        expect_scalar_of(op, operands, 2, BOOL)?;
    }
    Ok(())
}

/// BATCH_TO_SPACE_ND: tensor, block-shape tensor, optional layout.
fn validate_batch_to_space(op: &Operation, operands: &[Operand]) -> Result<(), OpError> {
    expect_inputs(op, 2, 3)?;
    expect_outputs(op, 1)?;
    expect_tensor(op, operands, 0)?;
    expect_scalar_of(op, operands, 1, TENSOR_INT32)?;
    if op.inputs.len() == 3 {
        expect_scalar_of(op, operands, 2, BOOL)?;
    }
    Ok(())
}

/// SPACE_TO_BATCH_ND: tensor, block-shape, paddings, optional layout.
fn validate_space_to_batch(op: &Operation, operands: &[Operand]) -> Result<(), OpError> {
    expect_inputs(op, 3, 4)?;
    expect_outputs(op, 1)?;
    expect_tensor(op, operands, 0)?;
    expect_scalar_of(op, operands, 1, TENSOR_INT32)?;
    expect_scalar_of(op, operands, 2, TENSOR_INT32)?;
    if op.inputs.len() == 4 {
        expect_scalar_of(op, operands, 3, BOOL)?;
    }
    Ok(())
}

/// L2_NORMALIZATION: tensor, optional axis.
fn validate_l2_normalization(op: &Operation, operands: &[Operand]) -> Result<(), OpError> {
    expect_inputs(op, 1, 2)?;
    expect_outputs(op, 1)?;
    expect_tensor(op, operands, 0)?;
    if op.inputs.len() == 2 {
        expect_scalar_of(op, operands, 1, INT32)?;
    }
    Ok(())
}

/// LOCAL_RESPONSE_NORMALIZATION: tensor, radius, bias, alpha, beta,
/// optional axis.
fn validate_lrn(op: &Operation, operands: &[Operand]) -> Result<(), OpError> {
    expect_inputs(op, 5, 6)?;
    expect_outputs(op, 1)?;
    expect_tensor(op, operands, 0)?;
    expect_scalar_of(op, operands, 1, INT32)?;
    for slot in 2..5 {
        expect_scalar_of(op, operands, slot, &[OperandType::Float32, OperandType::Float16])?;
    }
    if op.inputs.len() == 6 {
        expect_scalar_of(op, operands, 5, INT32)?;
    }
    Ok(())
}

/// RESIZE_BILINEAR: tensor, two extents (int32 by-shape or float by-scale),
/// up to three trailing flags.
fn validate_resize_bilinear(op: &Operation, operands: &[Operand]) -> Result<(), OpError> {
    expect_inputs(op, 3, 6)?;
    expect_outputs(op, 1)?;
    expect_tensor(op, operands, 0)?;
    let extent_types = &[OperandType::Int32, OperandType::Float32, OperandType::Float16];
    expect_scalar_of(op, operands, 1, extent_types)?;
    expect_scalar_of(op, operands, 2, extent_types)?;
    for slot in 3..op.inputs.len() {
        expect_scalar_of(op, operands, slot, BOOL)?;
    }
    Ok(())
}

/// RESIZE_NEAREST_NEIGHBOR: like bilinear but the layout flag is part of
/// the base arity.
fn validate_resize_nearest(op: &Operation, operands: &[Operand]) -> Result<(), OpError> {
    expect_inputs(op, 4, 6)?;
    expect_outputs(op, 1)?;
    expect_tensor(op, operands, 0)?;
    let extent_types = &[OperandType::Int32, OperandType::Float32, OperandType::Float16];
    expect_scalar_of(op, operands, 1, extent_types)?;
    expect_scalar_of(op, operands, 2, extent_types)?;
    for slot in 3..op.inputs.len() {
        expect_scalar_of(op, operands, slot, BOOL)?;
    }
    Ok(())
}

/// PAD: tensor plus paddings tensor.
fn validate_pad(op: &Operation, operands: &[Operand]) -> Result<(), OpError> {
    expect_inputs(op, 2, 2)?;
    expect_outputs(op, 1)?;
    expect_tensor(op, operands, 0)?;
    expect_scalar_of(op, operands, 1, TENSOR_INT32)
}

/// TRANSPOSE: tensor plus optional permutation.
fn validate_transpose(op: &Operation, operands: &[Operand]) -> Result<(), OpError> {
    expect_inputs(op, 1, 2)?;
    expect_outputs(op, 1)?;
    expect_tensor(op, operands, 0)?;
    if op.inputs.len() == 2 {
        expect_scalar_of(op, operands, 1, TENSOR_INT32)?;
    }
    Ok(())
}

/// Legacy OEM operation: opaque to the runtime; only the output arity
/// is enforced.
fn validate_oem(op: &Operation, _operands: &[Operand]) -> Result<(), OpError> {
    if op.outputs.is_empty() {
        return Err(OpError::WrongOutputCount {
            operation: op.operation_type.to_string(),
            expected: 1,
            actual: 0,
        });
    }
    Ok(())
}

// ── Prepare entries ────────────────────────────────────────────────

/// Shape propagation for the broadcasting binary ops.
fn prepare_elementwise_binary(ctx: &mut PrepareContext<'_>) -> Result<(), OpError> {
    let out_dims = kernels::broadcast_shapes(
        ctx.operation_type,
        &ctx.inputs[0].dimensions,
        &ctx.inputs[1].dimensions,
    )?;
    ctx.outputs[0].dimensions = out_dims;
    Ok(())
}

/// Shape propagation for shape-preserving unary ops.
fn prepare_unary(ctx: &mut PrepareContext<'_>) -> Result<(), OpError> {
    ctx.outputs[0].dimensions = ctx.inputs[0].dimensions.clone();
    Ok(())
}

// ── Registration ───────────────────────────────────────────────────

/// Registers the built-in operation set.
pub(crate) fn register_all(registry: &mut OperationRegistry) {
    use graph_types::OperationType as Op;

    let mut add = OperationEntry::validator(Op::Add, validate_elementwise_binary);
    add.prepare = Some(prepare_elementwise_binary);
    add.execute = Some(kernels::execute_add);
    registry.register(add);

    let mut mul = OperationEntry::validator(Op::Mul, validate_elementwise_binary);
    mul.prepare = Some(prepare_elementwise_binary);
    mul.execute = Some(kernels::execute_mul);
    registry.register(mul);

    registry.register(OperationEntry::validator(Op::Sub, validate_elementwise_binary));
    registry.register(OperationEntry::validator(Op::Div, validate_elementwise_binary));

    let mut relu = OperationEntry::validator(Op::Relu, validate_unary);
    relu.prepare = Some(prepare_unary);
    relu.execute = Some(kernels::execute_relu);
    registry.register(relu);

    for (op, validate) in [
        (Op::Relu6, validate_unary as crate::ValidateFn),
        (Op::Logistic, validate_unary),
        (Op::Tanh, validate_unary),
        (Op::Dequantize, validate_unary),
    ] {
        let mut entry = OperationEntry::validator(op, validate);
        entry.prepare = Some(prepare_unary);
        registry.register(entry);
    }

    registry.register(OperationEntry::validator(Op::AveragePool2d, validate_pool_2d));
    registry.register(OperationEntry::validator(Op::L2Pool2d, validate_pool_2d));
    registry.register(OperationEntry::validator(Op::MaxPool2d, validate_pool_2d));
    registry.register(OperationEntry::validator(Op::Conv2d, validate_conv_2d));
    registry.register(OperationEntry::validator(Op::DepthwiseConv2d, validate_depthwise_conv_2d));
    registry.register(OperationEntry::validator(Op::Concatenation, validate_concatenation));
    registry.register(OperationEntry::validator(Op::FullyConnected, validate_fully_connected));
    registry.register(OperationEntry::validator(Op::Reshape, validate_reshape));
    registry.register(OperationEntry::validator(Op::Softmax, validate_softmax));
    registry.register(OperationEntry::validator(Op::DepthToSpace, validate_block_rearrange));
    registry.register(OperationEntry::validator(Op::SpaceToDepth, validate_block_rearrange));
    registry.register(OperationEntry::validator(Op::BatchToSpaceNd, validate_batch_to_space));
    registry.register(OperationEntry::validator(Op::SpaceToBatchNd, validate_space_to_batch));
    registry.register(OperationEntry::validator(Op::L2Normalization, validate_l2_normalization));
    registry.register(OperationEntry::validator(
        Op::LocalResponseNormalization,
        validate_lrn,
    ));
    registry.register(OperationEntry::validator(Op::ResizeBilinear, validate_resize_bilinear));
    registry.register(OperationEntry::validator(
        Op::ResizeNearestNeighbor,
        validate_resize_nearest,
    ));
    registry.register(OperationEntry::validator(Op::Pad, validate_pad));

    let mut transpose = OperationEntry::validator(Op::Transpose, validate_transpose);
    transpose.allow_omitted_operand = true;
    registry.register(transpose);

    registry.register(OperationEntry::validator(Op::OemOperation, validate_oem));
}

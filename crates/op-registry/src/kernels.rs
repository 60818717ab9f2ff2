// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference kernels for the elementwise entries.
//!
//! The real kernel catalog is a separate contract; these float32 entries
//! exist so the CPU reference device can run a model end to end. They
//! operate on pre-sized output buffers and never allocate in the loop.

use crate::registry::ExecuteContext;
use crate::OpError;
use graph_types::OperationType;

/// Numpy-style broadcast of two shapes, trailing dimensions aligned.
pub(crate) fn broadcast_shapes(
    operation_type: OperationType,
    lhs: &[u32],
    rhs: &[u32],
) -> Result<Vec<u32>, OpError> {
    let rank = lhs.len().max(rhs.len());
    let mut out = vec![0u32; rank];
    for i in 0..rank {
        let a = if i < lhs.len() { lhs[lhs.len() - 1 - i] } else { 1 };
        let b = if i < rhs.len() { rhs[rhs.len() - 1 - i] } else { 1 };
        out[rank - 1 - i] = if a == b || b == 1 {
            a
        } else if a == 1 {
            b
        } else {
            return Err(OpError::IncompatibleShapes {
                operation: operation_type.to_string(),
                lhs: lhs.to_vec(),
                rhs: rhs.to_vec(),
            });
        };
    }
    Ok(out)
}

fn read_f32(bytes: &[u8], index: usize) -> f32 {
    let start = index * 4;
    f32::from_ne_bytes([bytes[start], bytes[start + 1], bytes[start + 2], bytes[start + 3]])
}

fn write_f32(bytes: &mut [u8], index: usize, value: f32) {
    let start = index * 4;
    bytes[start..start + 4].copy_from_slice(&value.to_ne_bytes());
}

/// Fused-activation codes carried by the trailing scalar input.
fn apply_activation(code: i32, value: f32) -> f32 {
    match code {
        1 => value.max(0.0),               // RELU
        2 => value.clamp(-1.0, 1.0),       // RELU1
        3 => value.clamp(0.0, 6.0),        // RELU6
        _ => value,
    }
}

fn activation_code(ctx: &ExecuteContext<'_>) -> i32 {
    ctx.input_buffers
        .get(2)
        .filter(|b| b.len() == 4)
        .map(|b| i32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .unwrap_or(0)
}

fn execute_binary_f32(
    ctx: &mut ExecuteContext<'_>,
    op: fn(f32, f32) -> f32,
) -> Result<(), OpError> {
    let count = ctx.output_buffers[0].len() / 4;
    let lhs = ctx.input_buffers[0];
    let rhs = ctx.input_buffers[1];
    if lhs.len() != count * 4 || rhs.len() != count * 4 {
        // Broadcast execution is not supported by the reference kernels.
        return Err(OpError::KernelFailed {
            operation: ctx.operation_type.to_string(),
            detail: format!(
                "reference kernel requires same-size buffers ({} vs {} vs {})",
                lhs.len(),
                rhs.len(),
                count * 4,
            ),
        });
    }
    let activation = activation_code(ctx);
    let out = &mut ctx.output_buffers[0];
    for i in 0..count {
        let v = op(read_f32(lhs, i), read_f32(rhs, i));
        write_f32(out, i, apply_activation(activation, v));
    }
    Ok(())
}

/// ADD over float32 buffers.
pub(crate) fn execute_add(ctx: &mut ExecuteContext<'_>) -> Result<(), OpError> {
    execute_binary_f32(ctx, |a, b| a + b)
}

/// MUL over float32 buffers.
pub(crate) fn execute_mul(ctx: &mut ExecuteContext<'_>) -> Result<(), OpError> {
    execute_binary_f32(ctx, |a, b| a * b)
}

/// RELU over a float32 buffer.
pub(crate) fn execute_relu(ctx: &mut ExecuteContext<'_>) -> Result<(), OpError> {
    let count = ctx.output_buffers[0].len() / 4;
    let input = ctx.input_buffers[0];
    if input.len() != count * 4 {
        return Err(OpError::KernelFailed {
            operation: ctx.operation_type.to_string(),
            detail: "input/output size mismatch".to_string(),
        });
    }
    let out = &mut ctx.output_buffers[0];
    for i in 0..count {
        write_f32(out, i, read_f32(input, i).max(0.0));
    }
    Ok(())
}

// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Finalization passes: run-order sort, whole-graph validation,
//! trailing-default trimming, dead-operand removal.

use crate::ModelError;
use graph_types::{LifeTime, Operand, OperandType, Operation, OperationType};
use std::collections::HashMap;

// ── Topological sort ───────────────────────────────────────────────

/// Sorts operations into a deterministic run order.
///
/// An operation's predecessor count is the number of its inputs whose
/// lifetime is `Temporary` or `SubgraphOutput` — values produced by
/// other operations. Ready operations are popped LIFO, so identical
/// graphs always produce identical orders. A final length mismatch
/// means a cycle or a never-written operand.
///
/// Returns the original position of each operation in the new order.
pub(crate) fn sort_into_run_order(
    operations: &mut Vec<Operation>,
    operands: &[Operand],
) -> Result<Vec<u32>, ModelError> {
    let mut operand_to_consumers: HashMap<u32, Vec<u32>> = HashMap::new();
    let mut unknown_input_count = vec![0u32; operations.len()];
    let mut ready: Vec<u32> = Vec::new();

    for (operation_index, operation) in operations.iter().enumerate() {
        let count = &mut unknown_input_count[operation_index];
        for &input in &operation.inputs {
            let lifetime = operands[input as usize].lifetime;
            if matches!(lifetime, LifeTime::Temporary | LifeTime::SubgraphOutput) {
                *count += 1;
                operand_to_consumers
                    .entry(input)
                    .or_default()
                    .push(operation_index as u32);
            }
        }
        if *count == 0 {
            ready.push(operation_index as u32);
        }
    }

    let mut sorted_index_map: Vec<u32> = Vec::with_capacity(operations.len());
    while let Some(operation_index) = ready.pop() {
        sorted_index_map.push(operation_index);
        for &output in &operations[operation_index as usize].outputs {
            let Some(consumers) = operand_to_consumers.get(&output) else {
                continue;
            };
            for &consumer in consumers {
                let count = &mut unknown_input_count[consumer as usize];
                if *count > 0 {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(consumer);
                    }
                }
            }
        }
    }

    if sorted_index_map.len() != operations.len() {
        return Err(ModelError::CyclicGraph);
    }

    let run_order: Vec<Operation> = sorted_index_map
        .iter()
        .map(|&i| operations[i as usize].clone())
        .collect();
    *operations = run_order;
    Ok(sorted_index_map)
}

// ── Whole-graph validation ─────────────────────────────────────────

/// Full structural pass over the sorted graph: single producers,
/// written outputs, resolvable subgraph references, consistent I/O
/// lifetimes.
pub(crate) fn validate_graph(
    operands: &[Operand],
    operations: &[Operation],
    input_indexes: &[u32],
    output_indexes: &[u32],
    referenced_count: usize,
) -> Result<(), ModelError> {
    let mut writers = vec![0u32; operands.len()];
    for operation in operations {
        for &output in &operation.outputs {
            writers[output as usize] += 1;
            if writers[output as usize] > 1 {
                return Err(ModelError::MultipleWriters { index: output });
            }
        }
    }

    for &output in output_indexes {
        if operands[output as usize].lifetime != LifeTime::SubgraphOutput {
            return Err(ModelError::LifetimeViolation {
                index: output,
                from: operands[output as usize].lifetime,
                to: LifeTime::SubgraphOutput,
            });
        }
        if writers[output as usize] == 0 {
            return Err(ModelError::UnwrittenOutput { index: output });
        }
    }
    for &input in input_indexes {
        if operands[input as usize].lifetime != LifeTime::SubgraphInput {
            return Err(ModelError::LifetimeViolation {
                index: input,
                from: operands[input as usize].lifetime,
                to: LifeTime::SubgraphInput,
            });
        }
    }

    for (index, operand) in operands.iter().enumerate() {
        if operand.lifetime == LifeTime::SubgraphReference
            && operand.location.offset as usize >= referenced_count
        {
            return Err(ModelError::OperandOutOfRange {
                index: index as u32,
                count: referenced_count as u32,
            });
        }
    }
    Ok(())
}

// ── Trailing-default trimming ──────────────────────────────────────

/// The default-value patterns optional trailing inputs may hold.
#[derive(Clone, Copy)]
enum TailSpec {
    BoolFalse,
    Int32One,
    Int32NegativeOne,
}

/// Only inline-copied constants participate: matching a pool-backed
/// constant would mean touching shared memory during finish, so
/// `ConstantReference` operands never match.
fn matches_spec(spec: TailSpec, operand: &Operand, small_values: &[u8]) -> bool {
    if operand.lifetime != LifeTime::ConstantCopy {
        return false;
    }
    let offset = operand.location.offset as usize;
    let length = operand.location.length as usize;
    let Some(bytes) = small_values.get(offset..offset + length) else {
        return false;
    };
    match spec {
        TailSpec::BoolFalse => operand.operand_type == OperandType::Bool && bytes == [0u8],
        TailSpec::Int32One => {
            operand.operand_type == OperandType::Int32
                && bytes.len() == 4
                && i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) == 1
        }
        TailSpec::Int32NegativeOne => {
            operand.operand_type == OperandType::Int32
                && bytes.len() == 4
                && i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) == -1
        }
    }
}

/// Counts the trailing inputs, scanned back from the end, that hold the
/// expected defaults of `tail` (which starts at `tail_start`).
fn count_matching_trailing(
    tail_start: usize,
    tail: &[TailSpec],
    operation: &Operation,
    operands: &[Operand],
    small_values: &[u8],
) -> usize {
    let mut count = 0;
    for slot in (tail_start..operation.inputs.len()).rev() {
        let operand = &operands[operation.inputs[slot] as usize];
        if !matches_spec(tail[slot - tail_start], operand, small_values) {
            break;
        }
        count += 1;
    }
    count
}

/// How many trailing inputs of `operation` can be dropped.
///
/// Per-operation rules mirror the release history that introduced the
/// optional arguments; some adjacent pairs must be dropped together or
/// not at all (the convolution dilation factors).
fn num_trailing_to_remove(
    operation: &Operation,
    operands: &[Operand],
    small_values: &[u8],
) -> usize {
    use TailSpec as TS;
    let n = operation.inputs.len();
    let count = |start: usize, tail: &[TS]| {
        count_matching_trailing(start, tail, operation, operands, small_values)
    };
    let input_type =
        |slot: usize| operands[operation.inputs[slot] as usize].operand_type;

    match operation.operation_type {
        OperationType::AveragePool2d
        | OperationType::L2Pool2d
        | OperationType::MaxPool2d => {
            if n == 11 && input_type(7) == OperandType::Int32 {
                count(10, &[TS::BoolFalse])
            } else if n == 8 && input_type(7) == OperandType::Bool {
                count(7, &[TS::BoolFalse])
            } else {
                0
            }
        }
        OperationType::Conv2d => {
            if (11..=13).contains(&n) && input_type(7) == OperandType::Int32 {
                let c = count(10, &[TS::BoolFalse, TS::Int32One, TS::Int32One]);
                // The two dilation inputs come together or not at all.
                if n - c == 12 {
                    0
                } else {
                    c
                }
            } else if (8..=10).contains(&n) && input_type(7) == OperandType::Bool {
                let c = count(7, &[TS::BoolFalse, TS::Int32One, TS::Int32One]);
                if n - c == 9 {
                    0
                } else {
                    c
                }
            } else {
                0
            }
        }
        OperationType::DepthwiseConv2d => {
            if (12..=14).contains(&n) && input_type(8) == OperandType::Int32 {
                let c = count(11, &[TS::BoolFalse, TS::Int32One, TS::Int32One]);
                if n - c == 13 {
                    0
                } else {
                    c
                }
            } else if (9..=11).contains(&n) && input_type(8) == OperandType::Bool {
                let c = count(8, &[TS::BoolFalse, TS::Int32One, TS::Int32One]);
                if n - c == 10 {
                    0
                } else {
                    c
                }
            } else {
                0
            }
        }
        OperationType::DepthToSpace | OperationType::SpaceToDepth
        | OperationType::BatchToSpaceNd => {
            if n == 3 {
                count(2, &[TS::BoolFalse])
            } else {
                0
            }
        }
        OperationType::SpaceToBatchNd => {
            if n == 4 {
                count(3, &[TS::BoolFalse])
            } else {
                0
            }
        }
        OperationType::L2Normalization => {
            if n == 2 {
                count(1, &[TS::Int32NegativeOne])
            } else {
                0
            }
        }
        OperationType::LocalResponseNormalization => {
            if n == 6 {
                count(5, &[TS::Int32NegativeOne])
            } else {
                0
            }
        }
        OperationType::Softmax => {
            if n == 3 {
                count(2, &[TS::Int32NegativeOne])
            } else {
                0
            }
        }
        OperationType::ResizeBilinear => {
            if (4..=6).contains(&n) {
                count(3, &[TS::BoolFalse, TS::BoolFalse, TS::BoolFalse])
            } else {
                0
            }
        }
        OperationType::ResizeNearestNeighbor => {
            if (5..=6).contains(&n) {
                count(4, &[TS::BoolFalse, TS::BoolFalse])
            } else {
                0
            }
        }
        _ => 0,
    }
}

/// Drops trailing inputs holding constant default values.
///
/// Idempotent: a second application finds nothing left to drop.
/// Returns the number of operations that lost inputs.
pub(crate) fn trim_trailing_defaults(
    operations: &mut [Operation],
    operands: &[Operand],
    small_values: &[u8],
) -> usize {
    let mut trimmed = 0;
    for operation in operations.iter_mut() {
        let count = num_trailing_to_remove(operation, operands, small_values);
        if count == 0 {
            continue;
        }
        debug_assert!(count < operation.inputs.len());
        let new_len = operation.inputs.len() - count;
        tracing::debug!(
            "{}: dropping {count} trailing default inputs",
            operation.operation_type,
        );
        operation.inputs.truncate(new_len);
        trimmed += 1;
    }
    trimmed
}

// ── Dead-operand removal ───────────────────────────────────────────

/// Removes operands unreachable from the graph outputs and the
/// operations that only feed them, compacting indices.
///
/// The model interface is preserved: declared inputs and outputs are
/// always retained.
pub(crate) fn remove_dead(
    operands: &mut Vec<Operand>,
    operations: &mut Vec<Operation>,
    input_indexes: &mut Vec<u32>,
    output_indexes: &mut Vec<u32>,
    sorted_index_map: &mut Vec<u32>,
) {
    let operand_count = operands.len();
    let mut operand_live = vec![false; operand_count];
    for &index in input_indexes.iter().chain(output_indexes.iter()) {
        operand_live[index as usize] = true;
    }

    let mut operation_live = vec![false; operations.len()];
    // Backward reachability to a fixpoint: an operation is live when any
    // of its outputs is; its inputs then become live.
    let mut changed = true;
    while changed {
        changed = false;
        for (operation_index, operation) in operations.iter().enumerate() {
            if operation_live[operation_index] {
                continue;
            }
            if operation.outputs.iter().any(|&o| operand_live[o as usize]) {
                operation_live[operation_index] = true;
                changed = true;
                for &input in &operation.inputs {
                    operand_live[input as usize] = true;
                }
            }
        }
    }

    let dead_operands = operand_live.iter().filter(|&&l| !l).count();
    if dead_operands == 0 && operation_live.iter().all(|&l| l) {
        return;
    }
    tracing::debug!(
        "removing {dead_operands} dead operands and {} dead operations",
        operation_live.iter().filter(|&&l| !l).count(),
    );

    let mut remap = vec![u32::MAX; operand_count];
    let mut next = 0u32;
    for index in 0..operand_count {
        if operand_live[index] {
            remap[index] = next;
            next += 1;
        }
    }

    let mut live_index = 0;
    operands.retain(|_| {
        let keep = operand_live[live_index];
        live_index += 1;
        keep
    });

    let mut operation_index = 0;
    operations.retain(|_| {
        let keep = operation_live[operation_index];
        operation_index += 1;
        keep
    });
    let mut map_index = 0;
    sorted_index_map.retain(|_| {
        let keep = operation_live[map_index];
        map_index += 1;
        keep
    });

    for operation in operations.iter_mut() {
        for input in operation.inputs.iter_mut() {
            *input = remap[*input as usize];
        }
        for output in operation.outputs.iter_mut() {
            *output = remap[*output as usize];
        }
    }
    for index in input_indexes.iter_mut().chain(output_indexes.iter_mut()) {
        *index = remap[*index as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_types::Operand;

    fn temp(dims: &[u32]) -> Operand {
        Operand::new(OperandType::TensorFloat32, dims.to_vec(), 0.0, 0)
    }

    fn op(inputs: &[u32], outputs: &[u32]) -> Operation {
        Operation {
            operation_type: OperationType::Relu,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
        }
    }

    #[test]
    fn test_sort_reorders_producer_first() {
        // Operand 0 is a graph input; op B consumes 2 (made by A).
        let mut operands = vec![temp(&[1]); 4];
        operands[0].lifetime = LifeTime::SubgraphInput;
        operands[1].lifetime = LifeTime::SubgraphInput;
        operands[3].lifetime = LifeTime::SubgraphOutput;

        let b = op(&[2], &[3]);
        let a = op(&[0, 1], &[2]);
        let mut operations = vec![b, a];
        let map = sort_into_run_order(&mut operations, &operands).unwrap();

        // A (original index 1) must run before B (original index 0).
        assert_eq!(map, vec![1, 0]);
        assert_eq!(operations[0].inputs, vec![0, 1]);
        assert_eq!(operations[1].inputs, vec![2]);
    }

    #[test]
    fn test_sort_rejects_cycle() {
        let mut operands = vec![temp(&[1]); 4];
        operands[0].lifetime = LifeTime::SubgraphInput;
        operands[3].lifetime = LifeTime::SubgraphOutput;

        // X: {0, 2} -> {1}; Y: {1} -> {2}; mutual dependence.
        let x = op(&[0, 2], &[1]);
        let y = op(&[1], &[2]);
        let z = op(&[2], &[3]);
        let mut operations = vec![x, y, z];
        assert!(matches!(
            sort_into_run_order(&mut operations, &operands),
            Err(ModelError::CyclicGraph)
        ));
    }

    #[test]
    fn test_sort_rejects_never_written() {
        let mut operands = vec![temp(&[1]); 2];
        operands[1].lifetime = LifeTime::SubgraphOutput;
        // Consumes temporary operand 0 that nothing writes.
        let mut operations = vec![op(&[0], &[1])];
        assert!(sort_into_run_order(&mut operations, &operands).is_err());
    }

    #[test]
    fn test_sort_is_lifo_deterministic() {
        // Two independent chains; the later-added ready op runs first.
        let mut operands = vec![temp(&[1]); 6];
        operands[0].lifetime = LifeTime::SubgraphInput;
        operands[1].lifetime = LifeTime::SubgraphInput;
        operands[4].lifetime = LifeTime::SubgraphOutput;
        operands[5].lifetime = LifeTime::SubgraphOutput;

        let make = || {
            vec![
                op(&[0], &[2]),
                op(&[1], &[3]),
                op(&[2], &[4]),
                op(&[3], &[5]),
            ]
        };
        let mut first = make();
        let mut second = make();
        let map_a = sort_into_run_order(&mut first, &operands).unwrap();
        let map_b = sort_into_run_order(&mut second, &operands).unwrap();
        assert_eq!(map_a, map_b);
    }

    #[test]
    fn test_validate_multiple_writers() {
        let mut operands = vec![temp(&[1]); 3];
        operands[0].lifetime = LifeTime::SubgraphInput;
        operands[2].lifetime = LifeTime::SubgraphOutput;
        let operations = vec![op(&[0], &[1]), op(&[0], &[1])];
        assert!(matches!(
            validate_graph(&operands, &operations, &[0], &[], 0),
            Err(ModelError::MultipleWriters { index: 1 })
        ));
    }

    #[test]
    fn test_validate_unwritten_output() {
        let mut operands = vec![temp(&[1]); 2];
        operands[0].lifetime = LifeTime::SubgraphInput;
        operands[1].lifetime = LifeTime::SubgraphOutput;
        assert!(matches!(
            validate_graph(&operands, &[], &[0], &[1], 0),
            Err(ModelError::UnwrittenOutput { index: 1 })
        ));
    }

    #[test]
    fn test_remove_dead_compacts() {
        // 0: input, 1: dead temporary, 2: live temporary, 3: output.
        let mut operands = vec![temp(&[1]); 4];
        operands[0].lifetime = LifeTime::SubgraphInput;
        operands[3].lifetime = LifeTime::SubgraphOutput;

        let mut operations = vec![
            op(&[0], &[1]), // dead: nothing downstream reads 1
            op(&[0], &[2]),
            op(&[2], &[3]),
        ];
        let mut inputs = vec![0];
        let mut outputs = vec![3];
        let mut map = vec![0, 1, 2];
        remove_dead(&mut operands, &mut operations, &mut inputs, &mut outputs, &mut map);

        assert_eq!(operands.len(), 3);
        assert_eq!(operations.len(), 2);
        assert_eq!(operations[0].inputs, vec![0]);
        assert_eq!(operations[0].outputs, vec![1]);
        assert_eq!(operations[1].outputs, vec![2]);
        assert_eq!(outputs, vec![2]);
        assert_eq!(map, vec![1, 2]);
    }

    #[test]
    fn test_remove_dead_keeps_unused_inputs() {
        let mut operands = vec![temp(&[1]); 3];
        operands[0].lifetime = LifeTime::SubgraphInput;
        operands[1].lifetime = LifeTime::SubgraphInput; // never consumed
        operands[2].lifetime = LifeTime::SubgraphOutput;
        let mut operations = vec![op(&[0], &[2])];
        let mut inputs = vec![0, 1];
        let mut outputs = vec![2];
        let mut map = vec![0];
        remove_dead(&mut operands, &mut operations, &mut inputs, &mut outputs, &mut map);

        // The interface survives even when an input is unused.
        assert_eq!(operands.len(), 3);
        assert_eq!(inputs, vec![0, 1]);
    }
}

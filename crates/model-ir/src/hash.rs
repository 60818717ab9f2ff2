// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The model arch-hash: a stable SHA-256 identity over the normalized
//! topology.
//!
//! The hash covers types, dimensions, quantization parameters, wiring,
//! I/O lists, subgraph references, the extension table, and the relax
//! flag. It deliberately excludes constant payloads and storage
//! locations: where a constant lives (inline arena vs memory pool) is a
//! packaging detail, not topology, so the constant lifetimes collapse
//! to one tag.

use crate::{Model, Subgraph};
use graph_types::{ExtraParams, LifeTime, Operand};
use sha2::{Digest, Sha256};
use std::sync::Arc;

fn lifetime_tag(lifetime: LifeTime) -> u8 {
    match lifetime {
        LifeTime::Temporary => 0,
        LifeTime::ConstantCopy | LifeTime::ConstantReference | LifeTime::Pointer => 1,
        LifeTime::NoValue => 2,
        LifeTime::SubgraphInput => 3,
        LifeTime::SubgraphOutput => 4,
        LifeTime::SubgraphReference => 5,
    }
}

fn update_u32(hasher: &mut Sha256, value: u32) {
    hasher.update(value.to_le_bytes());
}

fn update_operand(hasher: &mut Sha256, operand: &Operand) {
    update_u32(hasher, operand.operand_type.code());
    update_u32(hasher, operand.dimensions.len() as u32);
    for &dim in &operand.dimensions {
        update_u32(hasher, dim);
    }
    update_u32(hasher, operand.scale.to_bits());
    update_u32(hasher, operand.zero_point as u32);
    hasher.update([lifetime_tag(operand.lifetime)]);
    if operand.lifetime == LifeTime::SubgraphReference {
        update_u32(hasher, operand.location.offset);
    }
    match &operand.extra_params {
        ExtraParams::None => hasher.update([0u8]),
        ExtraParams::Channel { scales, channel_dim } => {
            hasher.update([1u8]);
            update_u32(hasher, *channel_dim);
            update_u32(hasher, scales.len() as u32);
            for scale in scales {
                update_u32(hasher, scale.to_bits());
            }
        }
        ExtraParams::Extension(data) => {
            hasher.update([2u8]);
            update_u32(hasher, data.len() as u32);
            hasher.update(data);
        }
    }
}

fn update_subgraph(hasher: &mut Sha256, subgraph: &Subgraph) {
    update_u32(hasher, subgraph.operands.len() as u32);
    for operand in &subgraph.operands {
        update_operand(hasher, operand);
    }
    update_u32(hasher, subgraph.operations.len() as u32);
    for operation in &subgraph.operations {
        update_u32(hasher, operation.operation_type.code());
        update_u32(hasher, operation.inputs.len() as u32);
        for &input in &operation.inputs {
            update_u32(hasher, input);
        }
        update_u32(hasher, operation.outputs.len() as u32);
        for &output in &operation.outputs {
            update_u32(hasher, output);
        }
    }
    update_u32(hasher, subgraph.input_indexes.len() as u32);
    for &index in &subgraph.input_indexes {
        update_u32(hasher, index);
    }
    update_u32(hasher, subgraph.output_indexes.len() as u32);
    for &index in &subgraph.output_indexes {
        update_u32(hasher, index);
    }
}

/// Hashes the normalized model topology into a 32-byte digest.
pub(crate) fn arch_hash(
    main: &Subgraph,
    referenced: &[Arc<Model>],
    extensions: &[(String, u16)],
    relaxed: bool,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    update_subgraph(&mut hasher, main);
    update_u32(&mut hasher, referenced.len() as u32);
    for model in referenced {
        // Referenced models are already finished; fold in their identity.
        hasher.update(model.arch_hash());
    }
    update_u32(&mut hasher, extensions.len() as u32);
    for (name, prefix) in extensions {
        update_u32(&mut hasher, name.len() as u32);
        hasher.update(name.as_bytes());
        hasher.update(prefix.to_le_bytes());
    }
    hasher.update([relaxed as u8]);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_types::{OperandType, Operation, OperationType};

    fn subgraph() -> Subgraph {
        let mut a = Operand::new(OperandType::TensorFloat32, vec![2, 2], 0.0, 0);
        a.lifetime = LifeTime::SubgraphInput;
        let mut b = Operand::new(OperandType::TensorFloat32, vec![2, 2], 0.0, 0);
        b.lifetime = LifeTime::SubgraphOutput;
        Subgraph {
            operands: vec![a, b],
            operations: vec![Operation {
                operation_type: OperationType::Relu,
                inputs: vec![0],
                outputs: vec![1],
            }],
            input_indexes: vec![0],
            output_indexes: vec![1],
        }
    }

    #[test]
    fn test_equal_topologies_equal_hashes() {
        let h1 = arch_hash(&subgraph(), &[], &[], false);
        let h2 = arch_hash(&subgraph(), &[], &[], false);
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_dimension_changes_hash() {
        let mut other = subgraph();
        other.operands[0].dimensions = vec![2, 3];
        assert_ne!(arch_hash(&subgraph(), &[], &[], false), arch_hash(&other, &[], &[], false));
    }

    #[test]
    fn test_wiring_changes_hash() {
        let mut other = subgraph();
        other.operations[0].inputs = vec![1];
        assert_ne!(arch_hash(&subgraph(), &[], &[], false), arch_hash(&other, &[], &[], false));
    }

    #[test]
    fn test_relax_flag_changes_hash() {
        assert_ne!(
            arch_hash(&subgraph(), &[], &[], false),
            arch_hash(&subgraph(), &[], &[], true)
        );
    }

    #[test]
    fn test_constant_storage_class_does_not_change_hash() {
        let mut copy_side = subgraph();
        let mut c = Operand::new(OperandType::TensorFloat32, vec![1], 0.0, 0);
        c.lifetime = LifeTime::ConstantCopy;
        copy_side.operands.push(c);

        let mut reference_side = subgraph();
        let mut c = Operand::new(OperandType::TensorFloat32, vec![1], 0.0, 0);
        c.lifetime = LifeTime::ConstantReference;
        reference_side.operands.push(c);

        assert_eq!(
            arch_hash(&copy_side, &[], &[], false),
            arch_hash(&reference_side, &[], &[], false)
        );
    }
}

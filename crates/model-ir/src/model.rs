// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The immutable, finished model.
//!
//! A [`Model`] is a value: once emitted by
//! [`ModelBuilder::finish`](crate::ModelBuilder::finish) nothing can
//! mutate it, so it is freely shareable across threads for as long as
//! any compilation or plan references it.

use graph_types::{FeatureLevel, LifeTime, Operand, Operation};
use operand_pool::Memory;
use std::sync::Arc;

/// A self-contained graph: operands, operations, and its own I/O lists.
///
/// Operation order is the deterministic run order produced at finish
/// time.
#[derive(Debug, Clone)]
pub struct Subgraph {
    pub operands: Vec<Operand>,
    pub operations: Vec<Operation>,
    pub input_indexes: Vec<u32>,
    pub output_indexes: Vec<u32>,
}

impl Subgraph {
    /// Number of operands in the table.
    pub fn operand_count(&self) -> usize {
        self.operands.len()
    }

    /// Number of operations, in run order.
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }
}

/// The finalized graph plus everything its execution needs: the
/// consolidated constant arena, the memory pools, the extension table,
/// the relax flag, and the arch-hash identity.
#[derive(Debug)]
pub struct Model {
    pub(crate) main: Subgraph,
    pub(crate) referenced: Vec<Arc<Model>>,
    pub(crate) operand_values: Arc<[u8]>,
    pub(crate) pools: Vec<Memory>,
    pub(crate) extension_name_to_prefix: Vec<(String, u16)>,
    pub(crate) relaxed: bool,
    pub(crate) arch_hash: [u8; 32],
    pub(crate) feature_level: FeatureLevel,
    pub(crate) has_oem_operation: bool,
    pub(crate) has_extension_operation: bool,
    /// Original position of each operation before the run-order sort,
    /// for debugging.
    pub(crate) sorted_index_map: Vec<u32>,
}

impl Model {
    /// The main subgraph.
    pub fn main(&self) -> &Subgraph {
        &self.main
    }

    /// The operand table of the main subgraph.
    pub fn operands(&self) -> &[Operand] {
        &self.main.operands
    }

    /// The operations of the main subgraph, in run order.
    pub fn operations(&self) -> &[Operation] {
        &self.main.operations
    }

    /// Indices of the model inputs.
    pub fn input_indexes(&self) -> &[u32] {
        &self.main.input_indexes
    }

    /// Indices of the model outputs.
    pub fn output_indexes(&self) -> &[u32] {
        &self.main.output_indexes
    }

    /// Models referenced through subgraph-reference operands.
    pub fn referenced_models(&self) -> &[Arc<Model>] {
        &self.referenced
    }

    /// The consolidated inline constant arena.
    pub fn operand_values(&self) -> &[u8] {
        &self.operand_values
    }

    /// The memory pools backing `ConstantReference` operands.
    pub fn pools(&self) -> &[Memory] {
        &self.pools
    }

    /// Extensions in use, as `(name, prefix)` pairs.
    pub fn extension_name_to_prefix(&self) -> &[(String, u16)] {
        &self.extension_name_to_prefix
    }

    /// Whether float32 computation may be relaxed to float16.
    pub fn is_relaxed(&self) -> bool {
        self.relaxed
    }

    /// The stable content hash over the normalized topology. Constant
    /// payloads are excluded.
    pub fn arch_hash(&self) -> &[u8; 32] {
        &self.arch_hash
    }

    /// The minimum runtime feature level this model requires.
    pub fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }

    /// Whether any operation uses the legacy OEM code.
    pub fn has_oem_operation(&self) -> bool {
        self.has_oem_operation
    }

    /// Whether any operation uses an extension code.
    pub fn has_extension_operation(&self) -> bool {
        self.has_extension_operation
    }

    /// For each run-order position, the operation's original index at
    /// build time.
    pub fn sorted_index_map(&self) -> &[u32] {
        &self.sorted_index_map
    }

    /// The constant bytes backing an operand, if it is a constant.
    pub fn constant_bytes(&self, operand: &Operand) -> Option<&[u8]> {
        let loc = operand.location;
        match operand.lifetime {
            LifeTime::ConstantCopy => self
                .operand_values
                .get(loc.offset as usize..(loc.offset + loc.length) as usize),
            LifeTime::ConstantReference => self
                .pools
                .get(loc.pool_index as usize)?
                .as_slice()
                .get(loc.offset as usize..(loc.offset + loc.length) as usize),
            _ => None,
        }
    }

    /// Returns a concise human-readable description.
    pub fn summary(&self) -> String {
        format!(
            "Model: {} operands, {} operations, {} inputs, {} outputs, \
             {} referenced subgraphs, {} pools, level {}{}",
            self.main.operand_count(),
            self.main.operation_count(),
            self.main.input_indexes.len(),
            self.main.output_indexes.len(),
            self.referenced.len(),
            self.pools.len(),
            self.feature_level,
            if self.relaxed { ", relaxed fp" } else { "" },
        )
    }
}

// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The mutable graph under construction.
//!
//! Every mutation validates its arguments against the current operand
//! table before touching any state — a mutation either applies fully or
//! not at all. Constant values route by size: small values are copied
//! into the inline arena immediately, large values are deferred and
//! consolidated into a single shared pool at finish time, and
//! memory-backed values reference a tracked client pool directly.

use crate::normalize;
use crate::{hash, Model, ModelError, Subgraph};
use graph_types::{
    DataLocation, ExtraParams, FeatureLevel, LifeTime, Operand, OperandType, Operation,
    OperationType, TypeRegistry, MAX_NUMBER_OF_OPERANDS, MAX_NUMBER_OF_OPERATIONS,
};
use op_registry::OperationRegistry;
use operand_pool::{
    LargeValueStore, Memory, MemoryTracker, ValueArena, SMALL_VALUE_THRESHOLD,
};
use std::sync::Arc;

/// Incrementally builds a computation graph, validating every mutation.
///
/// Consumed by [`finish`](Self::finish), which emits the immutable
/// [`Model`]. A builder belongs to one logical client; concurrent
/// read-only queries are fine, concurrent mutation is not.
pub struct ModelBuilder<'reg> {
    registry: &'reg TypeRegistry,
    operands: Vec<Operand>,
    operations: Vec<Operation>,
    small_values: ValueArena,
    large_values: LargeValueStore,
    memories: MemoryTracker,
    referenced_models: Vec<Arc<Model>>,
    input_indexes: Vec<u32>,
    output_indexes: Vec<u32>,
    io_identified: bool,
    relaxed: bool,
    simplify: bool,
    invalid: bool,
    has_oem_operation: bool,
    has_extension_operation: bool,
}

impl Default for ModelBuilder<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder<'static> {
    /// Creates a builder against the process-wide type registry.
    pub fn new() -> Self {
        Self::with_registry(TypeRegistry::global())
    }
}

impl<'reg> ModelBuilder<'reg> {
    /// Creates a builder against an explicit type registry.
    pub fn with_registry(registry: &'reg TypeRegistry) -> Self {
        Self {
            registry,
            operands: Vec::new(),
            operations: Vec::new(),
            small_values: ValueArena::new(),
            large_values: LargeValueStore::new(),
            memories: MemoryTracker::new(),
            referenced_models: Vec::new(),
            input_indexes: Vec::new(),
            output_indexes: Vec::new(),
            io_identified: false,
            relaxed: false,
            simplify: false,
            invalid: false,
            has_oem_operation: false,
            has_extension_operation: false,
        }
    }

    // ── Queries ────────────────────────────────────────────────────

    /// Number of operands added so far.
    pub fn operand_count(&self) -> usize {
        self.operands.len()
    }

    /// Number of operations added so far.
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// The operand at `index`, if present.
    pub fn operand(&self, index: u32) -> Option<&Operand> {
        self.operands.get(index as usize)
    }

    /// Whether a failed `add_operation` has invalidated this builder.
    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    fn ensure_mutable(&self, op: &'static str) -> Result<(), ModelError> {
        if self.invalid {
            return Err(ModelError::Invalidated { op });
        }
        Ok(())
    }

    fn check_index(&self, index: u32) -> Result<(), ModelError> {
        if (index as usize) < self.operands.len() {
            Ok(())
        } else {
            Err(ModelError::OperandOutOfRange {
                index,
                count: self.operands.len() as u32,
            })
        }
    }

    fn transition(&mut self, index: u32, to: LifeTime) -> Result<(), ModelError> {
        let operand = &mut self.operands[index as usize];
        if !operand.lifetime.can_transition_to(to) {
            return Err(ModelError::LifetimeViolation {
                index,
                from: operand.lifetime,
                to,
            });
        }
        operand.lifetime = to;
        Ok(())
    }

    /// Expected byte size for a constant bound to this operand, with the
    /// fully-specified check. `None` means the size is not checked (the
    /// legacy opaque byte tensor).
    fn expected_value_size(&self, index: u32) -> Result<Option<usize>, ModelError> {
        let operand = &self.operands[index as usize];
        if self.registry.is_tensor(operand.operand_type)? && !operand.is_fully_specified() {
            return Err(ModelError::NotFullySpecified { index });
        }
        if operand.operand_type == OperandType::TensorOemByte {
            return Ok(None);
        }
        let expected = self
            .registry
            .size_of_data(operand.operand_type, &operand.dimensions)?;
        Ok(Some(expected))
    }

    // ── Mutations ──────────────────────────────────────────────────

    /// Adds an operand and returns its index.
    ///
    /// Construct the descriptor with [`Operand::new`]; lifetime,
    /// location, and extra parameters are owned by the builder and must
    /// arrive at their defaults.
    pub fn add_operand(&mut self, operand: Operand) -> Result<u32, ModelError> {
        self.ensure_mutable("add_operand")?;
        let index = self.operands.len() as u32;
        if index >= MAX_NUMBER_OF_OPERANDS {
            return Err(ModelError::TooManyOperands(index));
        }
        if operand.lifetime != LifeTime::Temporary
            || operand.location != DataLocation::default()
            || operand.extra_params != ExtraParams::None
        {
            return Err(ModelError::NotPristine { index });
        }
        self.registry.validate_operand(&operand)?;
        self.operands.push(operand);
        Ok(index)
    }

    /// Binds a constant value to an operand.
    ///
    /// `None` marks the operand as an omitted optional (`NoValue`).
    /// Otherwise the value length must equal the type's computed size
    /// (the legacy opaque byte tensor excepted); the value is copied
    /// inline when small, deferred to the shared pool when large.
    pub fn set_operand_value(&mut self, index: u32, value: Option<&[u8]>) -> Result<(), ModelError> {
        self.ensure_mutable("set_operand_value")?;
        self.check_index(index)?;

        let Some(bytes) = value else {
            self.transition(index, LifeTime::NoValue)?;
            self.operands[index as usize].location = DataLocation::default();
            return Ok(());
        };

        if let Some(expected) = self.expected_value_size(index)? {
            if bytes.len() != expected {
                return Err(ModelError::SizeMismatch {
                    index,
                    expected,
                    actual: bytes.len(),
                });
            }
        }

        if bytes.len() <= SMALL_VALUE_THRESHOLD {
            self.transition(index, LifeTime::ConstantCopy)?;
            let offset = self.small_values.append(bytes)?;
            self.operands[index as usize].location = DataLocation {
                pool_index: 0,
                offset,
                length: bytes.len() as u32,
            };
        } else {
            self.transition(index, LifeTime::Pointer)?;
            self.large_values.record(index, bytes.to_vec());
            self.operands[index as usize].location = DataLocation {
                pool_index: 0,
                offset: 0,
                length: bytes.len() as u32,
            };
        }
        Ok(())
    }

    /// Binds a constant value living in a client memory pool.
    pub fn set_operand_value_from_memory(
        &mut self,
        index: u32,
        memory: &Memory,
        offset: u32,
        length: u32,
    ) -> Result<(), ModelError> {
        self.ensure_mutable("set_operand_value_from_memory")?;
        self.check_index(index)?;
        memory.validate_range(offset, length)?;
        if let Some(expected) = self.expected_value_size(index)? {
            if length as usize != expected {
                return Err(ModelError::SizeMismatch {
                    index,
                    expected,
                    actual: length as usize,
                });
            }
        }
        self.transition(index, LifeTime::ConstantReference)?;
        let pool_index = self.memories.add(memory)?;
        self.operands[index as usize].location = DataLocation {
            pool_index,
            offset,
            length,
        };
        Ok(())
    }

    /// Binds a subgraph-reference operand to a finished model.
    ///
    /// The referenced model is shared, never copied; its lifetime must
    /// cover every holder of the emitted model.
    pub fn set_operand_value_from_model(
        &mut self,
        index: u32,
        model: &Arc<Model>,
    ) -> Result<(), ModelError> {
        self.ensure_mutable("set_operand_value_from_model")?;
        self.check_index(index)?;
        if self.operands[index as usize].operand_type != OperandType::Subgraph {
            return Err(ModelError::NotSubgraphType { index });
        }
        self.transition(index, LifeTime::SubgraphReference)?;
        let ref_index = self
            .referenced_models
            .iter()
            .position(|m| Arc::ptr_eq(m, model))
            .unwrap_or_else(|| {
                self.referenced_models.push(Arc::clone(model));
                self.referenced_models.len() - 1
            });
        self.operands[index as usize].location = DataLocation {
            pool_index: 0,
            offset: ref_index as u32,
            length: 0,
        };
        Ok(())
    }

    /// Attaches per-channel quantization parameters.
    pub fn set_operand_per_channel_quant(
        &mut self,
        index: u32,
        scales: &[f32],
        channel_dim: u32,
    ) -> Result<(), ModelError> {
        self.ensure_mutable("set_operand_per_channel_quant")?;
        self.check_index(index)?;
        let operand = &self.operands[index as usize];
        if operand.operand_type != OperandType::TensorQuant8SymmPerChannel {
            return Err(ModelError::NotPerChannel { index });
        }
        let rank = operand.dimensions.len();
        if channel_dim as usize >= rank {
            return Err(ModelError::BadChannelDim {
                index,
                channel_dim,
                rank,
            });
        }
        let extent = operand.dimensions[channel_dim as usize];
        if scales.len() != extent as usize {
            return Err(ModelError::ChannelCountMismatch {
                index,
                expected: extent,
                actual: scales.len(),
            });
        }
        if let Some((channel, &scale)) =
            scales.iter().enumerate().find(|(_, &s)| s <= 0.0)
        {
            return Err(ModelError::BadChannelScale {
                index,
                channel,
                scale,
            });
        }
        self.operands[index as usize].extra_params = ExtraParams::Channel {
            scales: scales.to_vec(),
            channel_dim,
        };
        Ok(())
    }

    /// Attaches opaque extension data to an extension operand.
    pub fn set_operand_extension_data(
        &mut self,
        index: u32,
        data: &[u8],
    ) -> Result<(), ModelError> {
        self.ensure_mutable("set_operand_extension_data")?;
        self.check_index(index)?;
        let operand = &self.operands[index as usize];
        if !operand.operand_type.is_extension() {
            return Err(ModelError::NotExtensionType { index });
        }
        self.operands[index as usize].extra_params = if data.is_empty() {
            ExtraParams::None
        } else {
            ExtraParams::Extension(data.to_vec())
        };
        Ok(())
    }

    /// Adds an operation connecting existing operands.
    ///
    /// A validation failure here invalidates the builder: a partial
    /// op-level decision was already recorded, so every later mutation
    /// and `finish` fail as bad state.
    pub fn add_operation(
        &mut self,
        operation_type: OperationType,
        inputs: Vec<u32>,
        outputs: Vec<u32>,
    ) -> Result<u32, ModelError> {
        self.ensure_mutable("add_operation")?;
        let result = self.try_add_operation(operation_type, inputs, outputs);
        if let Err(err) = &result {
            tracing::warn!("add_operation failed ({err}); builder invalidated");
            self.invalid = true;
        }
        result
    }

    fn try_add_operation(
        &mut self,
        operation_type: OperationType,
        inputs: Vec<u32>,
        outputs: Vec<u32>,
    ) -> Result<u32, ModelError> {
        let index = self.operations.len() as u32;
        if index >= MAX_NUMBER_OF_OPERATIONS {
            return Err(ModelError::TooManyOperations(index));
        }
        for &operand_index in inputs.iter().chain(outputs.iter()) {
            self.check_index(operand_index)?;
        }
        for &output in &outputs {
            let lifetime = self.operands[output as usize].lifetime;
            if !matches!(lifetime, LifeTime::Temporary | LifeTime::SubgraphOutput) {
                return Err(ModelError::OutputNotWritable {
                    index: output,
                    lifetime,
                });
            }
        }

        let operation = Operation {
            operation_type,
            inputs,
            outputs,
        };

        match operation_type {
            OperationType::Extension(id) => {
                if !self.registry.extensions_allowed() {
                    return Err(graph_types::TypeError::ExtensionsNotAllowed.into());
                }
                let (prefix, _) = graph_types::decompose_type_id(id);
                if self.registry.prefix_name(prefix).is_none() {
                    return Err(graph_types::TypeError::UnknownPrefix(prefix).into());
                }
                // A registered extension entry validates structurally;
                // otherwise the operation is opaque to the runtime.
                if OperationRegistry::global().is_registered(operation_type) {
                    OperationRegistry::global().validate(&operation, &self.operands)?;
                }
                self.has_extension_operation = true;
            }
            OperationType::OemOperation => {
                tracing::warn!("OEM operations are deprecated; use extensions instead");
                OperationRegistry::global().validate(&operation, &self.operands)?;
                self.has_oem_operation = true;
            }
            _ => {
                OperationRegistry::global().validate(&operation, &self.operands)?;
            }
        }

        self.operations.push(operation);
        Ok(index)
    }

    /// Declares the model's inputs and outputs. Exactly once per
    /// builder; every listed operand must still be temporary.
    pub fn identify_inputs_and_outputs(
        &mut self,
        inputs: Vec<u32>,
        outputs: Vec<u32>,
    ) -> Result<(), ModelError> {
        self.ensure_mutable("identify_inputs_and_outputs")?;
        if self.io_identified {
            return Err(ModelError::IoAlreadyIdentified);
        }
        for &index in inputs.iter().chain(outputs.iter()) {
            self.check_index(index)?;
        }
        let mut seen = std::collections::HashSet::new();
        for &index in inputs.iter().chain(outputs.iter()) {
            if !seen.insert(index) {
                return Err(ModelError::DuplicateIo { index });
            }
            let lifetime = self.operands[index as usize].lifetime;
            if lifetime != LifeTime::Temporary {
                return Err(ModelError::LifetimeViolation {
                    index,
                    from: lifetime,
                    to: LifeTime::SubgraphInput,
                });
            }
        }
        for &index in &inputs {
            self.operands[index as usize].lifetime = LifeTime::SubgraphInput;
        }
        for &index in &outputs {
            self.operands[index as usize].lifetime = LifeTime::SubgraphOutput;
        }
        self.input_indexes = inputs;
        self.output_indexes = outputs;
        self.io_identified = true;
        Ok(())
    }

    /// Allows float32 computation to run in float16 precision.
    pub fn relax_float32_to_float16(&mut self, allow: bool) -> Result<(), ModelError> {
        self.ensure_mutable("relax_float32_to_float16")?;
        self.relaxed = allow;
        Ok(())
    }

    /// Enables dead-operand removal during `finish`.
    pub fn set_simplify(&mut self, enable: bool) -> Result<(), ModelError> {
        self.ensure_mutable("set_simplify")?;
        self.simplify = enable;
        Ok(())
    }

    // ── Finalization ───────────────────────────────────────────────

    fn compute_feature_level(&self) -> FeatureLevel {
        let mut level = FeatureLevel::V1_0;
        if self.relaxed {
            level = level.max(FeatureLevel::V1_1);
        }
        for operand in &self.operands {
            level = level.max(operand.operand_type.feature_level());
        }
        for operation in &self.operations {
            level = level.max(operation.operation_type.feature_level());
        }
        for model in &self.referenced_models {
            level = level.max(model.feature_level());
        }
        level
    }

    fn collect_extensions(&self) -> Vec<(String, u16)> {
        let mut prefixes: Vec<u16> = self
            .operands
            .iter()
            .filter_map(|o| o.operand_type.extension_prefix())
            .chain(
                self.operations
                    .iter()
                    .filter_map(|op| op.operation_type.extension_prefix()),
            )
            .chain(
                self.referenced_models
                    .iter()
                    .flat_map(|m| m.extension_name_to_prefix().iter().map(|(_, p)| *p)),
            )
            .collect();
        prefixes.sort_unstable();
        prefixes.dedup();
        prefixes
            .into_iter()
            .filter_map(|prefix| self.registry.prefix_name(prefix).map(|name| (name, prefix)))
            .collect()
    }

    /// Finalizes the graph into an immutable [`Model`].
    ///
    /// Performs, in order: large-constant consolidation, topological
    /// run-order sort, whole-model validation, version-compatibility
    /// check, trailing-default trimming, optional dead-operand removal,
    /// and the arch-hash.
    pub fn finish(mut self) -> Result<Model, ModelError> {
        if self.invalid {
            return Err(ModelError::Invalidated { op: "finish" });
        }

        // 1. Consolidate deferred large values into one shared pool.
        let large_values = std::mem::take(&mut self.large_values);
        if let Some((memory, offsets)) = large_values.consolidate()? {
            let pool_index = self.memories.add(&memory)?;
            for (operand_index, offset) in offsets {
                let operand = &mut self.operands[operand_index as usize];
                operand.lifetime = LifeTime::ConstantReference;
                operand.location.pool_index = pool_index;
                operand.location.offset = offset;
            }
        }

        // 2. Deterministic run order.
        let mut sorted_index_map =
            normalize::sort_into_run_order(&mut self.operations, &self.operands)?;

        // 3. Whole-model structural validation.
        normalize::validate_graph(
            &self.operands,
            &self.operations,
            &self.input_indexes,
            &self.output_indexes,
            self.referenced_models.len(),
        )?;

        // 4. Version compatibility.
        let feature_level = self.compute_feature_level();
        if feature_level > FeatureLevel::current() {
            return Err(ModelError::VersionTooNew {
                required: feature_level,
                supported: FeatureLevel::current(),
            });
        }

        // 5. Trailing default arguments.
        let trimmed =
            normalize::trim_trailing_defaults(&mut self.operations, &self.operands, self.small_values.bytes());
        if trimmed > 0 {
            tracing::debug!("trimmed trailing default inputs from {trimmed} operations");
        }

        // 6. Dead-operand removal.
        if self.simplify {
            normalize::remove_dead(
                &mut self.operands,
                &mut self.operations,
                &mut self.input_indexes,
                &mut self.output_indexes,
                &mut sorted_index_map,
            );
        }

        let extension_name_to_prefix = self.collect_extensions();
        let main = Subgraph {
            operands: self.operands,
            operations: self.operations,
            input_indexes: self.input_indexes,
            output_indexes: self.output_indexes,
        };

        // 7. Arch-hash over the normalized topology.
        let arch_hash = hash::arch_hash(
            &main,
            &self.referenced_models,
            &extension_name_to_prefix,
            self.relaxed,
        );

        let model = Model {
            main,
            referenced: self.referenced_models,
            operand_values: self.small_values.into_bytes().into(),
            pools: self.memories.into_memories(),
            extension_name_to_prefix,
            relaxed: self.relaxed,
            arch_hash,
            feature_level,
            has_oem_operation: self.has_oem_operation,
            has_extension_operation: self.has_extension_operation,
            sorted_index_map,
        };
        tracing::info!("{}", model.summary());
        Ok(model)
    }
}

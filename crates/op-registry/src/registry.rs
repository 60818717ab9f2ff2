// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The operation table and its entry/context types.

use crate::OpError;
use graph_types::{Operand, Operation, OperationType};
use once_cell::sync::Lazy;
use std::collections::HashMap;

static GLOBAL: Lazy<OperationRegistry> = Lazy::new(|| {
    let mut registry = OperationRegistry::new();
    crate::builtin::register_all(&mut registry);
    registry
});

/// Structural validation against the owning subgraph's operand table.
pub type ValidateFn = fn(&Operation, &[Operand]) -> Result<(), OpError>;

/// Run-time shape propagation.
pub type PrepareFn = fn(&mut PrepareContext<'_>) -> Result<(), OpError>;

/// Kernel execution over resolved buffers.
pub type ExecuteFn = fn(&mut ExecuteContext<'_>) -> Result<(), OpError>;

/// Context handed to `prepare`: resolved input operands, mutable output
/// operands whose dimensions the entry fills in.
pub struct PrepareContext<'a> {
    pub operation_type: OperationType,
    pub inputs: &'a [Operand],
    pub outputs: &'a mut [Operand],
}

/// Context handed to `execute`: input buffers in operation order and
/// pre-sized output buffers to fill.
pub struct ExecuteContext<'a> {
    pub operation_type: OperationType,
    pub inputs: &'a [Operand],
    pub input_buffers: &'a [&'a [u8]],
    pub outputs: &'a [Operand],
    pub output_buffers: &'a mut [Vec<u8>],
}

/// One registered operation.
pub struct OperationEntry {
    pub operation_type: OperationType,
    pub validate: ValidateFn,
    pub prepare: Option<PrepareFn>,
    pub execute: Option<ExecuteFn>,
    /// Inputs may carry `NoValue` lifetime.
    pub allow_omitted_operand: bool,
    /// Zero-element inputs are legal.
    pub allow_zero_sized_input: bool,
}

impl OperationEntry {
    /// Creates an entry with a validator only and default flags.
    pub fn validator(operation_type: OperationType, validate: ValidateFn) -> Self {
        Self {
            operation_type,
            validate,
            prepare: None,
            execute: None,
            allow_omitted_operand: false,
            allow_zero_sized_input: false,
        }
    }
}

/// Operation code → entry, plus a parallel extension table.
///
/// [`OperationRegistry::global`] is populated with the built-in set on
/// first access and never mutated afterwards; owned registries stay
/// mutable for device plug-ins and tests.
pub struct OperationRegistry {
    base: HashMap<u32, OperationEntry>,
    extensions: HashMap<(u16, u16), OperationEntry>,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            base: HashMap::new(),
            extensions: HashMap::new(),
        }
    }

    /// The process-wide registry, built-ins registered.
    pub fn global() -> &'static OperationRegistry {
        &GLOBAL
    }

    /// Registers a base operation entry.
    pub fn register(&mut self, entry: OperationEntry) {
        self.base.insert(entry.operation_type.code(), entry);
    }

    /// Registers an extension operation entry under `(prefix, inner)`.
    pub fn register_extension(&mut self, prefix: u16, inner_code: u16, entry: OperationEntry) {
        self.extensions.insert((prefix, inner_code), entry);
    }

    /// Looks up the entry for an operation type.
    pub fn get(&self, operation_type: OperationType) -> Option<&OperationEntry> {
        match operation_type {
            OperationType::Extension(id) => {
                let (prefix, inner) = graph_types::decompose_type_id(id);
                self.extensions.get(&(prefix, inner))
            }
            base => self.base.get(&base.code()),
        }
    }

    /// Whether an entry exists for this type.
    pub fn is_registered(&self, operation_type: OperationType) -> bool {
        self.get(operation_type).is_some()
    }

    /// Validates `operation` against the operand table.
    ///
    /// Omitted (`NoValue`) inputs occupy their slots and count toward
    /// arity; they are rejected here unless the entry opts in.
    pub fn validate(&self, operation: &Operation, operands: &[Operand]) -> Result<(), OpError> {
        let entry = self
            .get(operation.operation_type)
            .ok_or_else(|| OpError::UnregisteredOperation(operation.operation_type.to_string()))?;
        if !entry.allow_omitted_operand {
            for (slot, &index) in operation.inputs.iter().enumerate() {
                if operands[index as usize].lifetime == graph_types::LifeTime::NoValue {
                    return Err(OpError::OmittedOperand {
                        operation: operation.operation_type.to_string(),
                        index: slot,
                    });
                }
            }
        }
        (entry.validate)(operation, operands)
    }

    /// The registered base operation codes, sorted.
    pub fn registered_codes(&self) -> Vec<u32> {
        let mut codes: Vec<u32> = self.base.keys().copied().collect();
        codes.sort_unstable();
        codes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_has_builtins() {
        let reg = OperationRegistry::global();
        assert!(reg.is_registered(OperationType::Add));
        assert!(reg.is_registered(OperationType::Conv2d));
        assert!(reg.is_registered(OperationType::ResizeNearestNeighbor));
        assert!(!reg.is_registered(OperationType::Extension(0x0001_0000)));
    }

    #[test]
    fn test_extension_entry() {
        fn ok(_: &Operation, _: &[Operand]) -> Result<(), OpError> {
            Ok(())
        }
        let mut reg = OperationRegistry::new();
        reg.register_extension(1, 7, OperationEntry::validator(
            OperationType::Extension(graph_types::compose_type_id(1, 7)),
            ok,
        ));
        assert!(reg.is_registered(OperationType::Extension(graph_types::compose_type_id(1, 7))));
        assert!(!reg.is_registered(OperationType::Extension(graph_types::compose_type_id(1, 8))));
    }

    #[test]
    fn test_unregistered_validation_fails() {
        let reg = OperationRegistry::new();
        let op = Operation {
            operation_type: OperationType::Add,
            inputs: vec![],
            outputs: vec![],
        };
        assert!(matches!(
            reg.validate(&op, &[]),
            Err(OpError::UnregisteredOperation(_))
        ));
    }
}

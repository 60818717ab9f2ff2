// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The process-wide type registry.
//!
//! Answers size/tensor queries for base operand types and manages the
//! extension namespace: registration (keyed by name, usually fed from
//! device capability reports), lazy prefix allocation on first use, and
//! the inconsistency policy — two providers announcing different
//! definitions for the same name disable that extension registry-wide.
//!
//! # Concurrency
//! All state sits behind one `RwLock`; queries take a read lock, prefix
//! allocation briefly upgrades to a write lock. The registry is
//! initialized during device enumeration and effectively read-only
//! afterwards.

use crate::extension::{compose_type_id, decompose_type_id, MAX_PREFIX};
use crate::{Extension, OperandTypeInformation, OperandType, OperationType, TypeError};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

static GLOBAL: Lazy<TypeRegistry> = Lazy::new(TypeRegistry::new);

#[derive(Default)]
struct Inner {
    /// Registered definitions, keyed by extension name.
    extensions: HashMap<String, Extension>,
    /// Which provider first announced each name (for conflict reports).
    first_provider: HashMap<String, String>,
    /// Names disabled by the inconsistency policy.
    disabled: HashSet<String>,
    /// Lazily assigned prefixes.
    prefix_of: HashMap<String, u16>,
    name_of_prefix: HashMap<u16, String>,
    extensions_allowed: bool,
}

/// Catalog of base operand/operation types plus registered extensions.
pub struct TypeRegistry {
    inner: RwLock<Inner>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Creates an empty registry with extensions enabled.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                extensions_allowed: true,
                ..Inner::default()
            }),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static TypeRegistry {
        &GLOBAL
    }

    /// Gates all extension operand/operation registration. In restricted
    /// packagings this is switched off at startup.
    pub fn set_extensions_allowed(&self, allowed: bool) {
        self.write().extensions_allowed = allowed;
    }

    /// Whether extension use is allowed for this process.
    pub fn extensions_allowed(&self) -> bool {
        self.read().extensions_allowed
    }

    /// Registers the extensions announced by `provider`.
    ///
    /// A name registered twice with the same definition is a no-op.
    /// Conflicting definitions disable the name registry-wide; any later
    /// use fails as bad data.
    pub fn register_extensions(
        &self,
        extensions: Vec<Extension>,
        provider: &str,
    ) -> Result<(), TypeError> {
        let mut inner = self.write();
        for ext in extensions {
            if inner.disabled.contains(&ext.name) {
                tracing::warn!(
                    "extension '{}' from '{provider}' ignored: already disabled",
                    ext.name,
                );
                continue;
            }
            match inner.extensions.get(&ext.name) {
                None => {
                    inner.first_provider.insert(ext.name.clone(), provider.to_string());
                    inner.extensions.insert(ext.name.clone(), ext);
                }
                Some(existing) if *existing == ext => {}
                Some(_) => {
                    let first = inner
                        .first_provider
                        .get(&ext.name)
                        .cloned()
                        .unwrap_or_default();
                    tracing::warn!(
                        "extension '{}' disabled: '{provider}' and '{first}' disagree on its definition",
                        ext.name,
                    );
                    inner.extensions.remove(&ext.name);
                    inner.disabled.insert(ext.name.clone());
                }
            }
        }
        Ok(())
    }

    /// Returns the prefix assigned to `name`, allocating one on first use.
    ///
    /// Prefixes start at 1 (0 is the base namespace) and are assigned in
    /// first-use order, so they are deterministic within a process.
    pub fn prefix_for(&self, name: &str) -> Result<u16, TypeError> {
        let mut inner = self.write();
        if !inner.extensions_allowed {
            return Err(TypeError::ExtensionsNotAllowed);
        }
        if inner.disabled.contains(name) {
            return Err(TypeError::ExtensionDisabled(name.to_string()));
        }
        if let Some(&prefix) = inner.prefix_of.get(name) {
            return Ok(prefix);
        }
        let next = inner.prefix_of.len() as u32 + 1;
        if next > MAX_PREFIX as u32 {
            return Err(TypeError::PrefixSpaceExhausted(inner.prefix_of.len()));
        }
        let prefix = next as u16;
        inner.prefix_of.insert(name.to_string(), prefix);
        inner.name_of_prefix.insert(prefix, name.to_string());
        tracing::debug!("assigned prefix {prefix:#06x} to extension '{name}'");
        Ok(prefix)
    }

    /// Composes the runtime operand type for `(name, inner_code)`.
    pub fn extension_operand_type(
        &self,
        name: &str,
        inner_code: u16,
    ) -> Result<OperandType, TypeError> {
        let prefix = self.prefix_for(name)?;
        Ok(OperandType::Extension(compose_type_id(prefix, inner_code)))
    }

    /// Composes the runtime operation type for `(name, inner_code)`.
    pub fn extension_operation_type(
        &self,
        name: &str,
        inner_code: u16,
    ) -> Result<OperationType, TypeError> {
        let prefix = self.prefix_for(name)?;
        Ok(OperationType::Extension(compose_type_id(prefix, inner_code)))
    }

    /// The extension name assigned to `prefix`, if any.
    pub fn prefix_name(&self, prefix: u16) -> Option<String> {
        self.read().name_of_prefix.get(&prefix).cloned()
    }

    /// Resolves a prefix back to the registered extension definition.
    pub fn resolve_prefix(&self, prefix: u16) -> Result<Extension, TypeError> {
        let inner = self.read();
        let name = inner
            .name_of_prefix
            .get(&prefix)
            .ok_or(TypeError::UnknownPrefix(prefix))?;
        if inner.disabled.contains(name) {
            return Err(TypeError::ExtensionDisabled(name.clone()));
        }
        inner
            .extensions
            .get(name)
            .cloned()
            .ok_or_else(|| TypeError::UnknownExtension(name.clone()))
    }

    /// Looks up the catalog entry behind a composed extension type id.
    pub fn operand_type_info(&self, type_id: u32) -> Result<OperandTypeInformation, TypeError> {
        let (prefix, inner_code) = decompose_type_id(type_id);
        let ext = self.resolve_prefix(prefix)?;
        ext.operand_type(inner_code)
            .copied()
            .ok_or(TypeError::UnregisteredExtensionType {
                name: ext.name,
                inner_code,
            })
    }

    /// Whether the type is a tensor type (extension-aware).
    pub fn is_tensor(&self, operand_type: OperandType) -> Result<bool, TypeError> {
        match operand_type {
            OperandType::Extension(id) => Ok(self.operand_type_info(id)?.is_tensor),
            base => Ok(base.is_base_tensor()),
        }
    }

    /// Computes the byte size of an operand of `operand_type` with the
    /// given extents.
    ///
    /// Tensor sizes are `element_size × Π dims` (an unspecified extent of
    /// 0 yields size 0); scalars have a fixed size. Sizes must fit the
    /// 32-bit location width.
    pub fn size_of_data(
        &self,
        operand_type: OperandType,
        dimensions: &[u32],
    ) -> Result<usize, TypeError> {
        let (element_size, is_tensor) = match operand_type {
            OperandType::Extension(id) => {
                let info = self.operand_type_info(id)?;
                (info.byte_size as usize, info.is_tensor)
            }
            base => (base.base_element_size(), base.is_base_tensor()),
        };
        if !is_tensor {
            return Ok(element_size);
        }
        let num_elements: u128 = dimensions.iter().map(|&d| d as u128).product();
        let size = num_elements * element_size as u128;
        if size > u32::MAX as u128 {
            return Err(TypeError::SizeOverflow {
                operand_type: operand_type.to_string(),
                num_elements,
            });
        }
        Ok(size as usize)
    }

    /// Whether the byte size of `operand_type × dims` overflows.
    pub fn size_overflows(&self, operand_type: OperandType, dimensions: &[u32]) -> bool {
        matches!(
            self.size_of_data(operand_type, dimensions),
            Err(TypeError::SizeOverflow { .. })
        )
    }

    /// Validates an operand descriptor at add time: type registration,
    /// scalar/tensor dimension rules, and quantization parameters.
    pub fn validate_operand(&self, operand: &crate::Operand) -> Result<(), TypeError> {
        use OperandType as T;
        let t = operand.operand_type;

        if let T::Extension(id) = t {
            if !self.extensions_allowed() {
                return Err(TypeError::ExtensionsNotAllowed);
            }
            // Must resolve to a registered catalog entry.
            self.operand_type_info(id)?;
            if operand.scale != 0.0 || operand.zero_point != 0 {
                return Err(TypeError::UnexpectedQuantization(t.to_string()));
            }
            return Ok(());
        }

        if !t.is_base_tensor() && !operand.dimensions.is_empty() {
            return Err(TypeError::ScalarWithDimensions(t.to_string()));
        }

        let zero_point_range = match t {
            T::TensorQuant8Asymm => Some((0, 255)),
            T::TensorQuant8AsymmSigned => Some((-128, 127)),
            T::TensorQuant16Asymm => Some((0, 65535)),
            T::TensorQuant8Symm | T::TensorQuant16Symm => Some((0, 0)),
            _ => None,
        };

        match t {
            // Scale arrives later, through the per-channel parameters.
            T::TensorQuant8SymmPerChannel => {
                if operand.scale != 0.0 || operand.zero_point != 0 {
                    return Err(TypeError::UnexpectedQuantization(t.to_string()));
                }
            }
            _ if t.is_quantized() => {
                if operand.scale <= 0.0 {
                    return Err(TypeError::InvalidScale {
                        operand_type: t.to_string(),
                        scale: operand.scale,
                    });
                }
                let (low, high) = zero_point_range.unwrap_or((i32::MIN, i32::MAX));
                if operand.zero_point < low || operand.zero_point > high {
                    return Err(TypeError::ZeroPointOutOfRange {
                        operand_type: t.to_string(),
                        zero_point: operand.zero_point,
                        low,
                        high,
                    });
                }
            }
            _ => {
                if operand.scale != 0.0 || operand.zero_point != 0 {
                    return Err(TypeError::UnexpectedQuantization(t.to_string()));
                }
            }
        }
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Operand;

    fn fancy() -> Extension {
        Extension::new(
            "com.example.fancy",
            vec![
                OperandTypeInformation { inner_code: 0, byte_size: 2, is_tensor: false },
                OperandTypeInformation { inner_code: 1, byte_size: 4, is_tensor: true },
            ],
        )
    }

    #[test]
    fn test_prefix_assignment_is_stable() {
        let reg = TypeRegistry::new();
        reg.register_extensions(vec![fancy()], "dev0").unwrap();
        let p1 = reg.prefix_for("com.example.fancy").unwrap();
        let p2 = reg.prefix_for("com.example.fancy").unwrap();
        assert_eq!(p1, p2);
        assert_eq!(p1, 1);

        let p3 = reg.prefix_for("com.example.other").unwrap();
        assert_eq!(p3, 2);
    }

    #[test]
    fn test_extensions_disallowed() {
        let reg = TypeRegistry::new();
        reg.set_extensions_allowed(false);
        let err = reg.prefix_for("com.example.fancy").unwrap_err();
        assert!(matches!(err, TypeError::ExtensionsNotAllowed));
    }

    #[test]
    fn test_conflicting_definitions_disable() {
        let reg = TypeRegistry::new();
        reg.register_extensions(vec![fancy()], "dev0").unwrap();

        let mut conflicting = fancy();
        conflicting.operand_types[0].byte_size = 8;
        reg.register_extensions(vec![conflicting], "dev1").unwrap();

        let err = reg.prefix_for("com.example.fancy").unwrap_err();
        assert!(matches!(err, TypeError::ExtensionDisabled(_)));
    }

    #[test]
    fn test_reregistration_identical_is_noop() {
        let reg = TypeRegistry::new();
        reg.register_extensions(vec![fancy()], "dev0").unwrap();
        reg.register_extensions(vec![fancy()], "dev1").unwrap();
        assert!(reg.prefix_for("com.example.fancy").is_ok());
    }

    #[test]
    fn test_extension_type_composition() {
        let reg = TypeRegistry::new();
        reg.register_extensions(vec![fancy()], "dev0").unwrap();
        let t = reg.extension_operand_type("com.example.fancy", 1).unwrap();
        assert_eq!(t, OperandType::Extension(0x0001_0001));
        let info = reg.operand_type_info(0x0001_0001).unwrap();
        assert_eq!(info.byte_size, 4);
        assert!(info.is_tensor);
    }

    #[test]
    fn test_unregistered_inner_code() {
        let reg = TypeRegistry::new();
        reg.register_extensions(vec![fancy()], "dev0").unwrap();
        reg.prefix_for("com.example.fancy").unwrap();
        let err = reg.operand_type_info(compose_type_id(1, 9)).unwrap_err();
        assert!(matches!(err, TypeError::UnregisteredExtensionType { .. }));
    }

    #[test]
    fn test_size_of_data() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.size_of_data(OperandType::TensorFloat32, &[2, 3]).unwrap(), 24);
        assert_eq!(reg.size_of_data(OperandType::Float32, &[]).unwrap(), 4);
        assert_eq!(reg.size_of_data(OperandType::TensorQuant8Asymm, &[10]).unwrap(), 10);
        // Unspecified extent.
        assert_eq!(reg.size_of_data(OperandType::TensorFloat32, &[2, 0]).unwrap(), 0);
    }

    #[test]
    fn test_size_overflow() {
        let reg = TypeRegistry::new();
        assert!(reg.size_overflows(OperandType::TensorFloat32, &[u32::MAX, u32::MAX]));
        assert!(!reg.size_overflows(OperandType::TensorFloat32, &[16, 16]));
    }

    #[test]
    fn test_extension_tensor_size() {
        let reg = TypeRegistry::new();
        reg.register_extensions(vec![fancy()], "dev0").unwrap();
        let t = reg.extension_operand_type("com.example.fancy", 1).unwrap();
        assert_eq!(reg.size_of_data(t, &[3, 3]).unwrap(), 36);
        assert!(reg.is_tensor(t).unwrap());

        let scalar = reg.extension_operand_type("com.example.fancy", 0).unwrap();
        assert_eq!(reg.size_of_data(scalar, &[]).unwrap(), 2);
        assert!(!reg.is_tensor(scalar).unwrap());
    }

    #[test]
    fn test_validate_quantized_operand() {
        let reg = TypeRegistry::new();
        let good = Operand::new(OperandType::TensorQuant8Asymm, vec![4], 0.5, 128);
        reg.validate_operand(&good).unwrap();

        let bad_scale = Operand::new(OperandType::TensorQuant8Asymm, vec![4], 0.0, 0);
        assert!(matches!(
            reg.validate_operand(&bad_scale),
            Err(TypeError::InvalidScale { .. })
        ));

        let bad_zp = Operand::new(OperandType::TensorQuant8Asymm, vec![4], 0.5, 300);
        assert!(matches!(
            reg.validate_operand(&bad_zp),
            Err(TypeError::ZeroPointOutOfRange { .. })
        ));
    }

    #[test]
    fn test_validate_non_quantized_rejects_params() {
        let reg = TypeRegistry::new();
        let bad = Operand::new(OperandType::TensorFloat32, vec![4], 1.0, 0);
        assert!(matches!(
            reg.validate_operand(&bad),
            Err(TypeError::UnexpectedQuantization(_))
        ));
    }

    #[test]
    fn test_validate_scalar_with_dims() {
        let reg = TypeRegistry::new();
        let bad = Operand::new(OperandType::Int32, vec![2], 0.0, 0);
        assert!(matches!(
            reg.validate_operand(&bad),
            Err(TypeError::ScalarWithDimensions(_))
        ));
    }

    #[test]
    fn test_validate_per_channel_rejects_scale() {
        let reg = TypeRegistry::new();
        let bad = Operand::new(OperandType::TensorQuant8SymmPerChannel, vec![3, 4], 0.5, 0);
        assert!(matches!(
            reg.validate_operand(&bad),
            Err(TypeError::UnexpectedQuantization(_))
        ));
    }
}

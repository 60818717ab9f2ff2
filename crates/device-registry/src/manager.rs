// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The process-wide device registry.

use crate::{CpuDevice, Device};
use graph_types::{FeatureLevel, TypeRegistry};
use once_cell::sync::Lazy;
use std::sync::{Arc, RwLock};

static GLOBAL: Lazy<DeviceManager> = Lazy::new(DeviceManager::new);

/// Enumerates the available execution devices.
///
/// Initialized once; the CPU reference device is always present and
/// always last in enumeration order, so explicit driver devices win
/// scoring ties.
pub struct DeviceManager {
    devices: RwLock<Vec<Arc<dyn Device>>>,
    cpu: Arc<dyn Device>,
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceManager {
    /// Creates a manager holding only the CPU reference device.
    pub fn new() -> Self {
        let cpu: Arc<dyn Device> = Arc::new(CpuDevice::new());
        Self {
            devices: RwLock::new(vec![Arc::clone(&cpu)]),
            cpu,
        }
    }

    /// The process-wide manager.
    pub fn get() -> &'static DeviceManager {
        &GLOBAL
    }

    /// Registers a driver device, feeding its extension catalog into
    /// `registry` (where the conflicting-definition policy applies).
    pub fn register_device(&self, device: Arc<dyn Device>, registry: &TypeRegistry) {
        let extensions = device.supported_extensions();
        if !extensions.is_empty() {
            // Ignoring the result: registration never fails, it only
            // disables conflicting names.
            let _ = registry.register_extensions(extensions, device.name());
        }
        tracing::info!("registered device '{}' ({:?})", device.name(), device.device_type());
        let mut devices = self.devices.write().unwrap_or_else(|e| e.into_inner());
        // Keep the CPU reference last.
        let cpu_position = devices.len() - 1;
        devices.insert(cpu_position, device);
    }

    /// All known devices, driver devices first, CPU reference last.
    pub fn devices(&self) -> Vec<Arc<dyn Device>> {
        self.devices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The always-available CPU reference device.
    pub fn cpu_device(&self) -> Arc<dyn Device> {
        Arc::clone(&self.cpu)
    }

    /// The newest feature level this runtime supports.
    pub fn runtime_feature_level(&self) -> FeatureLevel {
        FeatureLevel::current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceType, PerformanceInfo, PreparedModel, PrepareRequest};
    use crate::DeviceError;
    use graph_types::{Extension, OperandType, OperandTypeInformation};
    use model_ir::Model;

    struct FakeAccel;

    impl Device for FakeAccel {
        fn name(&self) -> &str {
            "fake-accel"
        }
        fn version(&self) -> &str {
            "1.0"
        }
        fn device_type(&self) -> DeviceType {
            DeviceType::Accel
        }
        fn supported_extensions(&self) -> Vec<Extension> {
            vec![Extension::new(
                "com.example.accel",
                vec![OperandTypeInformation { inner_code: 0, byte_size: 4, is_tensor: true }],
            )]
        }
        fn supported_operations(&self, model: &Model) -> Vec<bool> {
            vec![false; model.operations().len()]
        }
        fn performance(&self, _operand_type: OperandType) -> PerformanceInfo {
            PerformanceInfo { exec_time: 0.5, power_usage: 2.0 }
        }
        fn prepare_model(
            &self,
            model: std::sync::Arc<Model>,
            _request: &PrepareRequest,
        ) -> Result<PreparedModel, DeviceError> {
            Ok(PreparedModel::new(self.name(), model))
        }
    }

    #[test]
    fn test_cpu_always_present_and_last() {
        let manager = DeviceManager::new();
        let registry = TypeRegistry::new();
        manager.register_device(Arc::new(FakeAccel), &registry);

        let devices = manager.devices();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name(), "fake-accel");
        assert_eq!(devices[1].name(), "cpu-reference");
        assert_eq!(manager.cpu_device().name(), "cpu-reference");
    }

    #[test]
    fn test_registration_feeds_type_registry() {
        let manager = DeviceManager::new();
        let registry = TypeRegistry::new();
        manager.register_device(Arc::new(FakeAccel), &registry);
        assert!(registry.prefix_for("com.example.accel").is_ok());
    }
}

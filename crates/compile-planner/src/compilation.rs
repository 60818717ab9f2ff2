// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The compilation front-end.
//!
//! A [`Compilation`] gathers the settings for one compilation of a
//! finished model — preference, priority, timeout, caching, partition
//! policy — and hands them to the planner in `finish()`. `finish()`
//! consumes the compilation, so nothing can be reconfigured once the
//! plan exists.

use crate::plan::Plan;
use crate::{planner, CompileError};
use device_registry::{
    CacheInfo, Device, DeviceManager, ExtensionAttribute, PrepareRequest, CACHE_TOKEN_LEN,
};
use graph_types::{ExecutionPreference, Priority};
use model_ir::Model;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How aggressively the planner may split work across devices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionPolicy {
    /// Compile the whole model on one device or fail.
    NoPartition,
    /// Partition freely; re-plan onto the CPU reference on failure.
    #[default]
    WithFallback,
    /// Partition freely; surface any failure.
    WithoutFallback,
}

/// Settings for one compilation of a model against a device set.
pub struct Compilation {
    model: Arc<Model>,
    devices: Vec<Arc<dyn Device>>,
    preference: ExecutionPreference,
    priority: Priority,
    timeout: Option<Duration>,
    partitioning: PartitionPolicy,
    cache: Option<Arc<CacheInfo>>,
    token: Option<[u8; CACHE_TOKEN_LEN]>,
    attributes: Vec<ExtensionAttribute>,
}

impl Compilation {
    /// Compiles against every device the process knows, CPU reference
    /// included.
    pub fn new(model: Arc<Model>) -> Self {
        Self::with_devices(model, DeviceManager::get().devices())
    }

    /// Compiles against an explicit, ordered device list.
    pub fn for_devices(
        model: Arc<Model>,
        devices: Vec<Arc<dyn Device>>,
    ) -> Result<Self, CompileError> {
        if devices.is_empty() {
            return Err(CompileError::NoDevices);
        }
        Ok(Self::with_devices(model, devices))
    }

    fn with_devices(model: Arc<Model>, devices: Vec<Arc<dyn Device>>) -> Self {
        Self {
            model,
            devices,
            preference: ExecutionPreference::default(),
            priority: Priority::default(),
            timeout: None,
            partitioning: PartitionPolicy::default(),
            cache: None,
            token: None,
            attributes: Vec::new(),
        }
    }

    /// Sets what the compiled artifact should optimize for.
    pub fn set_preference(&mut self, preference: ExecutionPreference) {
        self.preference = preference;
    }

    /// Sets the priority relative to other compilations of this client.
    pub fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// Bounds the compilation. The timeout converts to one absolute
    /// deadline at `finish()`; every device `prepare_model` receives it.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    /// Selects the partitioning policy.
    pub fn set_partitioning(&mut self, policy: PartitionPolicy) {
        self.partitioning = policy;
    }

    /// Points compilation caching at a directory. The path is
    /// normalized with a trailing separator; the token keys the
    /// compiled artifact per device and is forwarded unchanged.
    pub fn set_caching(&mut self, dir: &Path, token: [u8; CACHE_TOKEN_LEN]) {
        let mut normalized = dir.as_os_str().to_os_string();
        if !normalized
            .to_string_lossy()
            .ends_with(std::path::MAIN_SEPARATOR)
        {
            normalized.push(std::path::MAIN_SEPARATOR.to_string());
        }
        self.cache = Some(Arc::new(CacheInfo::Directory(PathBuf::from(normalized))));
        self.token = Some(token);
    }

    /// Points compilation caching at pre-opened files. The descriptors
    /// are duplicated on entry and closed when the compilation (and the
    /// requests derived from it) is dropped.
    pub fn set_caching_from_fds(
        &mut self,
        model_cache: &[std::fs::File],
        data_cache: &[std::fs::File],
        token: [u8; CACHE_TOKEN_LEN],
    ) -> Result<(), CompileError> {
        let model_cache = model_cache
            .iter()
            .map(|f| f.try_clone())
            .collect::<Result<Vec<_>, _>>()?;
        let data_cache = data_cache
            .iter()
            .map(|f| f.try_clone())
            .collect::<Result<Vec<_>, _>>()?;
        self.cache = Some(Arc::new(CacheInfo::Fds {
            model_cache,
            data_cache,
        }));
        self.token = Some(token);
        Ok(())
    }

    /// Attaches a vendor attribute forwarded to every `prepare_model`.
    pub fn add_extension_attribute(&mut self, id: u32, data: &[u8]) {
        self.attributes.push(ExtensionAttribute {
            id,
            data: data.to_vec(),
        });
    }

    /// Runs the planner and emits the immutable [`Plan`].
    pub fn finish(self) -> Result<Plan, CompileError> {
        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        let request = PrepareRequest {
            preference: self.preference,
            priority: self.priority,
            deadline,
            cache: self.cache,
            token: self.token,
            extension_attributes: self.attributes,
        };
        tracing::info!(
            "compiling model ({} operations) against {} devices, preference {}, policy {:?}",
            self.model.operations().len(),
            self.devices.len(),
            self.preference,
            self.partitioning,
        );
        let plan = planner::partition_the_work(
            &self.model,
            &self.devices,
            self.preference,
            self.partitioning,
            &request,
        )?;
        tracing::info!("{}", plan.summary());
        Ok(plan)
    }
}

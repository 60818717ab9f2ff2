// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Compilation configuration loaded from TOML files or constructed
//! programmatically.
//!
//! # TOML Format
//! ```toml
//! preference = "sustained_speed"
//! priority = "high"
//! timeout_ms = 2000
//! partitioning = "with_fallback"
//! cache_dir = "/data/nn-cache"
//! ```

use crate::{CompileError, Compilation, PartitionPolicy};
use device_registry::CACHE_TOKEN_LEN;
use graph_types::{ExecutionPreference, Priority};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Declarative compilation settings.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CompilationConfig {
    /// `"low_power"`, `"fast_single_answer"`, or `"sustained_speed"`.
    #[serde(default = "default_preference")]
    pub preference: String,
    /// `"low"`, `"medium"`, or `"high"`.
    #[serde(default = "default_priority")]
    pub priority: String,
    /// Compilation timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// `"no_partition"`, `"with_fallback"`, or `"without_fallback"`.
    #[serde(default = "default_partitioning")]
    pub partitioning: String,
    /// Compilation cache directory, if caching is wanted.
    pub cache_dir: Option<PathBuf>,
}

fn default_preference() -> String {
    "fast_single_answer".to_string()
}

fn default_priority() -> String {
    "medium".to_string()
}

fn default_partitioning() -> String {
    "with_fallback".to_string()
}

impl Default for CompilationConfig {
    fn default() -> Self {
        Self {
            preference: default_preference(),
            priority: default_priority(),
            timeout_ms: None,
            partitioning: default_partitioning(),
            cache_dir: None,
        }
    }
}

impl CompilationConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, CompileError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CompileError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, CompileError> {
        toml::from_str(toml_str).map_err(|e| CompileError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, CompileError> {
        toml::to_string_pretty(self)
            .map_err(|e| CompileError::Config(format!("TOML serialise error: {e}")))
    }

    /// Resolves the preference string.
    pub fn resolve_preference(&self) -> Result<ExecutionPreference, CompileError> {
        match self.preference.to_lowercase().as_str() {
            "low_power" => Ok(ExecutionPreference::LowPower),
            "fast_single_answer" | "fast" => Ok(ExecutionPreference::FastSingleAnswer),
            "sustained_speed" | "sustained" => Ok(ExecutionPreference::SustainedSpeed),
            other => Err(CompileError::Config(format!(
                "unknown preference '{other}'; expected 'low_power', 'fast_single_answer', or 'sustained_speed'"
            ))),
        }
    }

    /// Resolves the priority string.
    pub fn resolve_priority(&self) -> Result<Priority, CompileError> {
        match self.priority.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(CompileError::Config(format!(
                "unknown priority '{other}'; expected 'low', 'medium', or 'high'"
            ))),
        }
    }

    /// Resolves the partitioning string.
    pub fn resolve_partitioning(&self) -> Result<PartitionPolicy, CompileError> {
        match self.partitioning.to_lowercase().as_str() {
            "no_partition" | "none" => Ok(PartitionPolicy::NoPartition),
            "with_fallback" => Ok(PartitionPolicy::WithFallback),
            "without_fallback" => Ok(PartitionPolicy::WithoutFallback),
            other => Err(CompileError::Config(format!(
                "unknown partitioning '{other}'; expected 'no_partition', 'with_fallback', or 'without_fallback'"
            ))),
        }
    }

    /// Applies these settings to a compilation. The cache directory is
    /// only applied when a token is supplied.
    pub fn apply(
        &self,
        compilation: &mut Compilation,
        cache_token: Option<[u8; CACHE_TOKEN_LEN]>,
    ) -> Result<(), CompileError> {
        compilation.set_preference(self.resolve_preference()?);
        compilation.set_priority(self.resolve_priority()?);
        compilation.set_partitioning(self.resolve_partitioning()?);
        if let Some(timeout_ms) = self.timeout_ms {
            compilation.set_timeout(Duration::from_millis(timeout_ms));
        }
        if let (Some(dir), Some(token)) = (&self.cache_dir, cache_token) {
            compilation.set_caching(dir, token);
        }
        Ok(())
    }
}

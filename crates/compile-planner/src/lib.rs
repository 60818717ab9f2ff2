// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # compile-planner
//!
//! Compiles a finished [`Model`](model_ir::Model) against a set of
//! execution devices into an immutable [`Plan`].
//!
//! # Pipeline
//!
//! ```text
//! Compilation            — preference, priority, timeout, caching.
//!       │  .finish()
//!       ▼
//! Plan                   — Simple (one device) or Compound (steps).
//! ```
//!
//! `finish()` consumes the compilation, so settings cannot change after
//! the plan exists. The planner scores every operation against every
//! candidate device, coalesces runs of operations won by the same
//! device into steps, extracts a sub-model per step with cross-step
//! operands promoted to step boundaries, and compiles each step on its
//! device. A driver failure falls back to a whole-model plan on the CPU
//! reference — unless the policy forbids it, the model carries OEM or
//! extension operations, or the failure was a missed deadline.
//!
//! # Example
//! ```no_run
//! use compile_planner::{Compilation, PartitionPolicy};
//! use graph_types::ExecutionPreference;
//! # fn demo(model: std::sync::Arc<model_ir::Model>) -> Result<(), compile_planner::CompileError> {
//! let mut compilation = Compilation::new(model);
//! compilation.set_preference(ExecutionPreference::SustainedSpeed);
//! compilation.set_partitioning(PartitionPolicy::WithFallback);
//! let plan = compilation.finish()?;
//! println!("{}", plan.summary());
//! # Ok(())
//! # }
//! ```

mod compilation;
mod config;
mod error;
mod plan;
mod planner;
#[cfg(test)]
pub(crate) mod planner_test_support;

pub use compilation::{Compilation, PartitionPolicy};
pub use config::CompilationConfig;
pub use error::CompileError;
pub use plan::{Burst, IoRole, Plan, Step};

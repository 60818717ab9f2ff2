// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The execution plan: the immutable output of the planner.
//!
//! A plan is either *Simple* — one device compiles the whole model — or
//! *Compound* — an ordered sequence of [`Step`]s forming a DAG whose
//! topological order is the stored sequence. The plan is the contract
//! between the planner and the executor: it tells the executor which
//! device runs which operations and how top-level I/O wires into each
//! step's sub-model.

use crate::CompileError;
use device_registry::{Device, MemoryPreference, PreparedModel};
use model_ir::Model;
use std::sync::Arc;

/// Which side of the model interface an index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IoRole {
    Input,
    Output,
}

/// One contiguous region of the plan handled by a single device.
pub struct Step {
    pub(crate) index: usize,
    pub(crate) device: Arc<dyn Device>,
    pub(crate) submodel: Arc<Model>,
    pub(crate) prepared: PreparedModel,
    /// Positions of the operations this step owns, in the source
    /// model's run order.
    pub(crate) operation_indexes: Vec<usize>,
    /// `(top-level input position, local input position)` pairs.
    pub(crate) model_input_map: Vec<(usize, usize)>,
    /// `(top-level output position, local output position)` pairs.
    pub(crate) model_output_map: Vec<(usize, usize)>,
    /// Cross-step boundaries: `(source operand index, local position)`.
    pub(crate) temp_input_map: Vec<(u32, usize)>,
    pub(crate) temp_output_map: Vec<(u32, usize)>,
}

impl Step {
    /// Position of this step in the plan's execution order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The device that compiles and runs this step.
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// The step's extracted sub-model.
    pub fn submodel(&self) -> &Arc<Model> {
        &self.submodel
    }

    /// The device-compiled artifact.
    pub fn prepared_model(&self) -> &PreparedModel {
        &self.prepared
    }

    /// The source-model operation positions this step owns.
    pub fn operation_indexes(&self) -> &[usize] {
        &self.operation_indexes
    }

    /// Cross-step operands this step consumes, as
    /// `(source operand, local input position)`.
    pub fn boundary_inputs(&self) -> &[(u32, usize)] {
        &self.temp_input_map
    }

    /// Cross-step operands this step produces, as
    /// `(source operand, local output position)`.
    pub fn boundary_outputs(&self) -> &[(u32, usize)] {
        &self.temp_output_map
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("index", &self.index)
            .field("device", &self.device.name())
            .field("operations", &self.operation_indexes.len())
            .finish()
    }
}

/// An opaque per-step execution handle for burst-style dispatch.
#[derive(Debug, Clone)]
pub struct Burst {
    pub step_index: usize,
    pub device_name: String,
}

enum PlanKind {
    /// One device covers the whole model.
    Simple,
    /// Partitioned execution across several steps.
    Compound,
}

/// The immutable compiled artifact.
///
/// Built atomically: a failed compilation plus fallback rebuilds the
/// plan from scratch, so no partial plan is ever observable.
pub struct Plan {
    kind: PlanKind,
    steps: Vec<Step>,
    input_count: usize,
    output_count: usize,
    /// Set when a device failure forced the CPU fallback.
    fallback_from_error: bool,
}

impl Plan {
    pub(crate) fn simple(step: Step, input_count: usize, output_count: usize) -> Self {
        Self {
            kind: PlanKind::Simple,
            steps: vec![step],
            input_count,
            output_count,
            fallback_from_error: false,
        }
    }

    pub(crate) fn compound(steps: Vec<Step>, input_count: usize, output_count: usize) -> Self {
        Self {
            kind: PlanKind::Compound,
            steps,
            input_count,
            output_count,
            fallback_from_error: false,
        }
    }

    pub(crate) fn mark_fallback_from_error(mut self) -> Self {
        self.fallback_from_error = true;
        self
    }

    /// Whether the whole model runs on a single device.
    pub fn is_simple(&self) -> bool {
        matches!(self.kind, PlanKind::Simple)
    }

    /// A plan emitted by a successful compilation is always valid;
    /// exposed for the executor's defensive checks.
    pub fn is_valid(&self) -> bool {
        !self.steps.is_empty()
    }

    /// Whether this plan replaced a failed partitioned compilation.
    pub fn fallback_from_error(&self) -> bool {
        self.fallback_from_error
    }

    /// The steps, in execution order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The memory-layout preference for one top-level I/O buffer: the
    /// component-wise maximum over every step that touches it. Both
    /// fields are positive powers of two.
    pub fn memory_preference(
        &self,
        role: IoRole,
        index: usize,
    ) -> Result<MemoryPreference, CompileError> {
        let count = match role {
            IoRole::Input => self.input_count,
            IoRole::Output => self.output_count,
        };
        if index >= count {
            return Err(CompileError::IoIndexOutOfRange {
                role: match role {
                    IoRole::Input => "input",
                    IoRole::Output => "output",
                },
                index,
                count,
            });
        }
        let mut preference: Option<MemoryPreference> = None;
        self.for_each_step_role(role, index, |step_index, _, _| {
            let device_preference = self.steps[step_index].device.memory_preference();
            preference = Some(match preference {
                None => device_preference,
                Some(existing) => existing.max(device_preference),
            });
        });
        Ok(preference.unwrap_or_default())
    }

    /// Yields `(step_index, role, local_index)` for every step where
    /// top-level input `index` surfaces.
    pub fn for_each_step_role_of_input(&self, index: usize, f: impl FnMut(usize, IoRole, usize)) {
        self.for_each_step_role(IoRole::Input, index, f);
    }

    /// Yields `(step_index, role, local_index)` for every step where
    /// top-level output `index` surfaces.
    pub fn for_each_step_role_of_output(&self, index: usize, f: impl FnMut(usize, IoRole, usize)) {
        self.for_each_step_role(IoRole::Output, index, f);
    }

    fn for_each_step_role(
        &self,
        role: IoRole,
        index: usize,
        mut f: impl FnMut(usize, IoRole, usize),
    ) {
        for step in &self.steps {
            let map = match role {
                IoRole::Input => &step.model_input_map,
                IoRole::Output => &step.model_output_map,
            };
            for &(top, local) in map {
                if top == index {
                    f(step.index, role, local);
                }
            }
        }
    }

    /// Creates one opaque burst handle per step.
    pub fn make_bursts(&self) -> Vec<Burst> {
        self.steps
            .iter()
            .map(|step| Burst {
                step_index: step.index,
                device_name: step.device.name().to_string(),
            })
            .collect()
    }

    /// Structural self-check, used by tests and the executor's
    /// defensive path.
    pub fn validate(&self) -> Result<(), CompileError> {
        for (expected, step) in self.steps.iter().enumerate() {
            if step.index != expected {
                return Err(CompileError::IoIndexOutOfRange {
                    role: "step",
                    index: step.index,
                    count: self.steps.len(),
                });
            }
        }
        // Every top-level output must be produced by exactly one step.
        for output in 0..self.output_count {
            let mut producers = 0;
            self.for_each_step_role(IoRole::Output, output, |_, _, _| producers += 1);
            if producers != 1 {
                return Err(CompileError::IoIndexOutOfRange {
                    role: "output",
                    index: output,
                    count: producers,
                });
            }
        }
        Ok(())
    }

    /// Returns a human-readable description of the plan.
    pub fn summary(&self) -> String {
        let ops_per_step: Vec<usize> = self
            .steps
            .iter()
            .map(|s| s.operation_indexes.len())
            .collect();
        format!(
            "Plan ({}): {} steps on [{}], operations per step {:?}{}",
            if self.is_simple() { "simple" } else { "compound" },
            self.steps.len(),
            self.steps
                .iter()
                .map(|s| s.device.name())
                .collect::<Vec<_>>()
                .join(", "),
            ops_per_step,
            if self.fallback_from_error {
                ", after device failure"
            } else {
                ""
            },
        )
    }
}

impl std::fmt::Debug for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plan")
            .field("simple", &self.is_simple())
            .field("steps", &self.steps)
            .field("fallback_from_error", &self.fallback_from_error)
            .finish()
    }
}

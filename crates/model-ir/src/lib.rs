// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-ir
//!
//! The graph intermediate representation: an incrementally built,
//! per-mutation-validated computation graph that finalizes into an
//! immutable [`Model`].
//!
//! # Type-State Pattern
//!
//! The IR transitions through states enforced at compile time:
//!
//! ```text
//! ModelBuilder           — mutable graph under construction.
//!       │  .finish()
//!       ▼
//! Model                  — sorted, trimmed, hashed; immutable.
//! ```
//!
//! `finish()` consumes the builder, so mutate-after-finish is a compile
//! error rather than a runtime status. A failed `add_operation` flips a
//! sticky invalid bit instead: every later mutation and `finish` then
//! fail as bad state.
//!
//! # Finalization
//! `finish()` consolidates deferred large constants into one shared
//! pool, sorts operations into a deterministic run order, validates the
//! whole graph, checks version compatibility, trims trailing default
//! arguments, optionally removes dead operands, and attaches a SHA-256
//! arch-hash over the normalized topology.
//!
//! # Example
//! ```
//! use graph_types::{Operand, OperandType, OperationType};
//! use model_ir::ModelBuilder;
//!
//! # fn main() -> Result<(), model_ir::ModelError> {
//! let mut builder = ModelBuilder::new();
//! let a = builder.add_operand(Operand::new(OperandType::TensorFloat32, vec![2, 2], 0.0, 0))?;
//! let b = builder.add_operand(Operand::new(OperandType::TensorFloat32, vec![2, 2], 0.0, 0))?;
//! let act = builder.add_operand(Operand::new(OperandType::Int32, vec![], 0.0, 0))?;
//! let out = builder.add_operand(Operand::new(OperandType::TensorFloat32, vec![2, 2], 0.0, 0))?;
//! builder.set_operand_value(act, Some(&0i32.to_ne_bytes()))?;
//! builder.add_operation(OperationType::Add, vec![a, b, act], vec![out])?;
//! builder.identify_inputs_and_outputs(vec![a, b], vec![out])?;
//! let model = builder.finish()?;
//! println!("{}", model.summary());
//! # Ok(())
//! # }
//! ```

mod builder;
mod error;
mod hash;
mod model;
mod normalize;

pub use builder::ModelBuilder;
pub use error::ModelError;
pub use model::{Model, Subgraph};

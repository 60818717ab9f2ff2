// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # op-registry
//!
//! The process-wide operation table. Each registered operation code maps
//! to an [`OperationEntry`]:
//!
//! - `validate` — structural validation at graph-build time: arities,
//!   operand-type patterns, whatever is statically decidable.
//! - `prepare` — run-time shape propagation to outputs (optional; may
//!   still fail).
//! - `execute` — the kernel itself (optional; the kernel catalog is a
//!   separate contract, and only a few reference entries live here so
//!   the CPU device is exercisable end to end).
//! - Option flags: `allow_omitted_operand`, `allow_zero_sized_input`.
//!
//! Extension operations live in a parallel table keyed by
//! `(prefix, inner_code)`. The global registry is populated once on
//! first access and read-only afterwards.

mod builtin;
mod error;
mod kernels;
mod registry;

pub use error::OpError;
pub use registry::{
    ExecuteContext, ExecuteFn, OperationEntry, OperationRegistry, PrepareContext, PrepareFn,
    ValidateFn,
};

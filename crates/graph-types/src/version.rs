// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Feature levels for version-compatibility checks.
//!
//! Types and operations were introduced across releases; a finished model
//! reports the maximum level any of its parts requires, and compilation
//! rejects models above the runtime's supported level.

use std::fmt;

/// A runtime feature level, ordered oldest to newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub enum FeatureLevel {
    /// The initial release.
    V1_0,
    /// Adds the precision-relaxation flag and broadcast arithmetic ops.
    V1_1,
    /// Adds float16/bool/quant16 operand types and extensions.
    V1_2,
    /// Adds signed quantized types and subgraph references.
    V1_3,
}

impl FeatureLevel {
    /// The newest level this runtime supports.
    pub fn current() -> Self {
        Self::V1_3
    }
}

impl fmt::Display for FeatureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::V1_0 => "1.0",
            Self::V1_1 => "1.1",
            Self::V1_2 => "1.2",
            Self::V1_3 => "1.3",
        };
        f.write_str(s)
    }
}

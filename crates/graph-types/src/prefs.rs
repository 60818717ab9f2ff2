// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Compilation preference and priority enums of the stable surface.

use std::fmt;

/// What the compiled artifact should optimize for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPreference {
    /// Minimize battery drain.
    LowPower,
    /// Return a single answer as fast as possible.
    #[default]
    FastSingleAnswer,
    /// Maximize throughput over successive frames.
    SustainedSpeed,
}

impl ExecutionPreference {
    /// Decodes the stable numeric code (0, 1, 2).
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::LowPower),
            1 => Some(Self::FastSingleAnswer),
            2 => Some(Self::SustainedSpeed),
            _ => None,
        }
    }

    /// Returns the stable numeric code.
    pub fn code(&self) -> u32 {
        match self {
            Self::LowPower => 0,
            Self::FastSingleAnswer => 1,
            Self::SustainedSpeed => 2,
        }
    }
}

impl fmt::Display for ExecutionPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LowPower => "low_power",
            Self::FastSingleAnswer => "fast_single_answer",
            Self::SustainedSpeed => "sustained_speed",
        };
        f.write_str(s)
    }
}

/// Relative priority among compilations from one client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Decodes the stable numeric code (90, 100, 110).
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            90 => Some(Self::Low),
            100 => Some(Self::Medium),
            110 => Some(Self::High),
            _ => None,
        }
    }

    /// Returns the stable numeric code.
    pub fn code(&self) -> u32 {
        match self {
            Self::Low => 90,
            Self::Medium => 100,
            Self::High => 110,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

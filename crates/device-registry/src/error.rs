// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for device interaction.

use graph_types::Status;

/// Errors surfaced by a [`Device`](crate::Device).
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The device could not compile the (sub)model.
    #[error("device '{device}' failed to prepare model: {detail}")]
    PrepareFailed { device: String, detail: String },

    /// The model contains an operation the device does not support.
    #[error("device '{device}' does not support operation {operation}")]
    UnsupportedOperation { device: String, operation: String },

    /// The compilation deadline fired inside the device.
    #[error("deadline exceeded while preparing model ({})", if *transient { "transient" } else { "persistent" })]
    MissedDeadline { transient: bool },

    /// The device ran out of a pooled resource.
    #[error("device '{device}' exhausted resources: {detail}")]
    ResourceExhausted {
        device: String,
        detail: String,
        transient: bool,
    },
}

impl DeviceError {
    /// Maps this error onto its stable status category.
    pub fn status(&self) -> Status {
        match self {
            Self::PrepareFailed { .. } => Status::OpFailed,
            Self::UnsupportedOperation { .. } => Status::BadData,
            Self::MissedDeadline { transient: true } => Status::MissedDeadlineTransient,
            Self::MissedDeadline { transient: false } => Status::MissedDeadlinePersistent,
            Self::ResourceExhausted { transient: true, .. } => Status::ResourceExhaustedTransient,
            Self::ResourceExhausted { transient: false, .. } => {
                Status::ResourceExhaustedPersistent
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            DeviceError::MissedDeadline { transient: true }.status(),
            Status::MissedDeadlineTransient
        );
        assert_eq!(
            DeviceError::PrepareFailed {
                device: "gpu0".into(),
                detail: "driver crash".into()
            }
            .status(),
            Status::OpFailed
        );
    }
}

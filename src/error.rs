// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use thiserror::Error;

use crate::models::{
    byte_order::CodecError,
    sense::sense_data::CopyDevice,
    status::{ScsiStatus, SenseKey},
};

/// Sense key and additional sense code/qualifier of a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenseSummary {
    pub key: SenseKey,
    pub asc: u8,
    pub ascq: u8,
    /// Set when the sense was taken from an EXTENDED COPY nested block.
    pub copy_device: Option<CopyDevice>,
}

impl fmt::Display for SenseSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(dev) = self.copy_device {
            write!(f, "{dev} device: ")?;
        }
        write!(
            f,
            "Sense Key = {}, Sense Code/Qualifier = ({:#04x}, {:#04x})",
            self.key, self.asc, self.ascq
        )
    }
}

fn sense_suffix(sense: &Option<SenseSummary>) -> String {
    sense.map(|s| format!(", {s}")).unwrap_or_default()
}

/// Failure of a single CDB after the retry loop gave up.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScsiError {
    /// The pass-through call itself failed.
    #[error("{opcode} failed on device {device}: OS error {os_error}")]
    Transport {
        device: String,
        opcode: &'static str,
        os_error: i32,
    },
    /// The device completed the command with an error status.
    #[error(
        "{opcode} failed on device {device}: SCSI Status = {status}, Host Status = {host:#x}, \
         Driver Status = {driver:#x}{}",
        sense_suffix(.sense)
    )]
    Scsi {
        device: String,
        opcode: &'static str,
        status: ScsiStatus,
        host: u16,
        driver: u16,
        sense: Option<SenseSummary>,
    },
}

impl ScsiError {
    pub fn sense(&self) -> Option<SenseSummary> {
        match self {
            ScsiError::Scsi { sense, .. } => *sense,
            ScsiError::Transport { .. } => None,
        }
    }
}

/// Errors surfaced by windowing and copy orchestration.
#[derive(Debug, Error)]
pub enum SptError {
    #[error(transparent)]
    Exec(#[from] ScsiError),
    /// Invalid LBA / block / length combination, reported before any CDB is
    /// sent.
    #[error("{device}: {message}")]
    Range { device: String, message: String },
    /// The device answered with something the crate cannot work with.
    #[error("{device}: protocol error: {message}")]
    Protocol { device: String, message: String },
    #[error(
        "data miscompare: {source_device} vs {destination_device} at byte offset {offset} \
         (lba {lba})"
    )]
    Verify {
        source_device: String,
        destination_device: String,
        offset: usize,
        lba: u64,
    },
    /// Restart was requested more often than the recovery retry limit.
    #[error("{device}: Exceeded restart limit ({limit})")]
    RestartLimit { device: String, limit: u32 },
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Host-side failures outside the SCSI path (token file, worker join).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SptError {
    pub fn range(device: &str, message: impl Into<String>) -> Self {
        SptError::Range {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn protocol(device: &str, message: impl Into<String>) -> Self {
        SptError::Protocol {
            device: device.to_string(),
            message: message.into(),
        }
    }
}

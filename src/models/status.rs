// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

/// The 1-byte SCSI status returned with every completed command (SAM-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScsiStatus {
    #[default]
    Good,
    CheckCondition,
    ConditionMet,
    Busy,
    Intermediate,
    IntermediateConditionMet,
    ReservationConflict,
    CommandTerminated,
    /// Task set full, reported by older targets as "queue full".
    QueueFull,
    AcaActive,
    TaskAborted,
    /// Any other status code defined in SAM-x or reserved
    Other(u8),
}

impl From<u8> for ScsiStatus {
    fn from(b: u8) -> Self {
        match b {
            0x00 => ScsiStatus::Good,
            0x02 => ScsiStatus::CheckCondition,
            0x04 => ScsiStatus::ConditionMet,
            0x08 => ScsiStatus::Busy,
            0x10 => ScsiStatus::Intermediate,
            0x14 => ScsiStatus::IntermediateConditionMet,
            0x18 => ScsiStatus::ReservationConflict,
            0x22 => ScsiStatus::CommandTerminated,
            0x28 => ScsiStatus::QueueFull,
            0x30 => ScsiStatus::AcaActive,
            0x40 => ScsiStatus::TaskAborted,
            other => ScsiStatus::Other(other),
        }
    }
}

impl From<ScsiStatus> for u8 {
    fn from(s: ScsiStatus) -> Self {
        match s {
            ScsiStatus::Good => 0x00,
            ScsiStatus::CheckCondition => 0x02,
            ScsiStatus::ConditionMet => 0x04,
            ScsiStatus::Busy => 0x08,
            ScsiStatus::Intermediate => 0x10,
            ScsiStatus::IntermediateConditionMet => 0x14,
            ScsiStatus::ReservationConflict => 0x18,
            ScsiStatus::CommandTerminated => 0x22,
            ScsiStatus::QueueFull => 0x28,
            ScsiStatus::AcaActive => 0x30,
            ScsiStatus::TaskAborted => 0x40,
            ScsiStatus::Other(v) => v,
        }
    }
}

impl ScsiStatus {
    /// Short report name, e.g. `busy`, `check_condition`.
    pub fn name(self) -> &'static str {
        match self {
            ScsiStatus::Good => "good",
            ScsiStatus::CheckCondition => "check_condition",
            ScsiStatus::ConditionMet => "condition_met",
            ScsiStatus::Busy => "busy",
            ScsiStatus::Intermediate => "intermediate",
            ScsiStatus::IntermediateConditionMet => "intermediate_condition_met",
            ScsiStatus::ReservationConflict => "reservation_conflict",
            ScsiStatus::CommandTerminated => "command_terminated",
            ScsiStatus::QueueFull => "queue_full",
            ScsiStatus::AcaActive => "aca_active",
            ScsiStatus::TaskAborted => "aborted",
            ScsiStatus::Other(_) => "???",
        }
    }
}

impl fmt::Display for ScsiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x} ({})", u8::from(*self), self.name())
    }
}

/// Sense keys (SPC-4 Table 48).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenseKey {
    NoSense = 0x00,
    RecoveredError = 0x01,
    NotReady = 0x02,
    MediumError = 0x03,
    HardwareError = 0x04,
    IllegalRequest = 0x05,
    UnitAttention = 0x06,
    DataProtect = 0x07,
    BlankCheck = 0x08,
    VendorSpecific = 0x09,
    CopyAborted = 0x0A,
    AbortedCommand = 0x0B,
    Reserved = 0x0C,
    VolumeOverflow = 0x0D,
    Miscompare = 0x0E,
    Completed = 0x0F,
}

impl From<u8> for SenseKey {
    fn from(v: u8) -> Self {
        use SenseKey::*;
        match v & 0x0F {
            0x00 => NoSense,
            0x01 => RecoveredError,
            0x02 => NotReady,
            0x03 => MediumError,
            0x04 => HardwareError,
            0x05 => IllegalRequest,
            0x06 => UnitAttention,
            0x07 => DataProtect,
            0x08 => BlankCheck,
            0x09 => VendorSpecific,
            0x0A => CopyAborted,
            0x0B => AbortedCommand,
            0x0C => Reserved,
            0x0D => VolumeOverflow,
            0x0E => Miscompare,
            _ => Completed,
        }
    }
}

impl SenseKey {
    pub fn as_str(self) -> &'static str {
        use SenseKey::*;
        match self {
            NoSense => "NO SENSE",
            RecoveredError => "RECOVERED ERROR",
            NotReady => "NOT READY",
            MediumError => "MEDIUM ERROR",
            HardwareError => "HARDWARE ERROR",
            IllegalRequest => "ILLEGAL REQUEST",
            UnitAttention => "UNIT ATTENTION",
            DataProtect => "DATA PROTECT",
            BlankCheck => "BLANK CHECK",
            VendorSpecific => "VENDOR SPECIFIC",
            CopyAborted => "COPY ABORTED",
            AbortedCommand => "ABORTED COMMAND",
            Reserved => "RESERVED",
            VolumeOverflow => "VOLUME OVERFLOW",
            Miscompare => "MISCOMPARE",
            Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for SenseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x} = {}", *self as u8, self.as_str())
    }
}

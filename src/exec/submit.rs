// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use crate::models::common::DataDirection;

/// One pass-through call as handed to the OS layer.
#[derive(Debug)]
pub struct SubmitRequest<'a> {
    pub cdb: &'a [u8],
    pub direction: DataDirection,
    /// Exactly `data_length` bytes; empty for no-data commands.
    pub data: &'a mut [u8],
    pub timeout: Duration,
}

/// What the pass-through call reported back.
///
/// When `os_error` is set the other fields carry no meaning; the engine
/// zeroes them so nothing stale is classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub os_error: Option<i32>,
    pub scsi_status: u8,
    pub host_status: u16,
    pub driver_status: u16,
    /// Bytes of the data buffer that were not transferred.
    pub resid: usize,
    /// Valid bytes written into the sense buffer.
    pub sense_len: usize,
}

impl SubmitOutcome {
    pub fn os_failure(errno: i32) -> Self {
        Self {
            os_error: Some(errno),
            ..Default::default()
        }
    }
}

/// OS pass-through primitive (SG_IO, SPTI, a simulator, ...).
pub trait Submitter: Send {
    /// Submit one CDB. `sense` is zeroed by the caller and sized to the
    /// context's sense allocation.
    fn submit(&mut self, req: SubmitRequest<'_>, sense: &mut [u8]) -> SubmitOutcome;

    /// Whether an OS-level failure is worth another attempt (e.g. EAGAIN,
    /// EBUSY on the host adapter).
    fn is_os_retryable(&self, _os_error: i32) -> bool {
        false
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Retry classification of a failed submission.

use crate::{
    control_block::token::{SA_EXTENDED_COPY_LID1, THIRD_PARTY_COPY_OUT},
    exec::context::CommandContext,
    models::{
        sense::sense_data::{CopyDevice, SenseData, nested_copy_sense},
        status::{ScsiStatus, SenseKey},
    },
};

/// "Recovered data" additional sense code.
pub const ASC_RECOVERED_DATA: u8 = 0x17;
/// "Logical unit not ready" additional sense code.
pub const ASC_NOT_READY: u8 = 0x04;

/// Not-ready qualifiers that mean the unit is on its way to ready. Format,
/// sanitize and self-test stay not-ready for their whole run and are left
/// out on purpose.
pub const NOT_READY_TRANSITIONS: [u8; 8] = [
    0x00, // cause not reportable
    0x01, // becoming ready
    0x05, // rebuild in progress
    0x06, // recalculation in progress
    0x07, // operation in progress
    0x08, // long write in progress
    0x0A, // asymmetric access state transition
    0x14, // space allocation in progress
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryVerdict {
    pub retry: bool,
    /// For EXTENDED COPY: the device whose nested sense was classified.
    pub copy_device: Option<CopyDevice>,
}

impl RetryVerdict {
    const NO: RetryVerdict = RetryVerdict {
        retry: false,
        copy_device: None,
    };
    const YES: RetryVerdict = RetryVerdict {
        retry: true,
        copy_device: None,
    };
}

fn sense_retryable(status: ScsiStatus, sense: &SenseData) -> bool {
    match status {
        ScsiStatus::Busy | ScsiStatus::QueueFull => true,
        ScsiStatus::CheckCondition => match sense.key() {
            SenseKey::UnitAttention => sense.asc != ASC_RECOVERED_DATA,
            SenseKey::NotReady => {
                sense.asc == ASC_NOT_READY && NOT_READY_TRANSITIONS.contains(&sense.ascq)
            },
            _ => false,
        },
        _ => false,
    }
}

#[inline]
fn is_extended_copy(cdb: &[u8]) -> bool {
    cdb.first() == Some(&THIRD_PARTY_COPY_OUT)
        && cdb.get(1).map(|b| b & 0x1F) == Some(SA_EXTENDED_COPY_LID1)
}

/// Classify a SCSI-level failure from its status, raw sense bytes and CDB.
///
/// A COPY ABORTED from EXTENDED COPY is judged by the nested sense of the
/// source or destination device that caused it.
pub fn classify(status: ScsiStatus, sense: &[u8], cdb: &[u8]) -> RetryVerdict {
    if matches!(status, ScsiStatus::Busy | ScsiStatus::QueueFull) {
        return RetryVerdict::YES;
    }
    if status != ScsiStatus::CheckCondition {
        return RetryVerdict::NO;
    }
    let Ok(parsed) = SenseData::parse(sense) else {
        return RetryVerdict::NO;
    };
    if is_extended_copy(cdb) && parsed.key() == SenseKey::CopyAborted {
        return match nested_copy_sense(&parsed, sense) {
            Some(nested) => RetryVerdict {
                retry: sense_retryable(ScsiStatus::from(nested.scsi_status), &nested.sense),
                copy_device: Some(nested.device),
            },
            None => RetryVerdict::NO,
        };
    }
    RetryVerdict {
        retry: sense_retryable(status, &parsed),
        copy_device: None,
    }
}

/// Count the attempt and decide. OS-level failures are judged by the
/// submitter, SCSI-level ones by [`classify`].
pub(crate) fn is_retryable(ctx: &mut CommandContext) -> RetryVerdict {
    ctx.outcome.retries += 1;
    if let Some(errno) = ctx.outcome.os_error {
        return RetryVerdict {
            retry: ctx.is_os_retryable(errno),
            copy_device: None,
        };
    }
    classify(ctx.outcome.scsi_status, ctx.sense(), ctx.cdb.as_slice())
}

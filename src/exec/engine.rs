// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::thread;

use tracing::{debug, warn};

use crate::{
    error::{ScsiError, SptError},
    exec::{
        context::CommandContext,
        report::{report_failure, report_retry, scsi_error},
        retry::is_retryable,
    },
    registry::{
        OpcodeInfo,
        family::{CdbFields, Response},
    },
};

/// Successful ends of [`execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Success,
    /// A retryable error hit a context configured to restart: the caller
    /// must redo the whole operation from a clean state.
    Restart,
}

/// Submit the context's CDB, retrying per its recovery policy.
///
/// Failures are reported (when error logging is on) and always returned.
pub fn execute(ctx: &mut CommandContext) -> Result<ExecStatus, ScsiError> {
    ctx.outcome.retries = 0;
    loop {
        ctx.submit_once();
        if !ctx.outcome.failed() || !ctx.recovery.enabled {
            break;
        }
        if ctx.outcome.retries >= ctx.recovery.retry_limit {
            if ctx.log.errors {
                warn!(
                    "{} on {}: Exceeded retry limit ({})",
                    ctx.cdb_name(),
                    ctx.dsf,
                    ctx.recovery.retry_limit
                );
            }
            break;
        }
        let verdict = is_retryable(ctx);
        if !verdict.retry {
            break;
        }
        thread::sleep(ctx.recovery.delay);
        if ctx.log.errors {
            report_retry(ctx, verdict.copy_device);
        }
        if ctx.recovery.restart_on_error {
            return Ok(ExecStatus::Restart);
        }
    }

    if ctx.outcome.failed() {
        let err = scsi_error(ctx);
        if ctx.log.errors {
            report_failure(ctx, &err);
        }
        return Err(err);
    }
    if ctx.log.debug {
        debug!(
            "{} on {}: {} of {} bytes",
            ctx.cdb_name(),
            ctx.dsf,
            ctx.data_transferred(),
            ctx.data_length
        );
    }
    Ok(ExecStatus::Success)
}

/// Build `info`'s CDB from `fields`, size the data buffer to `data_len` and
/// execute.
pub fn issue(
    ctx: &mut CommandContext,
    info: &'static OpcodeInfo,
    fields: &CdbFields,
    data_len: usize,
) -> Result<ExecStatus, SptError> {
    ctx.prepare(info, fields)?;
    ctx.ensure_data_len(data_len);
    Ok(execute(ctx)?)
}

/// Issue a scratch command that must not disturb the current operation,
/// resubmitting in place on retryable errors instead of restarting, and
/// hand the returned bytes to `f`.
pub fn with_scratch_command<T>(
    ctx: &mut CommandContext,
    info: &'static OpcodeInfo,
    fields: &CdbFields,
    data_len: usize,
    f: impl FnOnce(&CommandContext) -> Result<T, SptError>,
) -> Result<T, SptError> {
    ctx.with_scratch(|ctx| {
        let restart = std::mem::replace(&mut ctx.recovery.restart_on_error, false);
        let res = issue(ctx, info, fields, data_len);
        ctx.recovery.restart_on_error = restart;
        res?;
        f(ctx)
    })
}

/// Scratch data-in command decoded by the opcode's family.
pub fn query(
    ctx: &mut CommandContext,
    info: &'static OpcodeInfo,
    fields: &CdbFields,
    alloc_len: usize,
) -> Result<Response, SptError> {
    with_scratch_command(ctx, info, fields, alloc_len, |ctx| {
        Ok(info.parse_response(ctx.response())?)
    })
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Error reports written through `tracing`.

use std::fmt::Write;

use tracing::{error, warn};

use crate::{
    error::{ScsiError, SenseSummary},
    exec::context::CommandContext,
    models::{
        sense::sense_data::{CopyDevice, SenseData, nested_copy_sense},
        status::SenseKey,
    },
};

const DUMP_WIDTH: usize = 16;

/// Hex/ASCII dump, 16 bytes per line, offsets starting at `base`. The byte
/// at `mark` (an index into `bytes`) is flagged with `*`.
pub fn dump_lines(bytes: &[u8], base: usize, mark: Option<usize>) -> Vec<String> {
    bytes
        .chunks(DUMP_WIDTH)
        .enumerate()
        .map(|(row, chunk)| {
            let start = row * DUMP_WIDTH;
            let mut line = String::with_capacity(80);
            let _ = write!(line, "{:08x} ", base + start);
            for (i, b) in chunk.iter().enumerate() {
                let sep = if mark == Some(start + i) { '*' } else { ' ' };
                let _ = write!(line, "{sep}{b:02x}");
            }
            for _ in chunk.len()..DUMP_WIDTH {
                line.push_str("   ");
            }
            line.push_str("  \"");
            line.extend(chunk.iter().map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            }));
            line.push('"');
            line
        })
        .collect()
}

/// Decoded sense of the last submission, preferring the nested block of
/// an EXTENDED COPY COPY ABORTED.
pub fn sense_summary(ctx: &CommandContext) -> Option<SenseSummary> {
    let raw = ctx.sense();
    let parsed = SenseData::parse(raw).ok()?;
    let nested = match parsed.key() {
        SenseKey::CopyAborted => nested_copy_sense(&parsed, raw),
        _ => None,
    };
    if let Some(nested) = nested {
        return Some(SenseSummary {
            key: nested.sense.key(),
            asc: nested.sense.asc,
            ascq: nested.sense.ascq,
            copy_device: Some(nested.device),
        });
    }
    Some(SenseSummary {
        key: parsed.key(),
        asc: parsed.asc,
        ascq: parsed.ascq,
        copy_device: None,
    })
}

/// Build the error for a failed command from the context outcome.
pub fn scsi_error(ctx: &CommandContext) -> ScsiError {
    match ctx.outcome.os_error {
        Some(os_error) => ScsiError::Transport {
            device: ctx.dsf.clone(),
            opcode: ctx.cdb_name(),
            os_error,
        },
        None => ScsiError::Scsi {
            device: ctx.dsf.clone(),
            opcode: ctx.cdb_name(),
            status: ctx.outcome.scsi_status,
            host: ctx.outcome.host_status,
            driver: ctx.outcome.driver_status,
            sense: sense_summary(ctx),
        },
    }
}

/// Final report for a failed command.
pub fn report_failure(ctx: &CommandContext, err: &ScsiError) {
    match err {
        ScsiError::Transport { os_error, .. } => {
            error!(
                "{} failed on device {}: {}",
                ctx.cdb_name(),
                ctx.dsf,
                std::io::Error::from_raw_os_error(*os_error)
            );
        },
        ScsiError::Scsi { status, host, driver, sense, .. } => {
            error!("{} failed on device {}", ctx.cdb_name(), ctx.dsf);
            error!(
                "SCSI Status = {status}, Host Status = {host:#x}, Driver Status = {driver:#x}"
            );
            if let Some(s) = sense {
                error!("{s} [{}]", describe(s));
            }
            if ctx.log.debug || ctx.log.show_sense {
                report_sense_dump(ctx);
            }
        },
    }
}

fn describe(s: &SenseSummary) -> &'static str {
    crate::models::sense::asc_table::asc_ascq_to_str(s.asc, s.ascq)
}

/// Raw sense bytes, one dump line per event.
pub fn report_sense_dump(ctx: &CommandContext) {
    for line in dump_lines(ctx.sense(), 0, None) {
        error!("sense: {line}");
    }
}

/// Logged before a retry or restart, describing the error being retried.
pub fn report_retry(ctx: &CommandContext, copy_device: Option<CopyDevice>) {
    if let Some(dev) = copy_device {
        warn!("Retriable {dev} device error");
    }
    let err = scsi_error(ctx);
    warn!(
        "{err} (retry {} of {})",
        ctx.outcome.retries, ctx.recovery.retry_limit
    );
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Host-side copy: READ from the source, WRITE the same bytes to the
//! destination. Verify mode reads both and compares without writing.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    copy::operation::OperationSet,
    error::SptError,
    exec::engine::{ExecStatus, issue},
    io::{
        Completion,
        params::DeviceIoParams,
        verify::{CompareSite, find_miscompare, read_blocks, report_miscompare},
        window::{Advance, advance_op},
    },
    models::common::DataDirection,
    registry::family::CdbFields,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RwMode {
    Copy,
    Verify,
}

fn transfer(iop: &mut DeviceIoParams, blocks: u64) -> Result<ExecStatus, SptError> {
    let fields = CdbFields {
        lba: iop.current_lba,
        blocks,
        ..Default::default()
    };
    let len = (blocks * iop.block_size()) as usize;
    issue(&mut iop.ctx, iop.op, &fields, len)
}

fn compare(
    src: &DeviceIoParams,
    dst: &DeviceIoParams,
    expected: &[u8],
    received: &[u8],
) -> Result<(), SptError> {
    match find_miscompare(expected, received) {
        None => Ok(()),
        Some(offset) => {
            let site = CompareSite {
                source: src.dsf(),
                source_lba: src.current_lba,
                destination: dst.dsf(),
                destination_lba: dst.current_lba,
                block_size: dst.block_size(),
            };
            Err(report_miscompare(&site, expected, received, offset, dst.dump_limit))
        },
    }
}

/// Blocks the current source and the destination can move together.
fn pair_blocks(src: &DeviceIoParams, dst: &DeviceIoParams) -> u64 {
    src.data_blocks
        .min(src.remaining())
        .min(dst.data_blocks)
        .min(dst.remaining())
}

/// Run a copy (or verify) of the sources onto the destination. Sources are
/// taken in order: each one is read until its window ends, and the
/// destination picks up the next source at its current LBA. The run ends
/// when the destination is full or every source is exhausted.
pub fn run_rw_copy(
    set: &mut OperationSet,
    mode: RwMode,
    cancel: &CancellationToken,
) -> Result<Completion, SptError> {
    if set.sources.is_empty() {
        return Err(SptError::Config(
            "read/write copy needs at least one source".into(),
        ));
    }
    let wanted = match mode {
        RwMode::Copy => DataDirection::Write,
        RwMode::Verify => DataDirection::Read,
    };
    if set.destination.op.direction != wanted {
        return Err(SptError::Config(format!(
            "{} cannot be the destination command of a {mode:?} pass",
            set.destination.op.name
        )));
    }
    set.prepare()?;
    let limit = set.destination.ctx.recovery.retry_limit;
    let mut restarts = 0u32;
    let mut current = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Ok(Completion::Interrupted);
        }
        let OperationSet {
            sources,
            destination: dst,
            compare: verify_writes,
            ..
        } = set;
        let src = &mut sources[current];
        let blocks = pair_blocks(src, dst);

        let mut status = transfer(src, blocks)?;
        if status == ExecStatus::Success {
            status = match mode {
                RwMode::Copy => {
                    let len = src.ctx.data_transferred();
                    dst.ctx.set_data(&src.ctx.data[..len]);
                    transfer(dst, blocks)?
                },
                RwMode::Verify => transfer(dst, blocks)?,
            };
        }
        if status == ExecStatus::Restart {
            restarts += 1;
            if restarts > limit {
                return Err(SptError::RestartLimit {
                    device: dst.dsf().to_string(),
                    limit,
                });
            }
            debug!("{}: restarting pass at lba {}", dst.dsf(), dst.current_lba);
            continue;
        }
        restarts = 0;

        match mode {
            RwMode::Verify => compare(src, dst, src.ctx.response(), dst.ctx.response())?,
            RwMode::Copy if *verify_writes => {
                let lba = dst.current_lba;
                let readback = read_blocks(&mut dst.ctx, lba, blocks)?;
                compare(src, dst, src.ctx.response(), &readback)?;
            },
            RwMode::Copy => {},
        }

        src.cdb_blocks = blocks;
        let source_done = advance_op(src)? == Advance::EndOfData;
        dst.cdb_blocks = blocks;
        if advance_op(dst)? == Advance::EndOfData {
            return Ok(Completion::Done);
        }
        if source_done {
            debug!(
                "{}: source {} exhausted at destination lba {}",
                dst.dsf(),
                src.dsf(),
                dst.current_lba
            );
            current += 1;
            if current == sources.len() {
                return Ok(Completion::Done);
            }
        }
    }
}

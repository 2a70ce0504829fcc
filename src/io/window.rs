// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Walks a device window one CDB at a time.
//!
//! [`advance`] is called once before the first CDB of an operation and once
//! after every successful CDB. The first call validates the request and
//! establishes the window; later calls account for the blocks moved and
//! position the next transfer.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::SptError,
    exec::engine::{ExecStatus, issue},
    io::{Completion, capacity::get_capacity, params::DeviceIoParams, verify::verify_read},
    models::common::DataDirection,
};

/// Result of a successful [`advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Continue,
    /// The window is exhausted and has been reset for another pass.
    EndOfData,
}

/// Advance using the limits of the window's own opcode.
pub fn advance_op(iop: &mut DeviceIoParams) -> Result<Advance, SptError> {
    let (max_lba, max_blocks) = (iop.op.max_lba(), iop.op.max_blocks());
    advance(iop, max_lba, max_blocks)
}

pub fn advance(
    iop: &mut DeviceIoParams,
    max_lba: u64,
    max_blocks: u64,
) -> Result<Advance, SptError> {
    if iop.first_time {
        first_time(iop, max_lba, max_blocks)?;
        Ok(Advance::Continue)
    } else {
        Ok(steady_state(iop))
    }
}

fn first_time(iop: &mut DeviceIoParams, max_lba: u64, mut max_blocks: u64) -> Result<(), SptError> {
    if iop.ctx.device_size == 0 || iop.ctx.device_capacity == 0 {
        get_capacity(&mut iop.ctx, &mut iop.caps)?;
    }
    let size = iop.block_size();
    let capacity = iop.ctx.device_capacity;
    let op = iop.op;

    if iop.ctx.direction != op.direction {
        if iop.ctx.log.debug {
            debug!(
                "{}: {} direction {} corrected to {}",
                iop.dsf(),
                op.name,
                iop.ctx.direction,
                op.direction
            );
        }
        iop.ctx.direction = op.direction;
    }

    // Synthesize a transfer length for data commands that carry none.
    if op.direction != DataDirection::None && op.has_natural_length() && iop.ctx.data_length == 0 {
        let blocks = if iop.cdb_blocks != 0 { iop.cdb_blocks } else { 1 };
        iop.ctx.data_length = (blocks * size) as usize;
    }

    iop.data_blocks = if iop.cdb_blocks != 0 {
        iop.cdb_blocks
    } else if op.default_blocks != 0 {
        op.default_blocks
    } else if op.direction == DataDirection::None {
        max_blocks
    } else {
        iop.ctx.data_length as u64 / size
    };
    // Copy commands describe their extent only through the block count.
    if !op.has_natural_length() && iop.cdb_blocks == 0 {
        iop.cdb_blocks = iop.data_blocks;
    }

    if iop.scale_count > 1 {
        max_blocks = max_blocks.saturating_mul(iop.scale_count);
        if iop.saved.valid {
            iop.cdb_blocks = iop.saved.cdb_blocks;
            iop.data_blocks = iop.saved.cdb_blocks;
        } else {
            iop.cdb_blocks = iop.cdb_blocks.saturating_mul(iop.scale_count);
            iop.data_blocks = iop.data_blocks.saturating_mul(iop.scale_count);
        }
    }

    validate(iop, max_lba, max_blocks, size, capacity)?;
    initialize_io_limits(iop, size, capacity);

    if !iop.saved.valid {
        iop.saved.cdb_blocks = iop.cdb_blocks;
        iop.saved.data_length = iop.ctx.data_length;
    }
    iop.saved.valid = true;
    iop.saved.block_limit = iop.block_limit;
    iop.saved.starting_lba = iop.starting_lba;
    iop.saved.ending_lba = iop.ending_lba;
    iop.saved.list_identifier = iop.list_identifier;

    let len = iop.ctx.data_length;
    iop.ctx.ensure_data_len(len);
    if op.direction == DataDirection::Write && op.has_natural_length() {
        iop.pattern
            .fill(&mut iop.ctx.data[..len], size as usize, iop.current_lba);
    }
    if op.direction == DataDirection::Read && iop.compare && iop.compare_data.is_none() {
        let mut expected = vec![0u8; len];
        if !iop.pattern.is_iot() {
            iop.pattern.fill(&mut expected, size as usize, iop.current_lba);
        }
        iop.compare_data = Some(expected);
    }
    reseed(iop);

    if iop.ctx.log.debug {
        debug!(
            "{}: window [{}, {}) limit {} blocks, {} blocks per {}",
            iop.dsf(),
            iop.starting_lba,
            iop.ending_lba,
            iop.block_limit,
            iop.data_blocks,
            op.name
        );
    }
    iop.first_time = false;
    iop.end_of_data = false;
    Ok(())
}

fn validate(
    iop: &DeviceIoParams,
    max_lba: u64,
    max_blocks: u64,
    size: u64,
    capacity: u64,
) -> Result<(), SptError> {
    let dsf = iop.dsf();
    let fail = |m: String| Err(SptError::range(dsf, m));

    if iop.op.has_natural_length()
        && !iop.disable_length_check
        && iop.ctx.data_length as u64 % size != 0
    {
        return fail(format!(
            "data length {} is not a multiple of the device block size {size}",
            iop.ctx.data_length
        ));
    }
    if iop.data_limit % size != 0 {
        return fail(format!(
            "data limit {} is not a multiple of the device block size {size}",
            iop.data_limit
        ));
    }
    if iop.step_value % size != 0 {
        return fail(format!(
            "step value {} is not a multiple of the device block size {size}",
            iop.step_value
        ));
    }
    if iop.starting_lba > max_lba {
        return fail(format!(
            "starting lba {} exceeds the {} maximum lba {max_lba}",
            iop.starting_lba, iop.op.name
        ));
    }
    if iop.starting_lba >= capacity {
        return fail(format!(
            "starting lba {} is beyond the device capacity of {capacity} blocks",
            iop.starting_lba
        ));
    }
    if iop.ending_lba != 0 {
        if iop.ending_lba < iop.starting_lba {
            return fail(format!(
                "ending lba {} is below starting lba {}",
                iop.ending_lba, iop.starting_lba
            ));
        }
        if iop.ending_lba > capacity {
            return fail(format!(
                "ending lba {} exceeds the device capacity of {capacity} blocks",
                iop.ending_lba
            ));
        }
    }
    if !iop.bypass && max_blocks != 0 && iop.data_blocks > max_blocks {
        return fail(format!(
            "block count {} exceeds the {} maximum of {max_blocks}",
            iop.data_blocks, iop.op.name
        ));
    }
    Ok(())
}

fn initialize_io_limits(iop: &mut DeviceIoParams, size: u64, capacity: u64) {
    let room = capacity - iop.starting_lba;
    iop.current_lba = iop.starting_lba;
    if iop.data_limit != 0 {
        iop.ending_lba = iop.starting_lba + (iop.data_limit / size).min(room);
    } else if iop.ending_lba == 0 {
        iop.ending_lba = if iop.block_limit != 0 {
            iop.starting_lba + iop.block_limit.min(room)
        } else {
            capacity
        };
    }
    iop.block_count = 0;
    iop.block_limit = iop.ending_lba - iop.starting_lba;
    if iop.block_limit < iop.data_blocks {
        set_next_blocks(iop, iop.block_limit, size);
    }
}

/// Size the next transfer to `blocks`.
fn set_next_blocks(iop: &mut DeviceIoParams, blocks: u64, size: u64) {
    iop.data_blocks = blocks;
    if iop.cdb_blocks != 0 {
        iop.cdb_blocks = blocks;
    }
    if iop.op.has_natural_length() {
        iop.ctx.data_length = (blocks * size) as usize;
    }
}

fn steady_state(iop: &mut DeviceIoParams) -> Advance {
    let size = iop.block_size();
    let moved = if iop.cdb_blocks != 0 {
        iop.cdb_blocks
    } else {
        (iop.ctx.data_transferred() as u64).div_ceil(size)
    };

    if iop.multiple_sources && iop.cdb_blocks != 0 && iop.saved.cdb_blocks > iop.cdb_blocks {
        iop.cdb_blocks = iop.saved.cdb_blocks;
        iop.data_blocks = iop.saved.cdb_blocks;
    }

    iop.block_count += moved;
    if iop.block_count >= iop.block_limit {
        if iop.block_count > iop.block_limit {
            warn!(
                "{}: block count {} exceeds block limit {}",
                iop.dsf(),
                iop.block_count,
                iop.block_limit
            );
        }
        end_of_data(iop);
        return Advance::EndOfData;
    }

    iop.current_lba += moved;
    let left = iop.remaining();
    if iop.data_blocks > left {
        set_next_blocks(iop, left, size);
    }

    if iop.step_value != 0 {
        iop.current_lba += iop.step_value / size;
        if iop.current_lba + iop.data_blocks > iop.ending_lba {
            end_of_data(iop);
            return Advance::EndOfData;
        }
    }

    reseed(iop);
    Advance::Continue
}

fn end_of_data(iop: &mut DeviceIoParams) {
    if iop.ctx.log.debug {
        debug!(
            "{}: end of data after {} blocks",
            iop.dsf(),
            iop.block_count
        );
    }
    iop.restore_snapshot();
}

/// Position-seeded patterns follow the current LBA.
fn reseed(iop: &mut DeviceIoParams) {
    if !iop.pattern.is_iot() {
        return;
    }
    let size = iop.block_size() as usize;
    let len = iop.ctx.data_length;
    match iop.op.direction {
        DataDirection::Write => {
            let end = len.min(iop.ctx.data.len());
            iop.pattern
                .fill(&mut iop.ctx.data[..end], size, iop.current_lba);
        },
        DataDirection::Read => {
            if let Some(expected) = iop.compare_data.as_mut() {
                if expected.len() < len {
                    expected.resize(len, 0);
                }
                iop.pattern
                    .fill(&mut expected[..len], size, iop.current_lba);
            }
        },
        DataDirection::None => {},
    }
}

/// Run the window's opcode over the whole window once: read, write or
/// no-data commands, checking read data against the expected pattern when
/// compare is on.
pub fn run_window(
    iop: &mut DeviceIoParams,
    cancel: &CancellationToken,
) -> Result<Completion, SptError> {
    advance_op(iop)?;
    let mut restarts = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Ok(Completion::Interrupted);
        }
        let fields = iop.cdb_fields();
        let len = iop.ctx.data_length;
        if issue(&mut iop.ctx, iop.op, &fields, len)? == ExecStatus::Restart {
            // Nothing to unwind for a single device: resend the same CDB.
            restarts += 1;
            if restarts > iop.ctx.recovery.retry_limit {
                return Err(SptError::RestartLimit {
                    device: iop.dsf().to_string(),
                    limit: iop.ctx.recovery.retry_limit,
                });
            }
            continue;
        }
        if iop.op.direction == DataDirection::Read && iop.compare {
            verify_read(iop)?;
        }
        if advance_op(iop)? == Advance::EndOfData {
            return Ok(Completion::Done);
        }
    }
}

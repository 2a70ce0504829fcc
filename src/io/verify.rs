// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::{
    control_block::read::READ16,
    error::SptError,
    exec::{context::CommandContext, engine::with_scratch_command, report::dump_lines},
    io::{Completion, params::DeviceIoParams},
    registry::{self, family::CdbFields},
};

const LINE: usize = 16;

/// Index of the first byte that differs, comparing the common prefix.
#[inline]
pub fn find_miscompare(expected: &[u8], received: &[u8]) -> Option<usize> {
    expected.iter().zip(received).position(|(a, b)| a != b)
}

/// Line-aligned byte range of at most `limit` bytes centred on `offset`.
/// The line holding `offset` is always part of the range.
pub fn dump_window(len: usize, offset: usize, limit: usize) -> (usize, usize) {
    let limit = (limit / LINE * LINE).max(LINE);
    let line = offset / LINE * LINE;
    let mut start = offset.saturating_sub(limit / 2) / LINE * LINE;
    if start + limit < line + LINE {
        start = line + LINE - limit;
    }
    let end = (start + limit).min(len);
    (start, end)
}

/// Where the compared data lives, for the report.
#[derive(Debug, Clone, Copy)]
pub struct CompareSite<'a> {
    pub source: &'a str,
    pub source_lba: u64,
    pub destination: &'a str,
    pub destination_lba: u64,
    pub block_size: u64,
}

/// Log a miscompare with a bounded dump of both buffers and build the
/// matching error.
pub fn report_miscompare(
    site: &CompareSite<'_>,
    expected: &[u8],
    received: &[u8],
    offset: usize,
    dump_limit: usize,
) -> SptError {
    let blocks = expected.len() as u64 / site.block_size.max(1);
    let lba = site.destination_lba + offset as u64 / site.block_size.max(1);
    error!(
        "Data miscompare at byte offset {offset} (lba {lba}): source {} lba {}..{}, \
         destination {} lba {}..{}, expected {:#04x}, received {:#04x}",
        site.source,
        site.source_lba,
        site.source_lba + blocks,
        site.destination,
        site.destination_lba,
        site.destination_lba + blocks,
        expected[offset],
        received[offset]
    );
    let (start, end) = dump_window(expected.len().min(received.len()), offset, dump_limit);
    let mark = Some(offset - start);
    error!("Expected data:");
    for line in dump_lines(&expected[start..end], start, mark) {
        error!("{line}");
    }
    error!("Received data:");
    for line in dump_lines(&received[start..end], start, mark) {
        error!("{line}");
    }
    SptError::Verify {
        source_device: site.source.to_string(),
        destination_device: site.destination.to_string(),
        offset,
        lba,
    }
}

/// Check the data of the last READ against the window's expected buffer.
pub fn verify_read(iop: &DeviceIoParams) -> Result<(), SptError> {
    let Some(expected) = iop.compare_data.as_deref() else {
        return Ok(());
    };
    let received = iop.ctx.response();
    let expected = &expected[..received.len().min(expected.len())];
    match find_miscompare(expected, received) {
        None => Ok(()),
        Some(offset) => {
            let site = CompareSite {
                source: "pattern",
                source_lba: iop.current_lba,
                destination: iop.dsf(),
                destination_lba: iop.current_lba,
                block_size: iop.block_size(),
            };
            Err(report_miscompare(&site, expected, received, offset, iop.dump_limit))
        },
    }
}

/// READ(16) `blocks` at `lba` without disturbing the current operation.
pub fn read_blocks(ctx: &mut CommandContext, lba: u64, blocks: u64) -> Result<Vec<u8>, SptError> {
    let info = registry::lookup(READ16, None, ctx.device_type)
        .ok_or_else(|| SptError::protocol(&ctx.dsf, "READ(16) not supported"))?;
    let fields = CdbFields {
        lba,
        blocks,
        ..Default::default()
    };
    let len = (blocks * ctx.device_size as u64) as usize;
    with_scratch_command(ctx, info, &fields, len, |ctx| Ok(ctx.response().to_vec()))
}

/// Read `blocks` from both devices in chunks of `chunk` blocks and compare.
#[allow(clippy::too_many_arguments)]
pub fn compare_ranges(
    src: &mut CommandContext,
    src_lba: u64,
    dst: &mut CommandContext,
    dst_lba: u64,
    blocks: u64,
    chunk: u64,
    dump_limit: usize,
    cancel: &CancellationToken,
) -> Result<Completion, SptError> {
    let chunk = chunk.max(1);
    let mut done = 0u64;
    while done < blocks {
        if cancel.is_cancelled() {
            return Ok(Completion::Interrupted);
        }
        let n = chunk.min(blocks - done);
        let expected = read_blocks(src, src_lba + done, n)?;
        let received = read_blocks(dst, dst_lba + done, n)?;
        if expected.len() != received.len() {
            return Err(SptError::protocol(
                &dst.dsf,
                format!(
                    "verify read returned {} bytes, source returned {}",
                    received.len(),
                    expected.len()
                ),
            ));
        }
        if let Some(offset) = find_miscompare(&expected, &received) {
            let site = CompareSite {
                source: &src.dsf,
                source_lba: src_lba + done,
                destination: &dst.dsf,
                destination_lba: dst_lba + done,
                block_size: dst.device_size as u64,
            };
            return Err(report_miscompare(&site, &expected, &received, offset, dump_limit));
        }
        done += n;
    }
    Ok(Completion::Done)
}

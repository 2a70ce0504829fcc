// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{control_block::token::BlockRange, models::byte_order::CodecError};

/// Split `blocks` starting at `lba` evenly across `count` descriptors, the
/// remainder going to the last one. Never emits an empty descriptor, so
/// fewer than `count` come back when `blocks < count`.
pub fn split_ranges(lba: u64, blocks: u64, count: u32) -> Result<Vec<BlockRange>, CodecError> {
    let count = (count.max(1) as u64).min(blocks);
    if count == 0 {
        return Ok(Vec::new());
    }
    let per = blocks / count;
    let mut out = Vec::with_capacity(count as usize);
    let mut next = lba;
    for i in 0..count {
        let n = if i + 1 == count { lba + blocks - next } else { per };
        let n = u32::try_from(n).map_err(|_| CodecError::Overflow { value: n, width: 4 })?;
        out.push(BlockRange {
            lba: next,
            blocks: n,
        });
        next += n as u64;
    }
    Ok(out)
}

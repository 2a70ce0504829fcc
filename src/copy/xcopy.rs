// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! EXTENDED COPY (LID1) planning: one identification target per device and
//! block to block segments spread round-robin over the sources.

use bytes::BytesMut;

use crate::{
    control_block::extended_copy::{
        BlockSegment, CopyTarget, Lid1Flags, MAX_SEGMENT_BLOCKS, encode_extended_copy_lid1,
    },
    copy::operation::OperationSet,
    error::SptError,
    io::{
        params::DeviceIoParams,
        window::{Advance, advance_op},
    },
};

/// Segments of one EXTENDED COPY and the blocks each source contributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentPlan {
    pub segments: Vec<BlockSegment>,
    pub per_source: Vec<u64>,
    pub total: u64,
}

/// Fill up to `segment_count` segments from the sources' current windows,
/// never more than the destination takes in one CDB.
pub fn plan_segments(
    sources: &[DeviceIoParams],
    exhausted: &[bool],
    dst: &DeviceIoParams,
    segment_count: u32,
) -> SegmentPlan {
    let dst_index = sources.len() as u16;
    let mut plan = SegmentPlan {
        segments: Vec::with_capacity(segment_count as usize),
        per_source: vec![0; sources.len()],
        total: 0,
    };
    let mut budget = dst.data_blocks.min(dst.remaining());
    let mut cursor = 0usize;

    while budget > 0 && plan.segments.len() < segment_count as usize {
        let next = (0..sources.len())
            .map(|k| (cursor + k) % sources.len())
            .find(|&i| {
                !exhausted.get(i).copied().unwrap_or(false)
                    && sources[i].remaining() > plan.per_source[i]
            });
        let Some(i) = next else {
            break;
        };
        let src = &sources[i];
        let avail = src.remaining() - plan.per_source[i];
        let blocks = MAX_SEGMENT_BLOCKS.min(avail).min(budget);
        plan.segments.push(BlockSegment {
            src_index: i as u16,
            dst_index,
            blocks: blocks as u16,
            src_lba: src.current_lba + plan.per_source[i],
            dst_lba: dst.current_lba + plan.total,
        });
        plan.per_source[i] += blocks;
        plan.total += blocks;
        budget -= blocks;
        cursor = i + 1;
    }
    plan
}

/// Identification targets: sources in order, destination last.
pub fn copy_targets(set: &OperationSet) -> Result<Vec<CopyTarget<'_>>, SptError> {
    set.sources
        .iter()
        .chain(std::iter::once(&set.destination))
        .map(|iop| {
            let designator = iop.caps.designator.as_ref().ok_or_else(|| {
                SptError::protocol(iop.dsf(), "no designator for EXTENDED COPY target")
            })?;
            Ok(CopyTarget {
                device_type: iop.ctx.device_type,
                designator,
                block_length: iop.ctx.device_size,
            })
        })
        .collect()
}

/// The LID1 parameter list for `plan`.
pub fn encode_plan(
    set: &OperationSet,
    list_identifier: u32,
    plan: &SegmentPlan,
) -> Result<BytesMut, SptError> {
    let targets = copy_targets(set)?;
    Ok(encode_extended_copy_lid1(
        (list_identifier & 0xFF) as u8,
        Lid1Flags::empty(),
        &targets,
        &plan.segments,
    )?)
}

/// Move every window by what `plan` copied. Returns `EndOfData` when the
/// destination is full or no source has data left.
pub fn apply_plan(
    set: &mut OperationSet,
    exhausted: &mut [bool],
    plan: &SegmentPlan,
) -> Result<Advance, SptError> {
    for (i, src) in set.sources.iter_mut().enumerate() {
        let moved = plan.per_source[i];
        if moved == 0 {
            continue;
        }
        src.cdb_blocks = moved;
        if advance_op(src)? == Advance::EndOfData {
            exhausted[i] = true;
        }
    }
    set.destination.cdb_blocks = plan.total;
    let dst_end = advance_op(&mut set.destination)? == Advance::EndOfData;
    if dst_end || exhausted.iter().all(|&e| e) {
        return Ok(Advance::EndOfData);
    }
    Ok(Advance::Continue)
}

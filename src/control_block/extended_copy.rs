// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! EXTENDED COPY (LID1) CDB and parameter list.
//!
//! Parameter list:
//!   [0]      LIST IDENTIFIER
//!   [1]      STR | NRCR | NLID | PRIORITY
//!   [2..4]   CSCD DESCRIPTOR LIST LENGTH
//!   [8..12]  SEGMENT DESCRIPTOR LIST LENGTH
//!   [12..16] INLINE DATA LENGTH
//!   [16..]   CSCD descriptors, then segment descriptors

use bitflags::bitflags;
use bytes::{BufMut, BytesMut};

use crate::{
    control_block::{
        inquiry::Designator,
        token::{SA_EXTENDED_COPY_LID1, THIRD_PARTY_COPY_OUT},
    },
    models::byte_order::CodecError,
};

pub const LID1_HEADER_LEN: usize = 16;
pub const CSCD_IDENTIFICATION: u8 = 0xE4;
pub const CSCD_DESC_LEN: usize = 32;
/// Designator bytes available inside an identification CSCD.
pub const CSCD_DESIGNATOR_MAX: usize = 20;
pub const SEGMENT_BLOCK_TO_BLOCK: u8 = 0x02;
pub const B2B_SEGMENT_LEN: usize = 28;
/// DESCRIPTOR LENGTH of a block to block segment (bytes after byte 3).
pub const B2B_SEGMENT_DESC_LEN: u16 = 0x18;
/// NUMBER OF BLOCKS is 16 bits wide in a block to block segment.
pub const MAX_SEGMENT_BLOCKS: u64 = 0xFFFF;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Lid1Flags: u8 {
        const PRIORITY = 0x07;
        /// No list identifier: the target keeps no copy results.
        const NLID = 0x08;
        const NRCR = 0x10;
        /// Sequential striped.
        const STR = 0x20;
    }
}

/// One copy source or destination (an identification CSCD).
#[derive(Debug, Clone)]
pub struct CopyTarget<'a> {
    pub device_type: u8,
    pub designator: &'a Designator,
    pub block_length: u32,
}

/// One block to block segment descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSegment {
    pub src_index: u16,
    pub dst_index: u16,
    pub blocks: u16,
    pub src_lba: u64,
    pub dst_lba: u64,
}

#[inline]
pub fn build_extended_copy_cdb(cdb: &mut [u8; 16], param_len: u32, control: u8) {
    cdb.fill(0);
    cdb[0] = THIRD_PARTY_COPY_OUT;
    cdb[1] = SA_EXTENDED_COPY_LID1;
    cdb[10..14].copy_from_slice(&param_len.to_be_bytes());
    cdb[15] = control;
}

fn put_identification_cscd(buf: &mut BytesMut, t: &CopyTarget<'_>) -> Result<(), CodecError> {
    let id = &t.designator.id;
    if id.len() > CSCD_DESIGNATOR_MAX {
        return Err(CodecError::Overflow {
            value: id.len() as u64,
            width: CSCD_DESIGNATOR_MAX,
        });
    }
    if t.block_length > 0x00FF_FFFF {
        return Err(CodecError::Overflow {
            value: t.block_length as u64,
            width: 3,
        });
    }
    buf.put_u8(CSCD_IDENTIFICATION);
    buf.put_u8(t.device_type & 0x1F);
    buf.put_u16(0); // relative initiator port identifier
    buf.put_u8(t.designator.code_set & 0x0F);
    buf.put_u8(((t.designator.association & 0x03) << 4) | (t.designator.designator_type & 0x0F));
    buf.put_u8(0);
    buf.put_u8(id.len() as u8);
    buf.put_slice(id);
    buf.put_bytes(0, CSCD_DESIGNATOR_MAX - id.len());
    // device type specific parameters: byte 28 flags, 29..32 DISK BLOCK LENGTH
    buf.put_u8(0);
    buf.put_uint(t.block_length as u64, 3);
    Ok(())
}

fn put_block_segment(buf: &mut BytesMut, s: &BlockSegment) {
    buf.put_u8(SEGMENT_BLOCK_TO_BLOCK);
    buf.put_u8(0); // DC | CAT
    buf.put_u16(B2B_SEGMENT_DESC_LEN);
    buf.put_u16(s.src_index);
    buf.put_u16(s.dst_index);
    buf.put_u16(0);
    buf.put_u16(s.blocks);
    buf.put_u64(s.src_lba);
    buf.put_u64(s.dst_lba);
}

/// Encode a complete LID1 parameter list: one identification CSCD per
/// target, followed by the block to block segments.
pub fn encode_extended_copy_lid1(
    list_id: u8,
    flags: Lid1Flags,
    targets: &[CopyTarget<'_>],
    segments: &[BlockSegment],
) -> Result<BytesMut, CodecError> {
    let cscd_len = targets.len() * CSCD_DESC_LEN;
    let seg_len = segments.len() * B2B_SEGMENT_LEN;
    let cscd_len = u16::try_from(cscd_len).map_err(|_| CodecError::Overflow {
        value: cscd_len as u64,
        width: 2,
    })?;

    let mut buf = BytesMut::with_capacity(LID1_HEADER_LEN + cscd_len as usize + seg_len);
    buf.put_u8(list_id);
    buf.put_u8(flags.bits());
    buf.put_u16(cscd_len);
    buf.put_u32(0);
    buf.put_u32(seg_len as u32);
    buf.put_u32(0); // inline data length
    for t in targets {
        put_identification_cscd(&mut buf, t)?;
    }
    for s in segments {
        put_block_segment(&mut buf, s);
    }
    Ok(buf)
}

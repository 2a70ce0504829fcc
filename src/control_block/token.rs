// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! POPULATE TOKEN / WRITE USING TOKEN (THIRD-PARTY COPY OUT, SBC-3).
//!
//! Both commands share the CDB layout:
//!   [0]      = 0x83
//!   [1]      = service action (0x10 PT, 0x11 WUT)
//!   [6..10]  = LIST IDENTIFIER
//!   [10..14] = PARAMETER LIST LENGTH
//!   [14]     = GROUP NUMBER
//!   [15]     = CONTROL

use bitflags::bitflags;
use bytes::{BufMut, BytesMut};

use crate::models::byte_order::CodecError;

pub const THIRD_PARTY_COPY_OUT: u8 = 0x83;
pub const SA_EXTENDED_COPY_LID1: u8 = 0x00;
pub const SA_POPULATE_TOKEN: u8 = 0x10;
pub const SA_WRITE_USING_TOKEN: u8 = 0x11;

pub const ROD_TOKEN_LENGTH: usize = 512;
pub const RANGE_DESCRIPTOR_LEN: usize = 16;
pub const POPULATE_TOKEN_HEADER_LEN: usize = 16;
/// Header, token, 6 reserved bytes and the range list length.
pub const WRITE_USING_TOKEN_HEADER_LEN: usize = 16 + ROD_TOKEN_LENGTH + 8;

/// ROD TYPE 0: the copy manager picks the token type.
pub const ROD_TYPE_DEFAULT: u32 = 0x0000_0000;
/// Block device zero ROD token type (SBC-3).
pub const ZERO_ROD_TOKEN_TYPE: u32 = 0xFFFF_0001;
/// ROD TOKEN LENGTH carried inside a zero token (bytes after the 8-byte head).
pub const ZERO_ROD_TOKEN_LENGTH: u16 = 0x01F8;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PopulateTokenFlags: u8 {
        const IMMED = 0x01;
        /// ROD TYPE field is valid.
        const RTV = 0x02;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WriteUsingTokenFlags: u8 {
        const IMMED = 0x01;
        /// Delete the token once the write completes.
        const DEL_TKN = 0x02;
    }
}

/// One block device range descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockRange {
    pub lba: u64,
    pub blocks: u32,
}

fn build_copy_out_cdb(
    cdb: &mut [u8; 16],
    service_action: u8,
    list_id: u32,
    param_len: u32,
    control: u8,
) {
    cdb.fill(0);
    cdb[0] = THIRD_PARTY_COPY_OUT;
    cdb[1] = service_action & 0x1F;
    cdb[6..10].copy_from_slice(&list_id.to_be_bytes());
    cdb[10..14].copy_from_slice(&param_len.to_be_bytes());
    cdb[15] = control;
}

#[inline]
pub fn build_populate_token_cdb(cdb: &mut [u8; 16], list_id: u32, param_len: u32, control: u8) {
    build_copy_out_cdb(cdb, SA_POPULATE_TOKEN, list_id, param_len, control)
}

#[inline]
pub fn build_write_using_token_cdb(
    cdb: &mut [u8; 16],
    list_id: u32,
    param_len: u32,
    control: u8,
) {
    build_copy_out_cdb(cdb, SA_WRITE_USING_TOKEN, list_id, param_len, control)
}

fn range_list_len(ranges: &[BlockRange]) -> Result<u16, CodecError> {
    let len = ranges.len() * RANGE_DESCRIPTOR_LEN;
    u16::try_from(len).map_err(|_| CodecError::Overflow {
        value: len as u64,
        width: 2,
    })
}

fn put_ranges(buf: &mut BytesMut, ranges: &[BlockRange]) {
    for r in ranges {
        buf.put_u64(r.lba);
        buf.put_u32(r.blocks);
        buf.put_u32(0);
    }
}

/// POPULATE TOKEN parameter list:
/// - [0..2]   DATA LENGTH (bytes that follow)
/// - [2]      RTV (bit 1) | IMMED (bit 0)
/// - [4..8]   INACTIVITY TIMEOUT (seconds)
/// - [8..12]  ROD TYPE
/// - [14..16] BLOCK DEVICE RANGE DESCRIPTOR LENGTH
/// - [16..]   range descriptors (LBA, NUMBER OF LOGICAL BLOCKS, reserved)
pub fn encode_populate_token(
    flags: PopulateTokenFlags,
    inactivity_timeout: u32,
    rod_type: u32,
    ranges: &[BlockRange],
) -> Result<BytesMut, CodecError> {
    let list_len = range_list_len(ranges)?;
    let total = POPULATE_TOKEN_HEADER_LEN + list_len as usize;
    let mut buf = BytesMut::with_capacity(total);
    buf.put_u16((total - 2) as u16);
    buf.put_u8(flags.bits());
    buf.put_u8(0);
    buf.put_u32(inactivity_timeout);
    buf.put_u32(rod_type);
    buf.put_u16(0);
    buf.put_u16(list_len);
    put_ranges(&mut buf, ranges);
    Ok(buf)
}

/// WRITE USING TOKEN parameter list:
/// - [0..2]     DATA LENGTH (bytes that follow)
/// - [2]        DEL_TKN (bit 1) | IMMED (bit 0)
/// - [8..16]    OFFSET INTO ROD (blocks)
/// - [16..528]  ROD TOKEN
/// - [534..536] BLOCK DEVICE RANGE DESCRIPTOR LENGTH
/// - [536..]    range descriptors
pub fn encode_write_using_token(
    flags: WriteUsingTokenFlags,
    offset_into_rod: u64,
    token: &[u8],
    ranges: &[BlockRange],
) -> Result<BytesMut, CodecError> {
    if token.len() != ROD_TOKEN_LENGTH {
        return Err(CodecError::Unexpected {
            what: "ROD token length",
            value: token.len() as u64,
        });
    }
    let list_len = range_list_len(ranges)?;
    let total = WRITE_USING_TOKEN_HEADER_LEN + list_len as usize;
    let data_len = u16::try_from(total - 2).map_err(|_| CodecError::Overflow {
        value: (total - 2) as u64,
        width: 2,
    })?;
    let mut buf = BytesMut::with_capacity(total);
    buf.put_u16(data_len);
    buf.put_u8(flags.bits());
    buf.put_bytes(0, 5);
    buf.put_u64(offset_into_rod);
    buf.put_slice(token);
    buf.put_bytes(0, 6);
    buf.put_u16(list_len);
    put_ranges(&mut buf, ranges);
    Ok(buf)
}

/// A block device zero ROD token: the destination fills the ranges with
/// zeroes and no source is read.
pub fn zero_rod_token() -> Vec<u8> {
    let mut token = Vec::with_capacity(ROD_TOKEN_LENGTH);
    token.put_u32(ZERO_ROD_TOKEN_TYPE);
    token.put_u16(0);
    token.put_u16(ZERO_ROD_TOKEN_LENGTH);
    token.resize(ROD_TOKEN_LENGTH, 0);
    token
}

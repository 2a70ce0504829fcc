// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    control_block::lba::{fill_lba_cdb6, fill_lba_cdb10, fill_lba_cdb16},
    models::byte_order::CodecError,
};

pub const READ6: u8 = 0x08;
pub const READ10: u8 = 0x28;
pub const READ16: u8 = 0x88;
pub const VERIFY10: u8 = 0x2F;
pub const VERIFY16: u8 = 0x8F;

/// Build a **SCSI READ(6)** CDB.
///
/// - `lba`    : 21-bit Logical Block Address
/// - `blocks` : 1..=256 (256 is sent as 0)
#[inline]
pub fn build_read6(
    cdb: &mut [u8; 16],
    lba: u64,
    blocks: u64,
    control: u8,
) -> Result<(), CodecError> {
    fill_lba_cdb6(cdb, READ6, lba, blocks, control)
}

/// Build a **SCSI READ(10)** CDB.
///
/// Parameters:
/// - `lba`     : 32-bit Logical Block Address to start reading from
/// - `blocks`  : number of logical blocks to transfer (16-bit)
/// - `flags`   : RDPROTECT[7:5] | DPO[4] | FUA[3] (other bits are cleared)
/// - `control` : CONTROL byte
#[inline]
pub fn build_read10(
    cdb: &mut [u8; 16],
    lba: u64,
    blocks: u64,
    flags: u8,
    control: u8,
) -> Result<(), CodecError> {
    fill_lba_cdb10(cdb, READ10, flags & 0b1111_1000, lba, blocks, control)
}

/// Build a **SCSI READ(16)** CDB.
///
/// `blocks` is 32-bit on the wire; 0 means no data is moved.
#[inline]
pub fn build_read16(
    cdb: &mut [u8; 16],
    lba: u64,
    blocks: u64,
    flags: u8,
    control: u8,
) -> Result<(), CodecError> {
    fill_lba_cdb16(cdb, READ16, flags & 0b1111_1000, lba, blocks, control)
}

/// Build a **VERIFY(10)** CDB. `bytchk` asks the target to compare against
/// data sent by the initiator instead of only checking the medium.
#[inline]
pub fn build_verify10(
    cdb: &mut [u8; 16],
    lba: u64,
    blocks: u64,
    bytchk: bool,
    control: u8,
) -> Result<(), CodecError> {
    let flags = if bytchk { 0x02 } else { 0x00 };
    fill_lba_cdb10(cdb, VERIFY10, flags, lba, blocks, control)
}

#[inline]
pub fn build_verify16(
    cdb: &mut [u8; 16],
    lba: u64,
    blocks: u64,
    bytchk: bool,
    control: u8,
) -> Result<(), CodecError> {
    let flags = if bytchk { 0x02 } else { 0x00 };
    fill_lba_cdb16(cdb, VERIFY16, flags, lba, blocks, control)
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    control_block::lba::{fill_lba_cdb6, fill_lba_cdb10, fill_lba_cdb16},
    models::byte_order::CodecError,
};

pub const WRITE6: u8 = 0x0A;
pub const WRITE10: u8 = 0x2A;
pub const WRITE16: u8 = 0x8A;
pub const WRITE_VERIFY10: u8 = 0x2E;
pub const WRITE_VERIFY16: u8 = 0x8E;
pub const WRITE_SAME10: u8 = 0x41;
pub const WRITE_SAME16: u8 = 0x93;

/// WRITE SAME(16) NUMBER OF LOGICAL BLOCKS used when the caller does not ask
/// for a specific count.
pub const WRITE_SAME_DEFAULT_BLOCKS: u64 = 0xFFFF;

#[inline]
pub fn build_write6(
    cdb: &mut [u8; 16],
    lba: u64,
    blocks: u64,
    control: u8,
) -> Result<(), CodecError> {
    fill_lba_cdb6(cdb, WRITE6, lba, blocks, control)
}

/// Build a **SCSI WRITE(10)** CDB.
///
/// - `flags` : WRPROTECT[7:5] | DPO[4] | FUA[3] | FUA_NV[1]
#[inline]
pub fn build_write10(
    cdb: &mut [u8; 16],
    lba: u64,
    blocks: u64,
    flags: u8,
    control: u8,
) -> Result<(), CodecError> {
    fill_lba_cdb10(cdb, WRITE10, flags & 0b1111_1010, lba, blocks, control)
}

/// Build a **SCSI WRITE(16)** CDB.
///
/// - `flags` : WRPROTECT[7:5] | DPO[4] | FUA[3]
#[inline]
pub fn build_write16(
    cdb: &mut [u8; 16],
    lba: u64,
    blocks: u64,
    flags: u8,
    control: u8,
) -> Result<(), CodecError> {
    fill_lba_cdb16(cdb, WRITE16, flags & 0b1111_1000, lba, blocks, control)
}

/// Build a **WRITE SAME(16)** CDB. The data-out buffer carries a single
/// logical block which the target replicates over `blocks` blocks.
///
/// - `unmap` : byte 1 bit 3, lets a thin provisioned target deallocate
#[inline]
pub fn build_write_same16(
    cdb: &mut [u8; 16],
    lba: u64,
    blocks: u64,
    unmap: bool,
    control: u8,
) -> Result<(), CodecError> {
    let flags = if unmap { 0x08 } else { 0x00 };
    fill_lba_cdb16(cdb, WRITE_SAME16, flags, lba, blocks, control)
}

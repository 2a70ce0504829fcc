// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Shared LBA + TRANSFER LENGTH layouts used by the block I/O CDBs
//! (READ, WRITE, VERIFY, WRITE AND VERIFY, WRITE SAME).
//!
//! All fillers take the 16-byte CDB scratch area, zero it and write only the
//! bytes of the requested size. Values that do not fit the field are
//! rejected instead of silently truncated.

use crate::models::byte_order::{CodecError, get_be, put_be};

/// Highest LBA addressable by a 6-byte CDB (21 bits).
pub const MAX_LBA_6: u64 = 0x1F_FFFF;
/// Largest transfer of a 6-byte CDB (length byte 0 means 256 blocks).
pub const MAX_BLOCKS_6: u64 = 256;
pub const MAX_LBA_10: u64 = 0xFFFF_FFFF;
pub const MAX_BLOCKS_10: u64 = 0xFFFF;
pub const MAX_LBA_16: u64 = u64::MAX;
pub const MAX_BLOCKS_16: u64 = 0xFFFF_FFFF;

/// 6-byte layout:
/// - byte 0      : OPERATION CODE
/// - bytes 1..3  : LBA (21 bits, upper 3 bits of byte 1 reserved)
/// - byte 4      : TRANSFER LENGTH (0 => 256 blocks)
/// - byte 5      : CONTROL
pub fn fill_lba_cdb6(
    cdb: &mut [u8; 16],
    opcode: u8,
    lba: u64,
    blocks: u64,
    control: u8,
) -> Result<(), CodecError> {
    if lba > MAX_LBA_6 {
        return Err(CodecError::Overflow {
            value: lba,
            width: 3,
        });
    }
    if blocks > MAX_BLOCKS_6 {
        return Err(CodecError::Overflow {
            value: blocks,
            width: 1,
        });
    }
    cdb.fill(0);
    cdb[0] = opcode;
    put_be(cdb, 1, 3, lba)?;
    // 256 is encoded as zero
    cdb[4] = (blocks & 0xFF) as u8;
    cdb[5] = control;
    Ok(())
}

/// 10-byte layout:
/// - byte 0      : OPERATION CODE
/// - byte 1      : protect / DPO / FUA flags
/// - bytes 2..5  : LBA (big-endian, 32-bit)
/// - byte 6      : GROUP NUMBER (kept 0)
/// - bytes 7..8  : TRANSFER LENGTH (big-endian, 16-bit)
/// - byte 9      : CONTROL
pub fn fill_lba_cdb10(
    cdb: &mut [u8; 16],
    opcode: u8,
    flags: u8,
    lba: u64,
    blocks: u64,
    control: u8,
) -> Result<(), CodecError> {
    cdb.fill(0);
    cdb[0] = opcode;
    cdb[1] = flags;
    put_be(cdb, 2, 4, lba)?;
    put_be(cdb, 7, 2, blocks)?;
    cdb[9] = control;
    Ok(())
}

/// 16-byte layout:
/// - byte  0      : OPERATION CODE
/// - byte  1      : protect / DPO / FUA flags
/// - bytes 2..9   : LBA (big-endian, 64-bit)
/// - bytes 10..13 : TRANSFER LENGTH (big-endian, 32-bit)
/// - byte  14     : GROUP NUMBER (kept 0)
/// - byte  15     : CONTROL
pub fn fill_lba_cdb16(
    cdb: &mut [u8; 16],
    opcode: u8,
    flags: u8,
    lba: u64,
    blocks: u64,
    control: u8,
) -> Result<(), CodecError> {
    cdb.fill(0);
    cdb[0] = opcode;
    cdb[1] = flags;
    put_be(cdb, 2, 8, lba)?;
    put_be(cdb, 10, 4, blocks)?;
    cdb[15] = control;
    Ok(())
}

/// Reads back the LBA and block count of a CDB built by one of the
/// fillers above, keyed by the CDB length.
pub fn decode_lba_blocks(cdb: &[u8], cdb_len: usize) -> Result<(u64, u64), CodecError> {
    match cdb_len {
        6 => {
            let lba = get_be(cdb, 1, 3)? & MAX_LBA_6;
            let blocks = match get_be(cdb, 4, 1)? {
                0 => MAX_BLOCKS_6,
                n => n,
            };
            Ok((lba, blocks))
        },
        10 => Ok((get_be(cdb, 2, 4)?, get_be(cdb, 7, 2)?)),
        16 => Ok((get_be(cdb, 2, 8)?, get_be(cdb, 10, 4)?)),
        other => Err(CodecError::Width(other)),
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn six_byte_encodes_256_as_zero() {
        let mut cdb = [0u8; 16];
        fill_lba_cdb6(&mut cdb, 0x08, 0x12_3456, 256, 0).expect("fill");
        assert_eq!(&cdb[..6], &hex!("08 12 34 56 00 00"));
        assert_eq!(decode_lba_blocks(&cdb, 6).expect("decode"), (0x12_3456, 256));
    }

    #[test]
    fn six_byte_rejects_wide_lba() {
        let mut cdb = [0u8; 16];
        assert!(fill_lba_cdb6(&mut cdb, 0x08, 0x20_0000, 1, 0).is_err());
    }

    #[test]
    fn ten_byte_rejects_wide_lba() {
        let mut cdb = [0u8; 16];
        assert!(fill_lba_cdb10(&mut cdb, 0x28, 0, 0x1_0000_0000, 1, 0).is_err());
        assert!(fill_lba_cdb10(&mut cdb, 0x28, 0, 0, 0x1_0000, 0).is_err());
    }

    #[test]
    fn sixteen_byte_layout() {
        let mut cdb = [0u8; 16];
        fill_lba_cdb16(&mut cdb, 0x8A, 0x08, 0x0102_0304_0506_0708, 0x10, 0x00)
            .expect("fill");
        assert_eq!(cdb, hex!("8A 08 01 02 03 04 05 06 07 08 00 00 00 10 00 00"));
    }
}

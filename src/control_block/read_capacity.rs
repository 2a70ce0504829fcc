// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zerocopy::{
    FromBytes, Immutable, KnownLayout,
    byteorder::{BigEndian, U16, U32, U64},
};

use crate::models::byte_order::CodecError;

pub const READ_CAPACITY10: u8 = 0x25;
pub const SERVICE_ACTION_IN16: u8 = 0x9E;
pub const SA_READ_CAPACITY16: u8 = 0x10;

/// Parameter data length returned by READ CAPACITY(10).
pub const RC10_DATA_LEN: usize = 8;
/// Full parameter data length requested from READ CAPACITY(16).
pub const RC16_DATA_LEN: usize = 32;

/// Build a **READ CAPACITY(10)** CDB (opcode 0x25) asking for the last LBA
/// of the medium (PMI = 0).
#[inline]
pub fn build_read_capacity10(cdb: &mut [u8; 16], control: u8) {
    cdb.fill(0);
    cdb[0] = READ_CAPACITY10;
    cdb[9] = control;
}

/// Build a **READ CAPACITY(16)** CDB via SERVICE ACTION IN(16)
/// (opcode 0x9E, SA = 0x10).
///
/// - `alloc_len` : allocation length, use [`RC16_DATA_LEN`] to get the
///   provisioning bits as well.
#[inline]
pub fn build_read_capacity16(cdb: &mut [u8; 16], alloc_len: u32, control: u8) {
    cdb.fill(0);
    cdb[0] = SERVICE_ACTION_IN16;
    cdb[1] = SA_READ_CAPACITY16;
    cdb[10..14].copy_from_slice(&alloc_len.to_be_bytes());
    cdb[15] = control;
}

/// Raw 8-byte parameter data returned by READ CAPACITY(10).
#[repr(C)]
#[derive(FromBytes, KnownLayout, Immutable, Debug)]
pub struct Rc10Raw {
    /// Last logical block address (bytes 0-3).
    pub max_lba: U32<BigEndian>,
    /// Logical block length in bytes (bytes 4-7).
    pub block_len: U32<BigEndian>,
}

/// Leading 16 bytes of READ CAPACITY(16) parameter data.
#[repr(C)]
#[derive(FromBytes, KnownLayout, Immutable, Debug)]
pub struct Rc16Raw {
    /// Last logical block address (bytes 0-7).
    pub max_lba: U64<BigEndian>,
    /// Logical block length in bytes (bytes 8-11).
    pub block_len: U32<BigEndian>,
    /// P_TYPE / PROT_EN (byte 12).
    pub protection: u8,
    /// P_I_EXPONENT / LOGICAL BLOCKS PER PHYSICAL BLOCK EXPONENT (byte 13).
    pub exponents: u8,
    /// LBPME (bit 15), LBPRZ (bit 14), LOWEST ALIGNED LBA (bits 13..0).
    pub provisioning: U16<BigEndian>,
}

/// Capacity as the rest of the crate consumes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capacity {
    pub last_lba: u64,
    pub block_length: u32,
    /// Logical block provisioning management enabled (thin provisioned).
    pub lbpme: bool,
    /// Unmapped blocks read back as zeroes.
    pub lbprz: bool,
}

impl Capacity {
    /// Number of addressable blocks (last LBA + 1).
    #[inline]
    pub fn blocks(&self) -> u64 {
        self.last_lba.saturating_add(1)
    }
}

impl Rc10Raw {
    /// If true, the target needs READ CAPACITY(16) to report its size.
    #[inline]
    pub fn indicates_overflow(&self) -> bool {
        self.max_lba == u32::MAX
    }
}

impl Rc16Raw {
    #[inline]
    pub fn lbpme(&self) -> bool {
        self.provisioning.get() & 0x8000 != 0
    }

    #[inline]
    pub fn lbprz(&self) -> bool {
        self.provisioning.get() & 0x4000 != 0
    }
}

/// Parse READ CAPACITY(10) parameter data (needs ≥ 8 bytes).
pub fn parse_read_capacity10(buf: &[u8]) -> Result<Capacity, CodecError> {
    let (raw, _rest) = Rc10Raw::ref_from_prefix(buf).map_err(|_| CodecError::OutOfBounds {
        offset: 0,
        width: RC10_DATA_LEN,
        len: buf.len(),
    })?;
    Ok(Capacity {
        last_lba: raw.max_lba.get() as u64,
        block_length: raw.block_len.get(),
        lbpme: false,
        lbprz: false,
    })
}

/// Parse READ CAPACITY(16) parameter data (needs ≥ 16 bytes).
pub fn parse_read_capacity16(buf: &[u8]) -> Result<Capacity, CodecError> {
    let (raw, _rest) = Rc16Raw::ref_from_prefix(buf).map_err(|_| CodecError::OutOfBounds {
        offset: 0,
        width: size_of::<Rc16Raw>(),
        len: buf.len(),
    })?;
    Ok(Capacity {
        last_lba: raw.max_lba.get(),
        block_length: raw.block_len.get(),
        lbpme: raw.lbpme(),
        lbprz: raw.lbprz(),
    })
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn rc16_cdb_layout() {
        let mut cdb = [0u8; 16];
        build_read_capacity16(&mut cdb, RC16_DATA_LEN as u32, 0);
        assert_eq!(cdb, hex!("9E 10 00 00 00 00 00 00 00 00 00 00 00 20 00 00"));
    }

    #[test]
    fn rc10_parse_and_overflow_hint() {
        let cap = parse_read_capacity10(&hex!("00 00 03 FF 00 00 02 00")).expect("rc10");
        assert_eq!(cap.blocks(), 1024);
        assert_eq!(cap.block_length, 512);

        let (raw, _) = Rc10Raw::ref_from_prefix(&hex!("FF FF FF FF 00 00 02 00")[..])
            .expect("layout");
        assert!(raw.indicates_overflow());
    }

    #[test]
    fn rc16_provisioning_bits() {
        let mut buf = [0u8; 32];
        buf[..16].copy_from_slice(&hex!("00 00 00 01 00 00 00 00 00 00 10 00 00 00 C0 00"));
        let cap = parse_read_capacity16(&buf).expect("rc16");
        assert_eq!(cap.last_lba, 0x1_0000_0000);
        assert_eq!(cap.block_length, 4096);
        assert!(cap.lbpme && cap.lbprz);
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert!(parse_read_capacity10(&[0u8; 7]).is_err());
        assert!(parse_read_capacity16(&[0u8; 12]).is_err());
    }
}

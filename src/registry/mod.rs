// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Immutable opcode metadata, looked up by `(opcode, subcode)` and filtered
//! by the peripheral device type.

use std::collections::HashMap;

use bitflags::bitflags;
use once_cell::sync::Lazy;

use crate::{
    control_block::inquiry::INQUIRY_OPCODE,
    models::{byte_order::CodecError, common::DataDirection},
    registry::{
        family::{Cdb, CdbCodec, CdbFields, OpcodeFamily, Response},
        table::OPCODES,
    },
};

pub mod family;
pub mod table;

bitflags! {
    /// One bit per SCSI peripheral device type (bit n = type n).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceMask: u32 {
        const DIRECT_ACCESS = 1 << 0x00;
        const SEQUENTIAL_ACCESS = 1 << 0x01;
        const PROCESSOR = 1 << 0x03;
        const CD_DVD = 1 << 0x05;
        const OPTICAL_MEMORY = 1 << 0x07;
        const MEDIUM_CHANGER = 1 << 0x08;
        const STORAGE_ARRAY = 1 << 0x0C;
        const ENCLOSURE = 1 << 0x0D;
        const SIMPLIFIED_DIRECT_ACCESS = 1 << 0x0E;
    }
}

impl DeviceMask {
    #[inline]
    pub fn from_device_type(device_type: u8) -> Self {
        Self::from_bits_retain(1u32.checked_shl((device_type & 0x1F) as u32).unwrap_or(0))
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpcodeFlags: u8 {
        /// The data-out buffer is not `blocks * block size` (WRITE SAME,
        /// copy parameter lists); the window never synthesizes a length.
        const NO_NATURAL_LENGTH = 0x01;
        /// Third-party copy command moving data between devices.
        const COPY = 0x02;
    }
}

/// Static metadata of one opcode (or opcode + service action / page).
#[derive(Debug, Clone, Copy)]
pub struct OpcodeInfo {
    pub opcode: u8,
    pub subcode: Option<u8>,
    pub name: &'static str,
    pub direction: DataDirection,
    pub device_mask: DeviceMask,
    /// Blocks per CDB when the caller gives no explicit count; 0 means the
    /// transfer length decides.
    pub default_blocks: u64,
    pub flags: OpcodeFlags,
    pub family: OpcodeFamily,
}

impl OpcodeInfo {
    #[inline]
    pub fn build_cdb(&self, fields: &CdbFields) -> Result<Cdb, CodecError> {
        self.family.build_cdb(self, fields)
    }

    #[inline]
    pub fn parse_response(&self, data: &[u8]) -> Result<Response, CodecError> {
        self.family.parse_response(self, data)
    }

    #[inline]
    pub fn max_lba(&self) -> u64 {
        self.family.max_lba()
    }

    #[inline]
    pub fn max_blocks(&self) -> u64 {
        self.family.max_blocks()
    }

    #[inline]
    pub fn has_natural_length(&self) -> bool {
        !self.flags.contains(OpcodeFlags::NO_NATURAL_LENGTH)
    }
}

type Key = (u8, Option<u8>);

static INDEX: Lazy<HashMap<Key, Vec<&'static OpcodeInfo>>> = Lazy::new(|| {
    let mut m: HashMap<Key, Vec<&'static OpcodeInfo>> = HashMap::with_capacity(OPCODES.len());
    for info in OPCODES {
        m.entry((info.opcode, info.subcode)).or_default().push(info);
    }
    m
});

/// Look up an opcode entry. An exact `(opcode, subcode)` match wins, then the
/// opcode-only entry; both are filtered by `device_type`.
pub fn lookup(opcode: u8, subcode: Option<u8>, device_type: u8) -> Option<&'static OpcodeInfo> {
    let mask = DeviceMask::from_device_type(device_type);
    let pick = |key: Key| {
        INDEX
            .get(&key)
            .and_then(|v| v.iter().copied().find(|i| i.device_mask.intersects(mask)))
    };
    subcode
        .and_then(|_| pick((opcode, subcode)))
        .or_else(|| pick((opcode, None)))
}

/// Subcode carried by a CDB: the VPD page for INQUIRY with EVPD set, the
/// service action for opcodes that have one.
pub fn cdb_subcode(cdb: &[u8]) -> Option<u8> {
    let op = *cdb.first()?;
    match op {
        INQUIRY_OPCODE if cdb.get(1)? & 0x01 != 0 => cdb.get(2).copied(),
        // THIRD-PARTY COPY OUT/IN, MAINTENANCE IN/OUT, PR IN/OUT,
        // SERVICE ACTION IN/OUT(16)
        0x83 | 0x84 | 0xA3 | 0xA4 | 0x5E | 0x5F | 0x9E | 0x9F => {
            cdb.get(1).map(|b| b & 0x1F)
        },
        _ => None,
    }
}

/// Look up the entry describing an already built CDB.
pub fn lookup_cdb(cdb: &[u8], device_type: u8) -> Option<&'static OpcodeInfo> {
    lookup(*cdb.first()?, cdb_subcode(cdb), device_type)
}

/// Name for reports; unknown opcodes get a generic label.
pub fn opcode_name(cdb: &[u8], device_type: u8) -> &'static str {
    lookup_cdb(cdb, device_type).map_or("Unknown Opcode", |i| i.name)
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! INQUIRY (6) CDB fillers and response parsers.
//!
//! CDB layout (SPC):
//!   [0] = 0x12 (INQUIRY)
//!   [1] = EVPD (bit 0); other bits reserved
//!   [2] = Page Code (only when EVPD=1; else 0)
//!   [3..4] = Allocation Length (u16, big-endian)
//!   [5] = Control

use std::fmt;

use crate::models::byte_order::{CodecError, get_be};

pub const INQUIRY_OPCODE: u8 = 0x12;
pub const STANDARD_INQUIRY_LEN: usize = 36;

/// VPD pages the crate asks for.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VpdPage {
    SupportedPages = 0x00,
    UnitSerial = 0x80,
    DeviceId = 0x83,
    ThirdPartyCopy = 0x8F,
    BlockLimits = 0xB0,
    LbProvisioning = 0xB2,
}

/// Designator types (SPC-4 table 461) that matter for copy targets.
pub const DESIGNATOR_T10_VENDOR: u8 = 0x01;
pub const DESIGNATOR_EUI64: u8 = 0x02;
pub const DESIGNATOR_NAA: u8 = 0x03;
/// ASSOCIATION value for the addressed logical unit.
pub const ASSOCIATION_LU: u8 = 0x00;

/// Fill a **Standard INQUIRY (EVPD=0)** CDB.
#[inline]
pub fn fill_inquiry_standard(cdb: &mut [u8; 16], allocation_len: u16, control: u8) {
    cdb.fill(0);
    cdb[0] = INQUIRY_OPCODE;
    cdb[3..5].copy_from_slice(&allocation_len.to_be_bytes());
    cdb[5] = control;
}

/// Fill a **VPD INQUIRY (EVPD=1)** CDB.
#[inline]
pub fn fill_inquiry_vpd(cdb: &mut [u8; 16], page: u8, allocation_len: u16, control: u8) {
    cdb.fill(0);
    cdb[0] = INQUIRY_OPCODE;
    cdb[1] = 0x01; // EVPD=1
    cdb[2] = page;
    cdb[3..5].copy_from_slice(&allocation_len.to_be_bytes());
    cdb[5] = control;
}

#[derive(Debug, Clone)]
pub struct InquiryStandard {
    pub peripheral_qualifier: u8, // bits 7..5 of byte0
    pub device_type: u8,          // bits 4..0 of byte0
    pub version: u8,
    /// 3PC bit (byte 5 bit 3): target supports third-party copy commands.
    pub third_party_copy: bool,
    pub vendor_id: String,   // bytes 8..16
    pub product_id: String,  // bytes 16..32
    pub product_rev: String, // bytes 32..36
}

/// Parse a Standard INQUIRY (EVPD=0) response (minimum 36 bytes).
pub fn parse_inquiry_standard(buf: &[u8]) -> Result<InquiryStandard, CodecError> {
    if buf.len() < STANDARD_INQUIRY_LEN {
        return Err(CodecError::OutOfBounds {
            offset: 0,
            width: STANDARD_INQUIRY_LEN,
            len: buf.len(),
        });
    }
    Ok(InquiryStandard {
        peripheral_qualifier: (buf[0] >> 5) & 0x07,
        device_type: buf[0] & 0x1F,
        version: buf[2],
        third_party_copy: buf[5] & 0x08 != 0,
        vendor_id: trim_ascii(&buf[8..16]),
        product_id: trim_ascii(&buf[16..32]),
        product_rev: trim_ascii(&buf[32..36]),
    })
}

/// Generic VPD header view: returns (page_code, payload). The payload is
/// clamped to what was actually received.
fn vpd_payload(buf: &[u8]) -> Result<(u8, &[u8]), CodecError> {
    let page_code = get_be(buf, 1, 1)? as u8;
    let len = get_be(buf, 2, 2)? as usize;
    let end = (4 + len).min(buf.len());
    Ok((page_code, &buf[4..end]))
}

/// One Identification Descriptor from VPD page 0x83.
#[derive(Clone, PartialEq, Eq)]
pub struct Designator {
    pub code_set: u8,
    pub association: u8,
    pub designator_type: u8,
    pub id: Vec<u8>,
}

impl Designator {
    pub fn type_name(&self) -> &'static str {
        match self.designator_type {
            0x00 => "vendor specific",
            DESIGNATOR_T10_VENDOR => "T10 vendor ID",
            DESIGNATOR_EUI64 => "EUI-64",
            DESIGNATOR_NAA => "NAA",
            0x04 => "relative target port",
            0x05 => "target port group",
            0x06 => "logical unit group",
            0x07 => "MD5 logical unit",
            0x08 => "SCSI name string",
            _ => "reserved",
        }
    }
}

impl fmt::Debug for Designator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Designator {{ type: {} ({:#x}), assoc: {}, id: {} }}",
            self.type_name(),
            self.designator_type,
            self.association,
            hex::encode(&self.id)
        )
    }
}

/// VPD 0x83: list every identification descriptor. A truncated trailing
/// descriptor ends the walk.
pub fn parse_vpd_device_id(buf: &[u8]) -> Result<Vec<Designator>, CodecError> {
    let (pc, p) = vpd_payload(buf)?;
    if pc != VpdPage::DeviceId as u8 {
        return Err(CodecError::Unexpected {
            what: "VPD page code",
            value: pc as u64,
        });
    }
    let mut out = Vec::new();
    let mut off = 0usize;
    while off + 4 <= p.len() {
        let len = p[off + 3] as usize;
        let start = off + 4;
        let end = start + len;
        if end > p.len() {
            break;
        }
        out.push(Designator {
            code_set: p[off] & 0x0F,
            association: (p[off + 1] >> 4) & 0x03,
            designator_type: p[off + 1] & 0x0F,
            id: p[start..end].to_vec(),
        });
        off = end;
    }
    Ok(out)
}

/// Pick the designator identifying the logical unit: the first NAA
/// descriptor associated with the LU, else the first EUI-64 or T10 one.
pub fn select_lun_designator(list: &[Designator]) -> Option<&Designator> {
    list.iter()
        .find(|d| d.designator_type == DESIGNATOR_NAA && d.association == ASSOCIATION_LU)
        .or_else(|| {
            list.iter().find(|d| {
                d.association == ASSOCIATION_LU
                    && matches!(d.designator_type, DESIGNATOR_EUI64 | DESIGNATOR_T10_VENDOR)
            })
        })
}

/// The Block Limits page (0xB0) fields discovery cares about. Fields past
/// the returned page length read as zero ("not reported").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockLimits {
    pub max_transfer_length: u32,
    pub optimal_transfer_length: u32,
    pub max_unmap_lba_count: u32,
    pub max_unmap_descriptor_count: u32,
    pub max_write_same_length: u64,
}

/// Block Limits payload length for SBC-3 and later.
pub const BLOCK_LIMITS_LEN: usize = 0x40;

/// VPD 0xB0. Offsets are relative to the page start, like SBC tables.
pub fn parse_vpd_block_limits(buf: &[u8]) -> Result<BlockLimits, CodecError> {
    let (pc, p) = vpd_payload(buf)?;
    if pc != VpdPage::BlockLimits as u8 {
        return Err(CodecError::Unexpected {
            what: "VPD page code",
            value: pc as u64,
        });
    }
    let page = &buf[..4 + p.len()];
    let at = |offset: usize, width: usize| get_be(page, offset, width).unwrap_or(0);
    Ok(BlockLimits {
        max_transfer_length: at(8, 4) as u32,
        optimal_transfer_length: at(12, 4) as u32,
        max_unmap_lba_count: at(20, 4) as u32,
        max_unmap_descriptor_count: at(24, 4) as u32,
        max_write_same_length: at(36, 8),
    })
}

fn trim_ascii(bytes: &[u8]) -> String {
    let s: String = bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect();
    s.trim().to_string()
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use anyhow::{Result, bail};

use crate::models::{
    byte_order::{get_be, stoh},
    sense::asc_table::asc_ascq_to_str,
    status::SenseKey,
};

/// Fixed format sense must reach the ASC/ASCQ bytes (0..=13).
pub const FIXED_MIN_LEN: usize = 14;
/// Descriptor format header is 8 bytes.
pub const DESC_MIN_LEN: usize = 8;

pub const RESPONSE_CURRENT_FIXED: u8 = 0x70;
pub const RESPONSE_DEFERRED_FIXED: u8 = 0x71;
pub const RESPONSE_CURRENT_DESCRIPTOR: u8 = 0x72;
pub const RESPONSE_DEFERRED_DESCRIPTOR: u8 = 0x73;

/// Sense descriptor types (SPC-4 Table 29).
pub const DESC_TYPE_INFORMATION: u8 = 0x00;
pub const DESC_TYPE_COMMAND_SPECIFIC: u8 = 0x01;
pub const DESC_TYPE_SENSE_KEY_SPECIFIC: u8 = 0x02;
pub const DESC_TYPE_FRU: u8 = 0x03;

/// XCOPY command-specific bytes: offsets of the nested sense of the copy
/// source / destination device.
const CMD_SRC_DEVICE: usize = 0;
const CMD_DST_DEVICE: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenseFormat {
    Fixed,
    Descriptor,
}

/// Decoded sense data, either format.
#[derive(Default, Clone, PartialEq)]
pub struct SenseData {
    pub format: Option<SenseFormat>,
    pub deferred: bool,
    pub valid: bool,        // bit7 of byte0 (fixed only)
    pub response_code: u8,  // low-7 bits of byte0
    pub sense_key: u8,      // fixed: byte2 low nibble, desc: byte1 low nibble
    pub ili: bool,          // fixed: bit5 of byte2
    pub eom: bool,          // fixed: bit6 of byte2
    pub filemark: bool,     // fixed: bit7 of byte2
    pub information: u64,   // fixed: bytes 3-6, desc: information descriptor
    pub additional_len: u8, // byte7
    /// Command-specific information bytes, left aligned (fixed: 4 bytes,
    /// descriptor: the 8-byte field of descriptor type 0x01).
    pub cmd_specific: [u8; 8],
    pub asc: u8,
    pub ascq: u8,
    pub fru: u8,
    pub sense_key_specific: [u8; 3],
}

impl SenseData {
    /// Parse sense data in fixed (0x70/0x71) or descriptor (0x72/0x73)
    /// format. Optional trailing fields are decoded only when present.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let Some(&b0) = buf.first() else {
            bail!("sense buffer is empty");
        };
        let response_code = b0 & 0x7F;
        match response_code {
            RESPONSE_CURRENT_FIXED | RESPONSE_DEFERRED_FIXED => Self::parse_fixed(buf),
            RESPONSE_CURRENT_DESCRIPTOR | RESPONSE_DEFERRED_DESCRIPTOR => {
                Self::parse_descriptor(buf)
            },
            other => bail!("unsupported sense response code {other:#04x}"),
        }
    }

    fn parse_fixed(buf: &[u8]) -> Result<Self> {
        if buf.len() < FIXED_MIN_LEN {
            bail!("sense buffer too small: {} < {FIXED_MIN_LEN}", buf.len());
        }
        let mut cmd_specific = [0u8; 8];
        cmd_specific[..4].copy_from_slice(&buf[8..12]);

        let mut sks = [0u8; 3];
        if let Some(s) = buf.get(15..18) {
            sks.copy_from_slice(s);
        }

        Ok(Self {
            format: Some(SenseFormat::Fixed),
            deferred: buf[0] & 0x7F == RESPONSE_DEFERRED_FIXED,
            valid: buf[0] & 0x80 != 0,
            response_code: buf[0] & 0x7F,
            sense_key: buf[2] & 0x0F,
            filemark: buf[2] & 0x80 != 0,
            eom: buf[2] & 0x40 != 0,
            ili: buf[2] & 0x20 != 0,
            information: stoh(&buf[3..7])?,
            additional_len: buf[7],
            cmd_specific,
            asc: buf[12],
            ascq: buf[13],
            fru: buf.get(14).copied().unwrap_or(0),
            sense_key_specific: sks,
        })
    }

    fn parse_descriptor(buf: &[u8]) -> Result<Self> {
        if buf.len() < DESC_MIN_LEN {
            bail!("sense buffer too small: {} < {DESC_MIN_LEN}", buf.len());
        }
        let mut sd = Self {
            format: Some(SenseFormat::Descriptor),
            deferred: buf[0] & 0x7F == RESPONSE_DEFERRED_DESCRIPTOR,
            valid: false,
            response_code: buf[0] & 0x7F,
            sense_key: buf[1] & 0x0F,
            asc: buf[2],
            ascq: buf[3],
            additional_len: buf[7],
            ..Default::default()
        };

        for (dtype, body) in descriptors(buf) {
            match dtype {
                DESC_TYPE_INFORMATION => {
                    // [2] VALID bit7, [3] reserved, [4..12] information
                    if let Ok(v) = get_be(body, 4, 8) {
                        sd.valid = body[2] & 0x80 != 0;
                        sd.information = v;
                    }
                },
                DESC_TYPE_COMMAND_SPECIFIC => {
                    if let Some(info) = body.get(4..12) {
                        sd.cmd_specific.copy_from_slice(info);
                    }
                },
                DESC_TYPE_SENSE_KEY_SPECIFIC => {
                    if let Some(s) = body.get(4..7) {
                        sd.sense_key_specific.copy_from_slice(s);
                    }
                },
                DESC_TYPE_FRU => {
                    if let Some(&fru) = body.get(3) {
                        sd.fru = fru;
                    }
                },
                _ => {},
            }
        }
        Ok(sd)
    }

    #[inline]
    pub fn key(&self) -> SenseKey {
        SenseKey::from(self.sense_key)
    }

    /// Command-specific information as an integer (4 bytes for fixed
    /// format, 8 bytes for descriptor format).
    pub fn cmd_specific_value(&self) -> u64 {
        let width = match self.format {
            Some(SenseFormat::Descriptor) => 8,
            _ => 4,
        };
        stoh(&self.cmd_specific[..width]).unwrap_or(0)
    }

    pub fn description(&self) -> &'static str {
        asc_ascq_to_str(self.asc, self.ascq)
    }
}

/// Sense key / ASC / ASCQ triple, zeros when the buffer holds no
/// recognizable sense data.
pub fn sense_errors(buf: &[u8]) -> (u8, u8, u8) {
    SenseData::parse(buf)
        .map(|s| (s.sense_key, s.asc, s.ascq))
        .unwrap_or((0, 0, 0))
}

/// Iterate descriptor-format sense descriptors as `(type, descriptor)`
/// where the slice includes the 2-byte header. Stops at the first
/// descriptor that would run past the additional sense length or the
/// buffer.
fn descriptors(buf: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let end = (DESC_MIN_LEN + buf.get(7).copied().unwrap_or(0) as usize).min(buf.len());
    let mut off = DESC_MIN_LEN;
    std::iter::from_fn(move || {
        if off + 2 > end {
            return None;
        }
        let dtype = buf[off];
        let len = buf[off + 1] as usize + 2;
        let stop = off.checked_add(len)?;
        if stop > end {
            return None;
        }
        let body = &buf[off..stop];
        off = stop;
        Some((dtype, body))
    })
}

/// Which copy endpoint a nested XCOPY sense block refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDevice {
    Source,
    Destination,
}

impl fmt::Display for CopyDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CopyDevice::Source => "source",
            CopyDevice::Destination => "destination",
        })
    }
}

/// Status + sense data that an EXTENDED COPY target embeds for the copy
/// source or destination that caused a COPY ABORTED.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedSense {
    pub device: CopyDevice,
    pub scsi_status: u8,
    pub sense: SenseData,
}

/// Locate the nested sense block of a COPY ABORTED response.
///
/// Command-specific byte 0 holds the offset (from the start of the sense
/// buffer) of the source device block, byte 1 the destination's. At the
/// offset sits the device's SCSI status followed by its sense data. The
/// destination wins if both are set. Offsets pointing outside `buf`, or at
/// unparseable sense, yield `None`.
pub fn nested_copy_sense(sense: &SenseData, buf: &[u8]) -> Option<NestedSense> {
    if sense.key() != SenseKey::CopyAborted {
        return None;
    }
    let pick = [
        (CMD_DST_DEVICE, CopyDevice::Destination),
        (CMD_SRC_DEVICE, CopyDevice::Source),
    ];
    pick.into_iter().find_map(|(idx, device)| {
        let offset = sense.cmd_specific[idx] as usize;
        if offset == 0 {
            return None;
        }
        let scsi_status = *buf.get(offset)?;
        let nested = buf.get(offset + 1..)?;
        let sense = SenseData::parse(nested).ok()?;
        Some(NestedSense {
            device,
            scsi_status,
            sense,
        })
    })
}

impl fmt::Debug for SenseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenseData")
            .field("format", &self.format)
            .field("valid", &self.valid)
            .field(
                "response_code",
                &format_args!("{:#04x}", self.response_code),
            )
            .field("sense_key", &format_args!("{:#x}", self.sense_key))
            .field("filemark", &self.filemark)
            .field("eom", &self.eom)
            .field("ili", &self.ili)
            .field("information", &self.information)
            .field("additional_len", &self.additional_len)
            .field("cmd_specific", &format_args!("{:#x}", self.cmd_specific_value()))
            .field("asc", &format_args!("{:#04x}", self.asc))
            .field("ascq", &format_args!("{:#04x}", self.ascq))
            .field("fru", &self.fru)
            .field("description", &self.description())
            .finish()
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! RECEIVE ROD TOKEN INFORMATION (THIRD-PARTY COPY IN, SA 0x07) and
//! RECEIVE COPY STATUS(LID1) (SA 0x00).
//!
//! CDB layout:
//!   [0]      = 0x84
//!   [1]      = service action
//!   [2..6]   = LIST IDENTIFIER (SA 0x07), [2] only for SA 0x00
//!   [10..14] = ALLOCATION LENGTH
//!   [15]     = CONTROL

use std::fmt;

use zerocopy::{
    FromBytes, Immutable, KnownLayout,
    byteorder::{BigEndian, U16, U32, U64},
};

use crate::{
    control_block::token::ROD_TOKEN_LENGTH,
    models::byte_order::{CodecError, field, get_be},
};

pub const THIRD_PARTY_COPY_IN: u8 = 0x84;
pub const SA_RECEIVE_COPY_STATUS_LID1: u8 = 0x00;
pub const SA_RECEIVE_ROD_TOKEN_INFO: u8 = 0x07;

pub const RRTI_HEADER_LEN: usize = 32;
/// ROD TOKEN DESCRIPTORS LENGTH (4) + restricted (2).
pub const ROD_TOKEN_DESC_HEADER_LEN: usize = 6;
/// Expected ROD TOKEN DESCRIPTORS LENGTH: restricted bytes plus the token.
pub const EXPECTED_TOKEN_DESC_LEN: u64 = (ROD_TOKEN_LENGTH + 2) as u64;
/// Allocation length that fits the header, the largest sense block and a
/// token descriptor.
pub const RRTI_ALLOCATION_LEN: usize = 1024;

#[inline]
pub fn build_receive_rod_token_info_cdb(
    cdb: &mut [u8; 16],
    list_id: u32,
    alloc_len: u32,
    control: u8,
) {
    cdb.fill(0);
    cdb[0] = THIRD_PARTY_COPY_IN;
    cdb[1] = SA_RECEIVE_ROD_TOKEN_INFO;
    cdb[2..6].copy_from_slice(&list_id.to_be_bytes());
    cdb[10..14].copy_from_slice(&alloc_len.to_be_bytes());
    cdb[15] = control;
}

/// RECEIVE COPY STATUS(LID1) parameter data is a fixed 12 bytes.
pub const COPY_STATUS_LID1_LEN: usize = 12;

#[inline]
pub fn build_receive_copy_status_lid1_cdb(
    cdb: &mut [u8; 16],
    list_id: u8,
    alloc_len: u32,
    control: u8,
) {
    cdb.fill(0);
    cdb[0] = THIRD_PARTY_COPY_IN;
    cdb[1] = SA_RECEIVE_COPY_STATUS_LID1;
    cdb[2] = list_id;
    cdb[10..14].copy_from_slice(&alloc_len.to_be_bytes());
    cdb[15] = control;
}

/// COPY MANAGER STATUS of an EXTENDED COPY(LID1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyManagerStatus {
    InProgress,
    Completed,
    CompletedWithError,
    Other(u8),
}

impl From<u8> for CopyManagerStatus {
    fn from(v: u8) -> Self {
        match v & 0x7F {
            0x00 => CopyManagerStatus::InProgress,
            0x01 => CopyManagerStatus::Completed,
            0x02 => CopyManagerStatus::CompletedWithError,
            other => CopyManagerStatus::Other(other),
        }
    }
}

/// Decoded RECEIVE COPY STATUS(LID1) response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyStatusLid1 {
    /// HDD: held data discarded.
    pub held_data_discarded: bool,
    pub status: CopyManagerStatus,
    pub segments_processed: u16,
    pub transfer_count_units: u8,
    pub transfer_count: u32,
}

pub fn parse_copy_status_lid1(buf: &[u8]) -> Result<CopyStatusLid1, CodecError> {
    let flags = get_be(buf, 4, 1)? as u8;
    Ok(CopyStatusLid1 {
        held_data_discarded: flags & 0x80 != 0,
        status: CopyManagerStatus::from(flags),
        segments_processed: get_be(buf, 5, 2)? as u16,
        transfer_count_units: get_be(buf, 7, 1)? as u8,
        transfer_count: get_be(buf, 8, 4)? as u32,
    })
}

/// COPY OPERATION STATUS reported by RECEIVE COPY RESULTS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStatus {
    Uninitialized,
    Success,
    Failure,
    SuccessResidual,
    ForegroundInProgress,
    BackgroundInProgress,
    Terminated,
    Other(u8),
}

impl From<u8> for CopyStatus {
    fn from(v: u8) -> Self {
        match v & 0x7F {
            0x00 => CopyStatus::Uninitialized,
            0x01 => CopyStatus::Success,
            0x02 => CopyStatus::Failure,
            0x03 => CopyStatus::SuccessResidual,
            0x11 => CopyStatus::ForegroundInProgress,
            0x12 => CopyStatus::BackgroundInProgress,
            0x60 => CopyStatus::Terminated,
            other => CopyStatus::Other(other),
        }
    }
}

impl CopyStatus {
    pub fn name(self) -> &'static str {
        match self {
            CopyStatus::Uninitialized => "uninitialized",
            CopyStatus::Success => "success",
            CopyStatus::Failure => "failure",
            CopyStatus::SuccessResidual => "success with residual",
            CopyStatus::ForegroundInProgress => "foreground in progress",
            CopyStatus::BackgroundInProgress => "background in progress",
            CopyStatus::Terminated => "terminated",
            CopyStatus::Other(_) => "reserved",
        }
    }

    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, CopyStatus::Success | CopyStatus::SuccessResidual)
    }

    #[inline]
    pub fn in_progress(self) -> bool {
        matches!(
            self,
            CopyStatus::ForegroundInProgress | CopyStatus::BackgroundInProgress
        )
    }
}

impl fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyStatus::Other(v) => write!(f, "{v:#x} ({})", self.name()),
            _ => f.write_str(self.name()),
        }
    }
}

/// Fixed 32-byte head of the RRTI parameter data.
#[repr(C)]
#[derive(FromBytes, KnownLayout, Immutable, Debug)]
pub struct RrtiHeaderRaw {
    pub available_data: U32<BigEndian>,
    pub response_to_service_action: u8,
    pub copy_operation_status: u8,
    pub operation_counter: U16<BigEndian>,
    pub estimated_status_update_delay: U32<BigEndian>,
    pub extended_copy_completion_status: u8,
    pub sense_data_field_length: u8,
    pub sense_data_length: u8,
    pub transfer_count_units: u8,
    pub transfer_count: U64<BigEndian>,
    pub segments_processed: U16<BigEndian>,
    pub reserved: [u8; 6],
}

/// Decoded RRTI response, owned.
#[derive(Debug, Clone)]
pub struct RodTokenInfo {
    pub response_to_service_action: u8,
    pub copy_status: CopyStatus,
    pub operation_counter: u16,
    pub estimated_delay_ms: u32,
    pub completion_status: u8,
    pub sense: Vec<u8>,
    pub transfer_count_units: u8,
    pub transfer_count: u64,
    pub segments_processed: u16,
    /// Present only when the response carried a token descriptor.
    pub token: Option<Vec<u8>>,
}

/// Parse RRTI parameter data.
///
/// `expect_token` is set for the response to POPULATE TOKEN: the token
/// descriptor must then be present and its length must be exactly
/// [`EXPECTED_TOKEN_DESC_LEN`]. All offsets are checked against `buf`.
pub fn parse_rod_token_info(buf: &[u8], expect_token: bool) -> Result<RodTokenInfo, CodecError> {
    let (raw, _rest) = RrtiHeaderRaw::ref_from_prefix(buf).map_err(|_| CodecError::OutOfBounds {
        offset: 0,
        width: RRTI_HEADER_LEN,
        len: buf.len(),
    })?;

    let sense_field_len = raw.sense_data_field_length as usize;
    let sense_len = (raw.sense_data_length as usize).min(sense_field_len);
    let sense = field(buf, RRTI_HEADER_LEN, sense_len)?.to_vec();

    let token = if expect_token {
        let desc = RRTI_HEADER_LEN + sense_field_len;
        let desc_len = get_be(buf, desc, 4)?;
        if desc_len != EXPECTED_TOKEN_DESC_LEN {
            return Err(CodecError::Unexpected {
                what: "ROD token descriptor length",
                value: desc_len,
            });
        }
        let token = field(buf, desc + ROD_TOKEN_DESC_HEADER_LEN, ROD_TOKEN_LENGTH)?;
        Some(token.to_vec())
    } else {
        None
    };

    Ok(RodTokenInfo {
        response_to_service_action: raw.response_to_service_action & 0x1F,
        copy_status: CopyStatus::from(raw.copy_operation_status),
        operation_counter: raw.operation_counter.get(),
        estimated_delay_ms: raw.estimated_status_update_delay.get(),
        completion_status: raw.extended_copy_completion_status,
        sense,
        transfer_count_units: raw.transfer_count_units,
        transfer_count: raw.transfer_count.get(),
        segments_processed: raw.segments_processed.get(),
        token,
    })
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Opcode families: one codec per CDB layout, selected by table lookup.

use enum_dispatch::enum_dispatch;

use crate::{
    control_block::{
        extended_copy::{MAX_SEGMENT_BLOCKS, build_extended_copy_cdb},
        inquiry::{
            BlockLimits, Designator, InquiryStandard, STANDARD_INQUIRY_LEN, VpdPage,
            fill_inquiry_standard, fill_inquiry_vpd, parse_inquiry_standard,
            parse_vpd_block_limits, parse_vpd_device_id,
        },
        lba::{
            MAX_BLOCKS_6, MAX_BLOCKS_10, MAX_BLOCKS_16, MAX_LBA_6, MAX_LBA_10, MAX_LBA_16,
            fill_lba_cdb6, fill_lba_cdb10, fill_lba_cdb16,
        },
        read::{READ10, READ16, build_read10, build_read16},
        read_capacity::{
            Capacity, RC16_DATA_LEN, build_read_capacity10, build_read_capacity16,
            parse_read_capacity10, parse_read_capacity16,
        },
        receive_copy::{
            COPY_STATUS_LID1_LEN, CopyStatusLid1, RRTI_ALLOCATION_LEN, RodTokenInfo,
            SA_RECEIVE_COPY_STATUS_LID1, SA_RECEIVE_ROD_TOKEN_INFO,
            build_receive_copy_status_lid1_cdb, build_receive_rod_token_info_cdb,
            parse_copy_status_lid1, parse_rod_token_info,
        },
        test_unit_ready::build_test_unit_ready,
        token::{SA_POPULATE_TOKEN, build_populate_token_cdb, build_write_using_token_cdb},
        write::{WRITE10, WRITE16, build_write10, build_write16},
    },
    models::{byte_order::CodecError, common::MAX_CDB_LEN},
    registry::OpcodeInfo,
};

/// A built CDB: the 16-byte scratch area and the bytes actually used.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Cdb {
    pub bytes: [u8; MAX_CDB_LEN],
    pub len: usize,
}

impl Cdb {
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl std::fmt::Debug for Cdb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cdb({})", hex::encode(self.as_slice()))
    }
}

/// Variable CDB fields supplied by the window or the copy orchestration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CdbFields {
    pub lba: u64,
    pub blocks: u64,
    /// Byte 1 protection / cache flags for block I/O CDBs.
    pub flags: u8,
    pub list_identifier: u32,
    /// Parameter list length or allocation length, depending on the CDB.
    pub transfer_length: u32,
    pub control: u8,
}

/// Decoded data-in payload.
#[derive(Debug, Clone)]
pub enum Response {
    None,
    Capacity(Capacity),
    Standard(Box<InquiryStandard>),
    Designators(Vec<Designator>),
    BlockLimits(BlockLimits),
    RodTokenInfo(Box<RodTokenInfo>),
    CopyStatus(CopyStatusLid1),
}

#[enum_dispatch]
pub trait CdbCodec {
    fn build_cdb(&self, info: &OpcodeInfo, f: &CdbFields) -> Result<Cdb, CodecError>;

    fn parse_response(&self, _info: &OpcodeInfo, _data: &[u8]) -> Result<Response, CodecError> {
        Ok(Response::None)
    }

    /// Highest LBA the CDB can address.
    fn max_lba(&self) -> u64 {
        0
    }

    /// Largest block count one CDB can carry.
    fn max_blocks(&self) -> u64 {
        0
    }
}

#[enum_dispatch(CdbCodec)]
#[derive(Debug, Clone, Copy)]
pub enum OpcodeFamily {
    NoData(NoDataCodec),
    Lba6(Lba6Codec),
    Lba10(Lba10Codec),
    Lba16(Lba16Codec),
    Inquiry(InquiryCodec),
    ReadCapacity10(ReadCapacity10Codec),
    ReadCapacity16(ReadCapacity16Codec),
    TokenCopy(TokenCopyCodec),
    ExtendedCopy(ExtendedCopyCodec),
    ReceiveCopy(ReceiveCopyCodec),
}

fn cdb_with<F>(len: usize, fill: F) -> Result<Cdb, CodecError>
where F: FnOnce(&mut [u8; MAX_CDB_LEN]) -> Result<(), CodecError> {
    let mut bytes = [0u8; MAX_CDB_LEN];
    fill(&mut bytes)?;
    Ok(Cdb { bytes, len })
}

#[derive(Debug, Clone, Copy)]
pub struct NoDataCodec;

impl CdbCodec for NoDataCodec {
    fn build_cdb(&self, info: &OpcodeInfo, f: &CdbFields) -> Result<Cdb, CodecError> {
        // Six bytes: the opcode and CONTROL, everything else reserved.
        cdb_with(6, |c| {
            build_test_unit_ready(c, f.control);
            c[0] = info.opcode;
            Ok(())
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Lba6Codec;

impl CdbCodec for Lba6Codec {
    fn build_cdb(&self, info: &OpcodeInfo, f: &CdbFields) -> Result<Cdb, CodecError> {
        cdb_with(6, |c| fill_lba_cdb6(c, info.opcode, f.lba, f.blocks, f.control))
    }

    fn max_lba(&self) -> u64 {
        MAX_LBA_6
    }

    fn max_blocks(&self) -> u64 {
        MAX_BLOCKS_6
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Lba10Codec;

impl CdbCodec for Lba10Codec {
    fn build_cdb(&self, info: &OpcodeInfo, f: &CdbFields) -> Result<Cdb, CodecError> {
        cdb_with(10, |c| match info.opcode {
            READ10 => build_read10(c, f.lba, f.blocks, f.flags, f.control),
            WRITE10 => build_write10(c, f.lba, f.blocks, f.flags, f.control),
            op => fill_lba_cdb10(c, op, f.flags, f.lba, f.blocks, f.control),
        })
    }

    fn max_lba(&self) -> u64 {
        MAX_LBA_10
    }

    fn max_blocks(&self) -> u64 {
        MAX_BLOCKS_10
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Lba16Codec;

impl CdbCodec for Lba16Codec {
    fn build_cdb(&self, info: &OpcodeInfo, f: &CdbFields) -> Result<Cdb, CodecError> {
        cdb_with(16, |c| match info.opcode {
            READ16 => build_read16(c, f.lba, f.blocks, f.flags, f.control),
            WRITE16 => build_write16(c, f.lba, f.blocks, f.flags, f.control),
            op => fill_lba_cdb16(c, op, f.flags, f.lba, f.blocks, f.control),
        })
    }

    fn max_lba(&self) -> u64 {
        MAX_LBA_16
    }

    fn max_blocks(&self) -> u64 {
        MAX_BLOCKS_16
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InquiryCodec;

impl CdbCodec for InquiryCodec {
    fn build_cdb(&self, info: &OpcodeInfo, f: &CdbFields) -> Result<Cdb, CodecError> {
        let alloc = match f.transfer_length {
            0 => STANDARD_INQUIRY_LEN as u16,
            n => u16::try_from(n).map_err(|_| CodecError::Overflow {
                value: n as u64,
                width: 2,
            })?,
        };
        cdb_with(6, |c| {
            match info.subcode {
                Some(page) => fill_inquiry_vpd(c, page, alloc, f.control),
                None => fill_inquiry_standard(c, alloc, f.control),
            }
            Ok(())
        })
    }

    fn parse_response(&self, info: &OpcodeInfo, data: &[u8]) -> Result<Response, CodecError> {
        match info.subcode {
            None => Ok(Response::Standard(Box::new(parse_inquiry_standard(data)?))),
            Some(page) if page == VpdPage::DeviceId as u8 => {
                Ok(Response::Designators(parse_vpd_device_id(data)?))
            },
            Some(page) if page == VpdPage::BlockLimits as u8 => {
                Ok(Response::BlockLimits(parse_vpd_block_limits(data)?))
            },
            Some(_) => Ok(Response::None),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReadCapacity10Codec;

impl CdbCodec for ReadCapacity10Codec {
    fn build_cdb(&self, _info: &OpcodeInfo, f: &CdbFields) -> Result<Cdb, CodecError> {
        cdb_with(10, |c| {
            build_read_capacity10(c, f.control);
            Ok(())
        })
    }

    fn parse_response(&self, _info: &OpcodeInfo, data: &[u8]) -> Result<Response, CodecError> {
        Ok(Response::Capacity(parse_read_capacity10(data)?))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReadCapacity16Codec;

impl CdbCodec for ReadCapacity16Codec {
    fn build_cdb(&self, _info: &OpcodeInfo, f: &CdbFields) -> Result<Cdb, CodecError> {
        let alloc = match f.transfer_length {
            0 => RC16_DATA_LEN as u32,
            n => n,
        };
        cdb_with(16, |c| {
            build_read_capacity16(c, alloc, f.control);
            Ok(())
        })
    }

    fn parse_response(&self, _info: &OpcodeInfo, data: &[u8]) -> Result<Response, CodecError> {
        Ok(Response::Capacity(parse_read_capacity16(data)?))
    }
}

/// POPULATE TOKEN / WRITE USING TOKEN, told apart by the service action.
#[derive(Debug, Clone, Copy)]
pub struct TokenCopyCodec;

impl CdbCodec for TokenCopyCodec {
    fn build_cdb(&self, info: &OpcodeInfo, f: &CdbFields) -> Result<Cdb, CodecError> {
        cdb_with(16, |c| {
            if info.subcode == Some(SA_POPULATE_TOKEN) {
                build_populate_token_cdb(c, f.list_identifier, f.transfer_length, f.control);
            } else {
                build_write_using_token_cdb(c, f.list_identifier, f.transfer_length, f.control);
            }
            Ok(())
        })
    }

    fn max_lba(&self) -> u64 {
        MAX_LBA_16
    }

    /// NUMBER OF LOGICAL BLOCKS of a single range descriptor.
    fn max_blocks(&self) -> u64 {
        MAX_BLOCKS_16
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExtendedCopyCodec;

impl CdbCodec for ExtendedCopyCodec {
    fn build_cdb(&self, _info: &OpcodeInfo, f: &CdbFields) -> Result<Cdb, CodecError> {
        cdb_with(16, |c| {
            build_extended_copy_cdb(c, f.transfer_length, f.control);
            Ok(())
        })
    }

    fn max_lba(&self) -> u64 {
        MAX_LBA_16
    }

    /// Per segment; the window scales it by the segment count.
    fn max_blocks(&self) -> u64 {
        MAX_SEGMENT_BLOCKS
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReceiveCopyCodec;

impl CdbCodec for ReceiveCopyCodec {
    fn build_cdb(&self, info: &OpcodeInfo, f: &CdbFields) -> Result<Cdb, CodecError> {
        if info.subcode == Some(SA_RECEIVE_COPY_STATUS_LID1) {
            let alloc = match f.transfer_length {
                0 => COPY_STATUS_LID1_LEN as u32,
                n => n,
            };
            let list_id = u8::try_from(f.list_identifier).map_err(|_| CodecError::Overflow {
                value: f.list_identifier as u64,
                width: 1,
            })?;
            return cdb_with(16, |c| {
                build_receive_copy_status_lid1_cdb(c, list_id, alloc, f.control);
                Ok(())
            });
        }
        let alloc = match f.transfer_length {
            0 => RRTI_ALLOCATION_LEN as u32,
            n => n,
        };
        cdb_with(16, |c| {
            build_receive_rod_token_info_cdb(c, f.list_identifier, alloc, f.control);
            Ok(())
        })
    }

    /// `expect_token` is left to the caller of RRTI, so the token
    /// descriptor is not required here.
    fn parse_response(&self, info: &OpcodeInfo, data: &[u8]) -> Result<Response, CodecError> {
        match info.subcode {
            Some(SA_RECEIVE_ROD_TOKEN_INFO) => Ok(Response::RodTokenInfo(Box::new(
                parse_rod_token_info(data, false)?,
            ))),
            Some(SA_RECEIVE_COPY_STATUS_LID1) => {
                Ok(Response::CopyStatus(parse_copy_status_lid1(data)?))
            },
            _ => Ok(Response::None),
        }
    }
}

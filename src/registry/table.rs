// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    control_block::{
        extended_copy::MAX_SEGMENT_BLOCKS,
        inquiry::{INQUIRY_OPCODE, VpdPage},
        read::{READ6, READ10, READ16, VERIFY10, VERIFY16},
        read_capacity::{READ_CAPACITY10, SA_READ_CAPACITY16, SERVICE_ACTION_IN16},
        receive_copy::{
            SA_RECEIVE_COPY_STATUS_LID1, SA_RECEIVE_ROD_TOKEN_INFO, THIRD_PARTY_COPY_IN,
        },
        test_unit_ready::TEST_UNIT_READY,
        token::{
            SA_EXTENDED_COPY_LID1, SA_POPULATE_TOKEN, SA_WRITE_USING_TOKEN, THIRD_PARTY_COPY_OUT,
        },
        write::{
            WRITE_SAME_DEFAULT_BLOCKS, WRITE_SAME10, WRITE_SAME16, WRITE_VERIFY10,
            WRITE_VERIFY16, WRITE6, WRITE10, WRITE16,
        },
    },
    models::common::DataDirection::{self, None as NoData, Read, Write},
    registry::{
        DeviceMask, OpcodeFlags, OpcodeInfo,
        family::{
            ExtendedCopyCodec, InquiryCodec, Lba6Codec, Lba10Codec, Lba16Codec, NoDataCodec,
            OpcodeFamily, ReadCapacity10Codec, ReadCapacity16Codec, ReceiveCopyCodec,
            TokenCopyCodec,
        },
    },
};

/// Blocks one POPULATE TOKEN / WRITE USING TOKEN pair moves when the caller
/// does not say otherwise.
pub const TOKEN_DEFAULT_BLOCKS: u64 = 0x1_0000;

const DISK: DeviceMask = DeviceMask::DIRECT_ACCESS;
const ALL: DeviceMask = DeviceMask::all();

#[allow(clippy::too_many_arguments)]
const fn op(
    opcode: u8,
    subcode: Option<u8>,
    name: &'static str,
    direction: DataDirection,
    device_mask: DeviceMask,
    default_blocks: u64,
    flags: OpcodeFlags,
    family: OpcodeFamily,
) -> OpcodeInfo {
    OpcodeInfo {
        opcode,
        subcode,
        name,
        direction,
        device_mask,
        default_blocks,
        flags,
        family,
    }
}

const NONE: OpcodeFlags = OpcodeFlags::empty();
const NO_LEN: OpcodeFlags = OpcodeFlags::NO_NATURAL_LENGTH;
const COPY: OpcodeFlags = OpcodeFlags::NO_NATURAL_LENGTH.union(OpcodeFlags::COPY);

use OpcodeFamily as F;

pub(crate) static OPCODES: &[OpcodeInfo] = &[
    op(TEST_UNIT_READY, None, "Test Unit Ready", NoData, ALL, 0, NONE, F::NoData(NoDataCodec)),
    op(INQUIRY_OPCODE, None, "Inquiry", Read, ALL, 0, NONE, F::Inquiry(InquiryCodec)),
    op(
        INQUIRY_OPCODE,
        Some(VpdPage::SupportedPages as u8),
        "Inquiry - Supported VPD Pages",
        Read,
        ALL,
        0,
        NONE,
        F::Inquiry(InquiryCodec),
    ),
    op(
        INQUIRY_OPCODE,
        Some(VpdPage::UnitSerial as u8),
        "Inquiry - Unit Serial Number",
        Read,
        ALL,
        0,
        NONE,
        F::Inquiry(InquiryCodec),
    ),
    op(
        INQUIRY_OPCODE,
        Some(VpdPage::DeviceId as u8),
        "Inquiry - Device Identification",
        Read,
        ALL,
        0,
        NONE,
        F::Inquiry(InquiryCodec),
    ),
    op(
        INQUIRY_OPCODE,
        Some(VpdPage::ThirdPartyCopy as u8),
        "Inquiry - Third-party Copy",
        Read,
        DISK,
        0,
        NONE,
        F::Inquiry(InquiryCodec),
    ),
    op(
        INQUIRY_OPCODE,
        Some(VpdPage::BlockLimits as u8),
        "Inquiry - Block Limits",
        Read,
        DISK,
        0,
        NONE,
        F::Inquiry(InquiryCodec),
    ),
    op(
        INQUIRY_OPCODE,
        Some(VpdPage::LbProvisioning as u8),
        "Inquiry - Logical Block Provisioning",
        Read,
        DISK,
        0,
        NONE,
        F::Inquiry(InquiryCodec),
    ),
    op(READ6, None, "Read(6)", Read, DISK, 0, NONE, F::Lba6(Lba6Codec)),
    op(WRITE6, None, "Write(6)", Write, DISK, 0, NONE, F::Lba6(Lba6Codec)),
    op(
        READ_CAPACITY10,
        None,
        "Read Capacity(10)",
        Read,
        DISK,
        0,
        NONE,
        F::ReadCapacity10(ReadCapacity10Codec),
    ),
    op(READ10, None, "Read(10)", Read, DISK, 0, NONE, F::Lba10(Lba10Codec)),
    op(WRITE10, None, "Write(10)", Write, DISK, 0, NONE, F::Lba10(Lba10Codec)),
    op(WRITE_VERIFY10, None, "Write and Verify(10)", Write, DISK, 0, NONE, F::Lba10(Lba10Codec)),
    op(VERIFY10, None, "Verify(10)", NoData, DISK, 0, NONE, F::Lba10(Lba10Codec)),
    op(WRITE_SAME10, None, "Write Same(10)", Write, DISK, 0, NO_LEN, F::Lba10(Lba10Codec)),
    op(
        THIRD_PARTY_COPY_OUT,
        Some(SA_EXTENDED_COPY_LID1),
        "Extended Copy(LID1)",
        Write,
        ALL,
        MAX_SEGMENT_BLOCKS,
        COPY,
        F::ExtendedCopy(ExtendedCopyCodec),
    ),
    op(
        THIRD_PARTY_COPY_OUT,
        Some(SA_POPULATE_TOKEN),
        "Populate Token",
        Write,
        DISK,
        TOKEN_DEFAULT_BLOCKS,
        COPY,
        F::TokenCopy(TokenCopyCodec),
    ),
    op(
        THIRD_PARTY_COPY_OUT,
        Some(SA_WRITE_USING_TOKEN),
        "Write Using Token",
        Write,
        DISK,
        TOKEN_DEFAULT_BLOCKS,
        COPY,
        F::TokenCopy(TokenCopyCodec),
    ),
    op(
        THIRD_PARTY_COPY_IN,
        Some(SA_RECEIVE_COPY_STATUS_LID1),
        "Receive Copy Status(LID1)",
        Read,
        ALL,
        0,
        NONE,
        F::ReceiveCopy(ReceiveCopyCodec),
    ),
    op(
        THIRD_PARTY_COPY_IN,
        Some(SA_RECEIVE_ROD_TOKEN_INFO),
        "Receive ROD Token Information",
        Read,
        ALL,
        0,
        NONE,
        F::ReceiveCopy(ReceiveCopyCodec),
    ),
    op(READ16, None, "Read(16)", Read, DISK, 0, NONE, F::Lba16(Lba16Codec)),
    op(WRITE16, None, "Write(16)", Write, DISK, 0, NONE, F::Lba16(Lba16Codec)),
    op(WRITE_VERIFY16, None, "Write and Verify(16)", Write, DISK, 0, NONE, F::Lba16(Lba16Codec)),
    op(VERIFY16, None, "Verify(16)", NoData, DISK, 0, NONE, F::Lba16(Lba16Codec)),
    op(
        WRITE_SAME16,
        None,
        "Write Same(16)",
        Write,
        DISK,
        WRITE_SAME_DEFAULT_BLOCKS,
        NO_LEN,
        F::Lba16(Lba16Codec),
    ),
    op(
        SERVICE_ACTION_IN16,
        Some(SA_READ_CAPACITY16),
        "Read Capacity(16)",
        Read,
        DISK,
        0,
        NONE,
        F::ReadCapacity16(ReadCapacity16Codec),
    ),
];

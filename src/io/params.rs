// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    cfg::config::Config,
    control_block::inquiry::Designator,
    error::SptError,
    exec::context::CommandContext,
    io::pattern::FillPattern,
    registry::{OpcodeInfo, family::CdbFields},
};

/// Window values captured by the first-time branch and put back at end of
/// data, so the next outer iteration walks the same window again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub valid: bool,
    pub block_limit: u64,
    pub starting_lba: u64,
    pub ending_lba: u64,
    pub cdb_blocks: u64,
    pub data_length: usize,
    pub list_identifier: u32,
}

/// What discovery learned about the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCaps {
    /// Thin provisioned (LBPME).
    pub lbpme: bool,
    /// Unmapped blocks read as zero (LBPRZ).
    pub lbprz: bool,
    /// MAXIMUM UNMAP LBA COUNT from the Block Limits page, 0 when the
    /// device does not report one.
    pub max_unmap_lba_count: u32,
    /// MAXIMUM TRANSFER LENGTH in blocks, 0 when not reported.
    pub max_transfer_length: u32,
    /// The Block Limits page has been asked for, whatever the answer.
    pub block_limits_known: bool,
    pub designator: Option<Designator>,
}

/// A sub-window of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub starting_lba: u64,
    pub ending_lba: u64,
}

impl Slice {
    #[inline]
    pub fn blocks(&self) -> u64 {
        self.ending_lba - self.starting_lba
    }
}

/// Split `[starting_lba, starting_lba + block_limit)` into `count` slices,
/// the remainder going to the last one.
#[derive(Debug, Clone)]
pub struct Slices {
    pub slices: Vec<Slice>,
}

impl Slices {
    pub fn new(starting_lba: u64, block_limit: u64, count: u64) -> Option<Self> {
        if count == 0 || block_limit < count {
            return None;
        }
        let per = block_limit / count;
        let mut slices = Vec::with_capacity(count as usize);
        let mut lba = starting_lba;
        for i in 0..count {
            let blocks = if i + 1 == count {
                starting_lba + block_limit - lba
            } else {
                per
            };
            slices.push(Slice {
                starting_lba: lba,
                ending_lba: lba + blocks,
            });
            lba += blocks;
        }
        Some(Self { slices })
    }
}

/// Transfer window state of one device taking part in an operation.
///
/// LBAs and block counts are in device blocks; `data_limit` and
/// `step_value` are bytes as configured.
#[derive(Debug)]
pub struct DeviceIoParams {
    pub ctx: CommandContext,
    /// Opcode whose limits govern this window.
    pub op: &'static OpcodeInfo,

    pub starting_lba: u64,
    pub current_lba: u64,
    /// Exclusive; 0 until the window is established, unless configured.
    pub ending_lba: u64,
    pub block_limit: u64,
    /// Blocks moved so far in this window.
    pub block_count: u64,
    /// Explicit block count carried by the CDB, 0 when the transfer length
    /// decides.
    pub cdb_blocks: u64,
    /// Blocks the next CDB moves.
    pub data_blocks: u64,
    pub data_limit: u64,
    pub step_value: u64,
    pub list_identifier: u32,

    /// Segments per CDB (extended copy); scales the block budget.
    pub scale_count: u64,
    pub multiple_sources: bool,
    pub bypass: bool,
    pub disable_length_check: bool,

    pub pattern: FillPattern,
    pub compare: bool,
    pub compare_data: Option<Vec<u8>>,
    pub dump_limit: usize,

    pub first_time: bool,
    pub end_of_data: bool,
    pub saved: WindowSnapshot,
    pub caps: DeviceCaps,
}

impl DeviceIoParams {
    pub fn new(ctx: CommandContext, op: &'static OpcodeInfo) -> Self {
        Self {
            ctx,
            op,
            starting_lba: 0,
            current_lba: 0,
            ending_lba: 0,
            block_limit: 0,
            block_count: 0,
            cdb_blocks: 0,
            data_blocks: 0,
            data_limit: 0,
            step_value: 0,
            list_identifier: 0,
            scale_count: 1,
            multiple_sources: false,
            bypass: false,
            disable_length_check: false,
            pattern: FillPattern::default(),
            compare: false,
            compare_data: None,
            dump_limit: 1024,
            first_time: true,
            end_of_data: false,
            saved: WindowSnapshot::default(),
            caps: DeviceCaps::default(),
        }
    }

    /// Window seeded from the `io` and `pattern` sections.
    pub fn from_config(ctx: CommandContext, op: &'static OpcodeInfo, cfg: &Config) -> Self {
        let mut iop = Self::new(ctx, op);
        iop.starting_lba = cfg.io.starting_lba;
        iop.ending_lba = cfg.io.ending_lba;
        iop.block_limit = cfg.io.block_limit;
        iop.data_limit = cfg.io.data_limit;
        iop.step_value = cfg.io.step_value;
        iop.cdb_blocks = cfg.io.blocks;
        iop.bypass = cfg.io.bypass.as_bool();
        iop.disable_length_check = cfg.io.disable_length_check.as_bool();
        iop.dump_limit = cfg.io.dump_limit;
        iop.pattern = cfg.pattern.fill_pattern();
        iop.compare = cfg.pattern.compare.as_bool();
        iop
    }

    #[inline]
    pub fn dsf(&self) -> &str {
        &self.ctx.dsf
    }

    #[inline]
    pub fn block_size(&self) -> u64 {
        self.ctx.device_size as u64
    }

    /// Blocks left in the window.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.block_limit.saturating_sub(self.block_count)
    }

    /// CDB fields for the next transfer of this window.
    pub fn cdb_fields(&self) -> CdbFields {
        CdbFields {
            lba: self.current_lba,
            blocks: self.data_blocks,
            list_identifier: self.list_identifier,
            transfer_length: self.ctx.data_length as u32,
            ..Default::default()
        }
    }

    /// Partition the established window into `count` slices.
    pub fn slices(&self, count: u64) -> Result<Slices, SptError> {
        let limit = if self.block_limit != 0 {
            self.block_limit
        } else {
            self.ending_lba.saturating_sub(self.starting_lba)
        };
        Slices::new(self.starting_lba, limit, count).ok_or_else(|| {
            SptError::range(
                self.dsf(),
                format!("block limit {limit} is less than slice count {count}"),
            )
        })
    }

    /// Make `slice` this device's window. The next advance runs the
    /// first-time branch against it.
    pub fn initialize_slice(&mut self, slice: &Slice) {
        self.starting_lba = slice.starting_lba;
        self.current_lba = slice.starting_lba;
        self.ending_lba = slice.ending_lba;
        self.block_limit = slice.blocks();
        self.block_count = 0;
        self.data_limit = 0;
        self.saved = WindowSnapshot::default();
        self.first_time = true;
        self.end_of_data = false;
    }

    /// Put the snapshot back and rewind, ready for the next outer pass.
    pub(crate) fn restore_snapshot(&mut self) {
        let s = self.saved;
        self.block_limit = s.block_limit;
        self.starting_lba = s.starting_lba;
        self.ending_lba = s.ending_lba;
        self.cdb_blocks = s.cdb_blocks;
        self.ctx.data_length = s.data_length;
        self.list_identifier = s.list_identifier;
        self.current_lba = s.starting_lba;
        self.block_count = 0;
        self.end_of_data = true;
        self.first_time = true;
    }
}

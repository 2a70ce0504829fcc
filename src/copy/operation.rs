// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::mem;

use tracing::{debug, info};

use crate::{
    cfg::config::CopyConfig,
    control_block::receive_copy::{
        RRTI_ALLOCATION_LEN, RodTokenInfo, SA_RECEIVE_ROD_TOKEN_INFO, THIRD_PARTY_COPY_IN,
        parse_rod_token_info,
    },
    copy::rod_token::RodToken,
    error::SptError,
    exec::engine::{ExecStatus, issue},
    io::{
        capacity::{get_block_limits, get_capacity, get_designator},
        params::DeviceIoParams,
        window::{Advance, advance, advance_op},
    },
    registry::{self, family::CdbFields},
};

/// Which device of the set a command goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Source(usize),
    Destination,
}

/// Result of a step that may ask the caller to start the pass over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restartable<T> {
    Done(T),
    Restart,
}

/// Devices taking part in one copy: one or more sources and a destination,
/// each with its own window, plus the token and response buffer the copy
/// phases share.
#[derive(Debug)]
pub struct OperationSet {
    pub sources: Vec<DeviceIoParams>,
    pub destination: DeviceIoParams,
    pub copy: CopyConfig,
    /// Compare destination data against the source after each pass.
    pub compare: bool,
    pub token: RodToken,
    response: Vec<u8>,
}

impl OperationSet {
    pub fn new(
        mut sources: Vec<DeviceIoParams>,
        mut destination: DeviceIoParams,
        copy: CopyConfig,
    ) -> Result<Self, SptError> {
        let zero = copy.zero_token.as_bool();
        if sources.is_empty() && !zero {
            return Err(SptError::Config("a copy needs at least one source device".into()));
        }
        let multiple = sources.len() > 1;
        for src in &mut sources {
            src.multiple_sources = multiple;
        }
        let mut compare = destination.compare;
        if zero {
            compare = false;
            destination.compare = false;
        }
        Ok(Self {
            sources,
            destination,
            copy,
            compare,
            token: if zero { RodToken::zero() } else { RodToken::default() },
            response: vec![0u8; RRTI_ALLOCATION_LEN],
        })
    }

    pub fn device(&mut self, at: Endpoint) -> &mut DeviceIoParams {
        match at {
            Endpoint::Source(i) => &mut self.sources[i],
            Endpoint::Destination => &mut self.destination,
        }
    }

    #[inline]
    pub fn zero_token(&self) -> bool {
        self.token.is_zero()
    }

    fn devices_mut(&mut self) -> impl Iterator<Item = &mut DeviceIoParams> {
        self.sources
            .iter_mut()
            .chain(std::iter::once(&mut self.destination))
    }

    /// Capacity, block limits and designator of every device, queried
    /// once.
    pub fn discover(&mut self) -> Result<(), SptError> {
        for iop in self.devices_mut() {
            if iop.ctx.device_size == 0 || iop.ctx.device_capacity == 0 {
                get_capacity(&mut iop.ctx, &mut iop.caps)?;
            }
            if !iop.caps.block_limits_known {
                get_block_limits(&mut iop.ctx, &mut iop.caps)?;
            }
            if iop.caps.designator.is_none() {
                get_designator(&mut iop.ctx, &mut iop.caps)?;
            }
        }
        let size = self.destination.ctx.device_size;
        if let Some(src) = self.sources.iter().find(|s| s.ctx.device_size != size) {
            return Err(SptError::range(
                src.dsf(),
                format!(
                    "block size {} differs from destination block size {size}",
                    src.ctx.device_size
                ),
            ));
        }
        Ok(())
    }

    /// Source and destination are the same logical unit.
    pub fn same_lun(&self) -> bool {
        match (self.sources.as_slice(), &self.destination.caps.designator) {
            ([src], Some(dst)) => src.caps.designator.as_ref() == Some(dst),
            _ => false,
        }
    }

    /// Give the source the lower half of the unit's window and the
    /// destination the upper half, so the two never overlap.
    pub fn split_same_lun(&mut self) -> Result<(), SptError> {
        let Some(src) = self.sources.first_mut() else {
            return Ok(());
        };
        let start = src.starting_lba;
        let end = if src.ending_lba != 0 {
            src.ending_lba
        } else {
            src.ctx.device_capacity
        };
        if end <= start + 1 {
            return Err(SptError::range(
                src.dsf(),
                format!("window [{start}, {end}) is too small to split for a same-LUN copy"),
            ));
        }
        let mid = start + (end - start) / 2;
        src.ending_lba = mid;
        src.block_limit = 0;
        src.data_limit = 0;
        let dst = &mut self.destination;
        dst.starting_lba = mid;
        dst.ending_lba = end;
        dst.block_limit = 0;
        dst.data_limit = 0;
        info!(
            "{}: same LUN copy, source [{start}, {mid}) destination [{mid}, {end})",
            dst.dsf()
        );
        Ok(())
    }

    /// Discover devices, split a same-LUN pair and establish every window.
    pub fn prepare(&mut self) -> Result<(), SptError> {
        self.discover()?;
        if self.same_lun() {
            self.split_same_lun()?;
        }
        for iop in self.devices_mut() {
            advance_op(iop)?;
        }
        Ok(())
    }

    /// Blocks the next source/destination pair can move.
    pub fn pass_blocks(&self) -> u64 {
        self.sources
            .iter()
            .map(|s| s.data_blocks)
            .fold(self.destination.data_blocks, u64::min)
    }

    /// Account for `blocks` moved by the last pass on the destination and
    /// on every source. Any window running out ends the operation.
    pub fn advance_all(&mut self, blocks: u64) -> Result<Advance, SptError> {
        let mut result = Advance::Continue;
        for iop in self.devices_mut() {
            iop.cdb_blocks = blocks;
            let (max_lba, max_blocks) = (iop.op.max_lba(), iop.op.max_blocks());
            if advance(iop, max_lba, max_blocks)? == Advance::EndOfData {
                result = Advance::EndOfData;
            }
        }
        Ok(result)
    }

    /// RECEIVE ROD TOKEN INFORMATION for `list_identifier`, decoded into
    /// the set's response buffer.
    pub fn receive_token_info(
        &mut self,
        at: Endpoint,
        list_identifier: u32,
        expect_token: bool,
    ) -> Result<Restartable<RodTokenInfo>, SptError> {
        let mut buf = mem::take(&mut self.response);
        let iop = self.device(at);
        let info = registry::lookup(
            THIRD_PARTY_COPY_IN,
            Some(SA_RECEIVE_ROD_TOKEN_INFO),
            iop.ctx.device_type,
        )
        .ok_or_else(|| {
            SptError::protocol(iop.dsf(), "RECEIVE ROD TOKEN INFORMATION not supported")
        });
        let fields = CdbFields {
            list_identifier,
            transfer_length: RRTI_ALLOCATION_LEN as u32,
            ..Default::default()
        };

        let res = info.and_then(|info| {
            iop.ctx.with_scratch(|ctx| {
                ctx.data = mem::take(&mut buf);
                let out = match issue(ctx, info, &fields, RRTI_ALLOCATION_LEN) {
                    Ok(ExecStatus::Success) => parse_rod_token_info(ctx.response(), expect_token)
                        .map(Restartable::Done)
                        .map_err(|e| SptError::protocol(&ctx.dsf, e.to_string())),
                    Ok(ExecStatus::Restart) => Ok(Restartable::Restart),
                    Err(e) => Err(e),
                };
                buf = mem::take(&mut ctx.data);
                out
            })
        });
        self.response = buf;

        if let Ok(Restartable::Done(info)) = &res {
            debug!(
                "list {list_identifier:#x}: copy status {}, {} {} transferred",
                info.copy_status, info.transfer_count, info.transfer_count_units
            );
        }
        res
    }
}

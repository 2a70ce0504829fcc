// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::mem;

use tracing::debug;

use crate::{
    control_block::{
        inquiry::{BLOCK_LIMITS_LEN, INQUIRY_OPCODE, VpdPage, select_lun_designator},
        read_capacity::{
            Capacity, RC10_DATA_LEN, RC16_DATA_LEN, READ_CAPACITY10, SA_READ_CAPACITY16,
            SERVICE_ACTION_IN16,
        },
    },
    error::SptError,
    exec::{context::CommandContext, engine::query},
    io::params::DeviceCaps,
    registry::{
        self, OpcodeInfo,
        family::{CdbFields, Response},
    },
};

/// VPD page 0x83 allocation; designators are small, the page rarely
/// exceeds a few hundred bytes.
pub const DEVICE_ID_ALLOC_LEN: usize = 0x200;

fn opcode(
    ctx: &CommandContext,
    opcode: u8,
    subcode: Option<u8>,
) -> Result<&'static OpcodeInfo, SptError> {
    registry::lookup(opcode, subcode, ctx.device_type).ok_or_else(|| {
        SptError::protocol(
            &ctx.dsf,
            format!("opcode {opcode:#04x} not supported for device type {}", ctx.device_type),
        )
    })
}

fn read_capacity(
    ctx: &mut CommandContext,
    info: &'static OpcodeInfo,
    alloc_len: usize,
) -> Result<Capacity, SptError> {
    let fields = CdbFields {
        transfer_length: alloc_len as u32,
        ..Default::default()
    };
    match query(ctx, info, &fields, alloc_len)? {
        Response::Capacity(c) => Ok(c),
        other => Err(SptError::protocol(
            &ctx.dsf,
            format!("{}: unexpected response {other:?}", info.name),
        )),
    }
}

/// Learn block length and capacity: READ CAPACITY(16) first, READ
/// CAPACITY(10) when the device rejects it. Zero fields do not overwrite
/// what is already known.
pub fn get_capacity(ctx: &mut CommandContext, caps: &mut DeviceCaps) -> Result<(), SptError> {
    let rc16 = opcode(ctx, SERVICE_ACTION_IN16, Some(SA_READ_CAPACITY16))?;

    // Plenty of older targets reject the 16-byte form; keep that quiet.
    let errors = mem::replace(&mut ctx.log.errors, false);
    let first = read_capacity(ctx, rc16, RC16_DATA_LEN);
    ctx.log.errors = errors;

    let cap = match first {
        Ok(cap) => cap,
        Err(e) => {
            if ctx.log.debug {
                debug!("{}: {e}, falling back to READ CAPACITY(10)", ctx.dsf);
            }
            let rc10 = opcode(ctx, READ_CAPACITY10, None)?;
            read_capacity(ctx, rc10, RC10_DATA_LEN)?
        },
    };

    if cap.block_length != 0 {
        ctx.device_size = cap.block_length;
    }
    if cap.last_lba != 0 {
        ctx.device_capacity = cap.blocks();
    }
    caps.lbpme = cap.lbpme;
    caps.lbprz = cap.lbprz;

    if ctx.device_size == 0 || ctx.device_capacity == 0 {
        return Err(SptError::protocol(
            &ctx.dsf,
            format!(
                "device reported block length {} and capacity {}",
                ctx.device_size, ctx.device_capacity
            ),
        ));
    }
    if ctx.log.debug {
        debug!(
            "{}: capacity {} blocks of {} bytes, lbpme {}, lbprz {}",
            ctx.dsf, ctx.device_capacity, ctx.device_size, caps.lbpme, caps.lbprz
        );
    }
    Ok(())
}

/// Record the logical unit designator from the Device Identification page.
pub fn get_designator(ctx: &mut CommandContext, caps: &mut DeviceCaps) -> Result<(), SptError> {
    let info = opcode(ctx, INQUIRY_OPCODE, Some(VpdPage::DeviceId as u8))?;
    let fields = CdbFields {
        transfer_length: DEVICE_ID_ALLOC_LEN as u32,
        ..Default::default()
    };
    let list = match query(ctx, info, &fields, DEVICE_ID_ALLOC_LEN)? {
        Response::Designators(list) => list,
        other => {
            return Err(SptError::protocol(
                &ctx.dsf,
                format!("unexpected Device Identification response {other:?}"),
            ));
        },
    };
    let picked = select_lun_designator(&list).ok_or_else(|| {
        SptError::protocol(&ctx.dsf, "no logical unit designator in VPD page 0x83")
    })?;
    if ctx.log.debug {
        debug!(
            "{}: designator {} {:?} ({} bytes)",
            ctx.dsf,
            picked.type_name(),
            picked,
            picked.id.len()
        );
    }
    caps.designator = Some(picked.clone());
    Ok(())
}

/// Record the Block Limits page (0xB0): maximum unmap LBA count and
/// maximum transfer length. The page is optional, so a device rejecting it
/// leaves both at zero.
pub fn get_block_limits(ctx: &mut CommandContext, caps: &mut DeviceCaps) -> Result<(), SptError> {
    caps.block_limits_known = true;
    let Ok(info) = opcode(ctx, INQUIRY_OPCODE, Some(VpdPage::BlockLimits as u8)) else {
        return Ok(());
    };
    let fields = CdbFields {
        transfer_length: BLOCK_LIMITS_LEN as u32,
        ..Default::default()
    };

    let errors = mem::replace(&mut ctx.log.errors, false);
    let res = query(ctx, info, &fields, BLOCK_LIMITS_LEN);
    ctx.log.errors = errors;

    match res {
        Ok(Response::BlockLimits(bl)) => {
            caps.max_unmap_lba_count = bl.max_unmap_lba_count;
            caps.max_transfer_length = bl.max_transfer_length;
            if ctx.log.debug {
                debug!(
                    "{}: max unmap lba count {}, max transfer length {}",
                    ctx.dsf, bl.max_unmap_lba_count, bl.max_transfer_length
                );
            }
            Ok(())
        },
        Ok(other) => Err(SptError::protocol(
            &ctx.dsf,
            format!("unexpected Block Limits response {other:?}"),
        )),
        Err(SptError::Exec(e)) => {
            if ctx.log.debug {
                debug!("{}: no Block Limits page: {e}", ctx.dsf);
            }
            Ok(())
        },
        Err(e) => Err(e),
    }
}

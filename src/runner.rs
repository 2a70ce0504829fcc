// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Runs independent operation sets side by side.
//!
//! The command engine is synchronous; every job gets its own blocking
//! worker and owns its devices outright, so nothing is shared between
//! jobs. A single cancellation token stops all of them at the next CDB
//! boundary.

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    cfg::config::Config,
    control_block::{
        read::READ16,
        token::{
            SA_EXTENDED_COPY_LID1, SA_POPULATE_TOKEN, SA_WRITE_USING_TOKEN, THIRD_PARTY_COPY_OUT,
        },
        write::WRITE16,
    },
    copy::{
        operation::OperationSet,
        rw_copy::{RwMode, run_rw_copy},
    },
    error::SptError,
    exec::{context::CommandContext, submit::Submitter},
    io::{Completion, params::DeviceIoParams},
    registry::{self, OpcodeInfo},
    state_machine::{token_copy_states::run_token_copy, xcopy_states::run_xcopy},
};

/// How a job moves data from its sources to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// POPULATE TOKEN + WRITE USING TOKEN.
    Token,
    /// EXTENDED COPY (LID1).
    Extended,
    /// Host READ then WRITE.
    ReadWrite,
    /// Host READ of both sides, compared.
    Verify,
}

/// A device path and the pass-through handle that reaches it.
pub struct DeviceHandle {
    pub dsf: String,
    pub device: Box<dyn Submitter>,
    pub device_type: u8,
}

impl DeviceHandle {
    pub fn new(dsf: impl Into<String>, device: Box<dyn Submitter>) -> Self {
        Self {
            dsf: dsf.into(),
            device,
            device_type: 0,
        }
    }
}

fn opcode(
    opcode: u8,
    subcode: Option<u8>,
    device_type: u8,
) -> Result<&'static OpcodeInfo, SptError> {
    registry::lookup(opcode, subcode, device_type).ok_or_else(|| {
        SptError::Config(format!(
            "opcode {opcode:#04x} is not supported for device type {device_type:#04x}"
        ))
    })
}

/// Source and destination opcodes of `mode`.
pub fn copy_opcodes(
    mode: CopyMode,
    device_type: u8,
) -> Result<(&'static OpcodeInfo, &'static OpcodeInfo), SptError> {
    let read = || opcode(READ16, None, device_type);
    Ok(match mode {
        CopyMode::Token => (
            opcode(THIRD_PARTY_COPY_OUT, Some(SA_POPULATE_TOKEN), device_type)?,
            opcode(THIRD_PARTY_COPY_OUT, Some(SA_WRITE_USING_TOKEN), device_type)?,
        ),
        CopyMode::Extended => (
            read()?,
            opcode(THIRD_PARTY_COPY_OUT, Some(SA_EXTENDED_COPY_LID1), device_type)?,
        ),
        CopyMode::ReadWrite => (read()?, opcode(WRITE16, None, device_type)?),
        CopyMode::Verify => (read()?, read()?),
    })
}

fn device_params(
    handle: DeviceHandle,
    op: &'static OpcodeInfo,
    cfg: &Config,
) -> DeviceIoParams {
    let mut ctx = CommandContext::from_config(handle.device, handle.dsf, cfg);
    ctx.device_type = handle.device_type;
    DeviceIoParams::from_config(ctx, op, cfg)
}

/// Build the operation set of one copy job from `cfg`.
pub fn build_operation_set(
    mode: CopyMode,
    sources: Vec<DeviceHandle>,
    destination: DeviceHandle,
    cfg: &Config,
) -> Result<OperationSet, SptError> {
    let (src_op, dst_op) = copy_opcodes(mode, destination.device_type)?;
    let sources = sources
        .into_iter()
        .map(|h| device_params(h, src_op, cfg))
        .collect();
    let destination = device_params(destination, dst_op, cfg);
    OperationSet::new(sources, destination, cfg.copy.clone())
}

/// Run one copy on the calling thread.
pub fn run_copy(
    set: &mut OperationSet,
    mode: CopyMode,
    cancel: &CancellationToken,
) -> Result<Completion, SptError> {
    match mode {
        CopyMode::Token => run_token_copy(set, cancel),
        CopyMode::Extended => run_xcopy(set, cancel),
        CopyMode::ReadWrite => run_rw_copy(set, RwMode::Copy, cancel),
        CopyMode::Verify => run_rw_copy(set, RwMode::Verify, cancel),
    }
}

pub struct Job {
    pub name: String,
    pub set: OperationSet,
    pub mode: CopyMode,
}

#[derive(Debug)]
pub struct JobReport {
    pub name: String,
    pub result: Result<Completion, SptError>,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.result, Ok(Completion::Done))
    }
}

/// Cancel `cancel` on the first Ctrl-C.
pub fn install_interrupt(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => {
                    warn!("interrupt received, stopping at the next command boundary");
                    cancel.cancel();
                },
                Err(e) => error!("failed to listen for interrupt: {e}"),
            },
            _ = cancel.cancelled() => {},
        }
    })
}

/// Run every job on its own blocking worker and collect the reports in
/// submission order.
pub async fn run_jobs(jobs: Vec<Job>, cancel: CancellationToken) -> Result<Vec<JobReport>> {
    let mut handles = Vec::with_capacity(jobs.len());
    for job in jobs {
        let cancel = cancel.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let Job {
                name,
                mut set,
                mode,
            } = job;
            info!("{name}: starting {mode:?} copy to {}", set.destination.dsf());
            let result = run_copy(&mut set, mode, &cancel);
            match &result {
                Ok(Completion::Done) => info!("{name}: completed"),
                Ok(Completion::Interrupted) => warn!("{name}: interrupted"),
                Err(e) => error!("{name}: {e}"),
            }
            JobReport { name, result }
        }));
    }

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        reports.push(handle.await.context("copy worker panicked")?);
    }
    Ok(reports)
}

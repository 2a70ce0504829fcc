// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! EXTENDED COPY (LID1): Init -> Copy -> [Verify] -> Advance -> (Copy | Done).

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    copy::{
        operation::OperationSet,
        xcopy::{SegmentPlan, apply_plan, encode_plan, plan_segments},
    },
    error::SptError,
    exec::engine::{ExecStatus, issue},
    io::{Completion, verify::compare_ranges, window::Advance},
    registry::family::CdbFields,
    state_machine::common::{StateMachine, StateMachineCtx, Transition},
    utils::generate_list_identifier,
};

pub struct XcopyCtx<'a> {
    pub set: &'a mut OperationSet,
    pub state: Option<XcopyStates>,
    /// Sources whose window ran out.
    exhausted: Vec<bool>,
    plan: SegmentPlan,
    restarts: u32,
    cancel: CancellationToken,
    interrupted: bool,
    pub commands: u64,
    pub blocks_copied: u64,
}

impl<'a> XcopyCtx<'a> {
    pub fn new(set: &'a mut OperationSet) -> Self {
        Self {
            set,
            state: Some(XcopyStates::Init(Init)),
            exhausted: Vec::new(),
            plan: SegmentPlan::default(),
            restarts: 0,
            cancel: CancellationToken::new(),
            interrupted: false,
            commands: 0,
            blocks_copied: 0,
        }
    }
}

pub struct Init;
pub struct Copy;
pub struct Verify;
pub struct AdvanceWindows;

pub enum XcopyStates {
    Init(Init),
    Copy(Copy),
    Verify(Verify),
    Advance(AdvanceWindows),
}

type XcopyStepOut = Transition<XcopyStates, Result<(), SptError>>;

fn flatten(r: Result<XcopyStepOut, SptError>) -> XcopyStepOut {
    r.unwrap_or_else(|e| Transition::Done(Err(e)))
}

impl Init {
    fn run(&self, ctx: &mut XcopyCtx<'_>) -> Result<XcopyStepOut, SptError> {
        if ctx.set.sources.is_empty() {
            return Err(SptError::Config("EXTENDED COPY needs a source device".into()));
        }
        // The destination window carries every segment of one command.
        ctx.set.destination.scale_count = ctx.set.copy.segment_count as u64;
        ctx.set.prepare()?;
        ctx.exhausted = vec![false; ctx.set.sources.len()];
        Ok(Transition::Next(XcopyStates::Copy(Copy), Ok(())))
    }
}

impl<'ctx> StateMachine<XcopyCtx<'ctx>, XcopyStepOut> for Init {
    fn step(&self, ctx: &mut XcopyCtx<'ctx>) -> XcopyStepOut {
        flatten(self.run(ctx))
    }
}

impl Copy {
    fn run(&self, ctx: &mut XcopyCtx<'_>) -> Result<XcopyStepOut, SptError> {
        ctx.plan = plan_segments(
            &ctx.set.sources,
            &ctx.exhausted,
            &ctx.set.destination,
            ctx.set.copy.segment_count,
        );
        if ctx.plan.total == 0 {
            return Ok(Transition::Done(Ok(())));
        }
        let list_id = generate_list_identifier();
        let param = encode_plan(ctx.set, list_id, &ctx.plan)?;

        let dst = &mut ctx.set.destination;
        dst.list_identifier = list_id;
        dst.ctx.set_data(&param);
        let fields = CdbFields {
            list_identifier: list_id,
            transfer_length: param.len() as u32,
            ..Default::default()
        };
        if dst.ctx.log.debug {
            debug!(
                "{}: EXTENDED COPY list {:#04x}, {} segments, {} blocks",
                dst.dsf(),
                list_id & 0xFF,
                ctx.plan.segments.len(),
                ctx.plan.total
            );
        }
        match issue(&mut dst.ctx, dst.op, &fields, param.len())? {
            ExecStatus::Success => {
                ctx.commands += 1;
                let next = if ctx.set.compare {
                    XcopyStates::Verify(Verify)
                } else {
                    XcopyStates::Advance(AdvanceWindows)
                };
                Ok(Transition::Next(next, Ok(())))
            },
            ExecStatus::Restart => {
                ctx.restarts += 1;
                let limit = ctx.set.destination.ctx.recovery.retry_limit;
                if ctx.restarts > limit {
                    return Err(SptError::RestartLimit {
                        device: ctx.set.destination.dsf().to_string(),
                        limit,
                    });
                }
                Ok(Transition::Next(XcopyStates::Copy(Copy), Ok(())))
            },
        }
    }
}

impl<'ctx> StateMachine<XcopyCtx<'ctx>, XcopyStepOut> for Copy {
    fn step(&self, ctx: &mut XcopyCtx<'ctx>) -> XcopyStepOut {
        flatten(self.run(ctx))
    }
}

impl Verify {
    fn run(&self, ctx: &mut XcopyCtx<'_>) -> Result<XcopyStepOut, SptError> {
        let chunk = ctx.set.copy.verify_chunk_blocks;
        let OperationSet {
            sources,
            destination: dst,
            ..
        } = &mut *ctx.set;
        for seg in &ctx.plan.segments {
            let src = &mut sources[seg.src_index as usize];
            let done = compare_ranges(
                &mut src.ctx,
                seg.src_lba,
                &mut dst.ctx,
                seg.dst_lba,
                seg.blocks as u64,
                chunk,
                dst.dump_limit,
                &ctx.cancel,
            )?;
            if done == Completion::Interrupted {
                ctx.interrupted = true;
                return Ok(Transition::Done(Ok(())));
            }
        }
        Ok(Transition::Next(XcopyStates::Advance(AdvanceWindows), Ok(())))
    }
}

impl<'ctx> StateMachine<XcopyCtx<'ctx>, XcopyStepOut> for Verify {
    fn step(&self, ctx: &mut XcopyCtx<'ctx>) -> XcopyStepOut {
        flatten(self.run(ctx))
    }
}

impl AdvanceWindows {
    fn run(&self, ctx: &mut XcopyCtx<'_>) -> Result<XcopyStepOut, SptError> {
        ctx.blocks_copied += ctx.plan.total;
        ctx.restarts = 0;
        if apply_plan(ctx.set, &mut ctx.exhausted, &ctx.plan)? == Advance::EndOfData {
            return Ok(Transition::Done(Ok(())));
        }
        Ok(Transition::Next(XcopyStates::Copy(Copy), Ok(())))
    }
}

impl<'ctx> StateMachine<XcopyCtx<'ctx>, XcopyStepOut> for AdvanceWindows {
    fn step(&self, ctx: &mut XcopyCtx<'ctx>) -> XcopyStepOut {
        flatten(self.run(ctx))
    }
}

impl<'ctx> StateMachineCtx<XcopyCtx<'ctx>, Completion> for XcopyCtx<'ctx> {
    fn execute(&mut self, cancel: &CancellationToken) -> Result<Completion, SptError> {
        self.cancel = cancel.clone();
        loop {
            if cancel.is_cancelled() {
                return Ok(Completion::Interrupted);
            }
            let state = self
                .state
                .take()
                .ok_or_else(|| anyhow!("state must be set XcopyCtx"))?;
            let tr = match &state {
                XcopyStates::Init(s) => s.step(self),
                XcopyStates::Copy(s) => s.step(self),
                XcopyStates::Verify(s) => s.step(self),
                XcopyStates::Advance(s) => s.step(self),
            };

            match tr {
                Transition::Next(next, r) => {
                    r?;
                    self.state = Some(next);
                },
                Transition::Stay(r) => {
                    r?;
                    self.state = Some(state);
                },
                Transition::Done(r) => {
                    r?;
                    if self.interrupted {
                        return Ok(Completion::Interrupted);
                    }
                    info!(
                        "{}: extended copy done, {} blocks in {} commands",
                        self.set.destination.dsf(),
                        self.blocks_copied,
                        self.commands
                    );
                    return Ok(Completion::Done);
                },
            }
        }
    }
}

/// Run an EXTENDED COPY of `set` to completion or interruption.
pub fn run_xcopy(
    set: &mut OperationSet,
    cancel: &CancellationToken,
) -> Result<Completion, SptError> {
    XcopyCtx::new(set).execute(cancel)
}

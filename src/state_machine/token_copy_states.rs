// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Offload copy through ROD tokens:
//! Init -> PopulateToken -> ReceiveTokenInfo -> WriteUsingToken ->
//! ReceiveTokenInfo -> [Verify] -> Advance -> (PopulateToken | Done).
//!
//! With the zero token the PopulateToken phase is skipped and the
//! destination is filled with zeroes.

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    control_block::token::{
        PopulateTokenFlags, ROD_TYPE_DEFAULT, SA_POPULATE_TOKEN, SA_WRITE_USING_TOKEN,
        WriteUsingTokenFlags, encode_populate_token, encode_write_using_token,
    },
    copy::{
        operation::{Endpoint, OperationSet, Restartable},
        ranges::split_ranges,
    },
    error::SptError,
    exec::engine::{ExecStatus, issue},
    io::{Completion, verify::compare_ranges, window::Advance},
    registry::family::CdbFields,
    state_machine::common::{StateMachine, StateMachineCtx, Transition},
    utils::generate_list_identifier,
};

pub struct TokenCopyCtx<'a> {
    pub set: &'a mut OperationSet,
    pub state: Option<TokenCopyStates>,
    /// Blocks moved by the current pass.
    blocks: u64,
    populate_id: u32,
    write_id: u32,
    restarts: u32,
    cancel: CancellationToken,
    interrupted: bool,
    pub passes: u64,
    pub blocks_copied: u64,
}

impl<'a> TokenCopyCtx<'a> {
    pub fn new(set: &'a mut OperationSet) -> Self {
        Self {
            set,
            state: Some(TokenCopyStates::Init(Init)),
            blocks: 0,
            populate_id: 0,
            write_id: 0,
            restarts: 0,
            cancel: CancellationToken::new(),
            interrupted: false,
            passes: 0,
            blocks_copied: 0,
        }
    }

    fn first_phase(&self) -> TokenCopyStates {
        if self.set.zero_token() {
            TokenCopyStates::WriteUsingToken(WriteUsingToken)
        } else {
            TokenCopyStates::PopulateToken(PopulateToken)
        }
    }

    /// A retryable error asked for the pass to start over: the token (if
    /// any) is dropped and the pass begins again, up to the retry limit.
    fn restart(&mut self) -> TokenStepOut {
        self.restarts += 1;
        let limit = self.set.destination.ctx.recovery.retry_limit;
        if self.restarts > limit {
            return Transition::Done(Err(SptError::RestartLimit {
                device: self.set.destination.dsf().to_string(),
                limit,
            }));
        }
        self.set.token.consume();
        debug!(
            "{}: restarting token copy pass ({}/{limit})",
            self.set.destination.dsf(),
            self.restarts
        );
        Transition::Next(self.first_phase(), Ok(()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPhase {
    Populate,
    Write,
}

pub struct Init;
pub struct PopulateToken;
pub struct ReceiveTokenInfo {
    pub phase: TokenPhase,
}
pub struct WriteUsingToken;
pub struct Verify;
pub struct AdvanceWindows;

pub enum TokenCopyStates {
    Init(Init),
    PopulateToken(PopulateToken),
    ReceiveTokenInfo(ReceiveTokenInfo),
    WriteUsingToken(WriteUsingToken),
    Verify(Verify),
    Advance(AdvanceWindows),
}

type TokenStepOut = Transition<TokenCopyStates, Result<(), SptError>>;

fn flatten(r: Result<TokenStepOut, SptError>) -> TokenStepOut {
    r.unwrap_or_else(|e| Transition::Done(Err(e)))
}

impl Init {
    fn run(&self, ctx: &mut TokenCopyCtx<'_>) -> Result<TokenStepOut, SptError> {
        if ctx.set.sources.len() > 1 {
            return Err(SptError::Config("token copy takes a single source device".into()));
        }
        ctx.set.prepare()?;
        ctx.blocks = ctx.set.pass_blocks();
        if ctx.blocks == 0 {
            return Ok(Transition::Done(Ok(())));
        }
        Ok(Transition::Next(ctx.first_phase(), Ok(())))
    }
}

impl<'ctx> StateMachine<TokenCopyCtx<'ctx>, TokenStepOut> for Init {
    fn step(&self, ctx: &mut TokenCopyCtx<'ctx>) -> TokenStepOut {
        flatten(self.run(ctx))
    }
}

impl PopulateToken {
    fn run(&self, ctx: &mut TokenCopyCtx<'_>) -> Result<TokenStepOut, SptError> {
        let list_id = generate_list_identifier();
        let inactivity = ctx.set.copy.inactivity_timeout;
        let range_count = ctx.set.copy.range_count;
        let src = ctx
            .set
            .sources
            .first_mut()
            .ok_or_else(|| SptError::Config("POPULATE TOKEN needs a source".into()))?;

        let ranges = split_ranges(src.current_lba, ctx.blocks, range_count)?;
        let param = encode_populate_token(
            PopulateTokenFlags::empty(),
            inactivity,
            ROD_TYPE_DEFAULT,
            &ranges,
        )?;
        src.list_identifier = list_id;
        src.ctx.set_data(&param);
        let fields = CdbFields {
            list_identifier: list_id,
            transfer_length: param.len() as u32,
            ..Default::default()
        };
        Ok(match issue(&mut src.ctx, src.op, &fields, param.len())? {
            ExecStatus::Success => {
                ctx.populate_id = list_id;
                Transition::Next(
                    TokenCopyStates::ReceiveTokenInfo(ReceiveTokenInfo {
                        phase: TokenPhase::Populate,
                    }),
                    Ok(()),
                )
            },
            ExecStatus::Restart => ctx.restart(),
        })
    }
}

impl<'ctx> StateMachine<TokenCopyCtx<'ctx>, TokenStepOut> for PopulateToken {
    fn step(&self, ctx: &mut TokenCopyCtx<'ctx>) -> TokenStepOut {
        flatten(self.run(ctx))
    }
}

impl ReceiveTokenInfo {
    fn run(&self, ctx: &mut TokenCopyCtx<'_>) -> Result<TokenStepOut, SptError> {
        let (at, list_id, expected_sa) = match self.phase {
            TokenPhase::Populate => (Endpoint::Source(0), ctx.populate_id, SA_POPULATE_TOKEN),
            TokenPhase::Write => (Endpoint::Destination, ctx.write_id, SA_WRITE_USING_TOKEN),
        };
        let expect_token = self.phase == TokenPhase::Populate;
        let info = match ctx.set.receive_token_info(at, list_id, expect_token)? {
            Restartable::Done(info) => info,
            Restartable::Restart => return Ok(ctx.restart()),
        };

        let dsf = ctx.set.device(at).dsf().to_string();
        if info.response_to_service_action != expected_sa {
            return Err(SptError::protocol(
                &dsf,
                format!(
                    "token information answers service action {:#04x}, expected {expected_sa:#04x}",
                    info.response_to_service_action
                ),
            ));
        }
        if !info.copy_status.is_success() {
            return Err(SptError::protocol(
                &dsf,
                format!(
                    "list {list_id:#x}: copy operation status {}, completion status {:#04x}",
                    info.copy_status, info.completion_status
                ),
            ));
        }

        match self.phase {
            TokenPhase::Populate => {
                let token = info.token.ok_or_else(|| {
                    SptError::protocol(&dsf, "no ROD token in token information")
                })?;
                ctx.set.token.set(&token, list_id);
                if let Some(path) = &ctx.set.copy.token_file {
                    ctx.set.token.persist(path)?;
                }
                Ok(Transition::Next(
                    TokenCopyStates::WriteUsingToken(WriteUsingToken),
                    Ok(()),
                ))
            },
            TokenPhase::Write => {
                let next = if ctx.set.compare {
                    TokenCopyStates::Verify(Verify)
                } else {
                    TokenCopyStates::Advance(AdvanceWindows)
                };
                Ok(Transition::Next(next, Ok(())))
            },
        }
    }
}

impl<'ctx> StateMachine<TokenCopyCtx<'ctx>, TokenStepOut> for ReceiveTokenInfo {
    fn step(&self, ctx: &mut TokenCopyCtx<'ctx>) -> TokenStepOut {
        flatten(self.run(ctx))
    }
}

impl WriteUsingToken {
    fn run(&self, ctx: &mut TokenCopyCtx<'_>) -> Result<TokenStepOut, SptError> {
        let list_id = generate_list_identifier();
        let OperationSet {
            destination: dst,
            token,
            copy,
            ..
        } = &mut *ctx.set;

        if !token.is_valid() {
            return Err(SptError::protocol(dst.dsf(), "no valid ROD token to write with"));
        }
        let ranges = split_ranges(dst.current_lba, ctx.blocks, copy.range_count)?;
        let param = encode_write_using_token(
            WriteUsingTokenFlags::empty(),
            0,
            token.as_bytes(),
            &ranges,
        )?;
        dst.list_identifier = list_id;
        dst.ctx.set_data(&param);
        let fields = CdbFields {
            list_identifier: list_id,
            transfer_length: param.len() as u32,
            ..Default::default()
        };
        Ok(match issue(&mut dst.ctx, dst.op, &fields, param.len())? {
            ExecStatus::Success => {
                token.consume();
                ctx.write_id = list_id;
                Transition::Next(
                    TokenCopyStates::ReceiveTokenInfo(ReceiveTokenInfo {
                        phase: TokenPhase::Write,
                    }),
                    Ok(()),
                )
            },
            ExecStatus::Restart => ctx.restart(),
        })
    }
}

impl<'ctx> StateMachine<TokenCopyCtx<'ctx>, TokenStepOut> for WriteUsingToken {
    fn step(&self, ctx: &mut TokenCopyCtx<'ctx>) -> TokenStepOut {
        flatten(self.run(ctx))
    }
}

impl Verify {
    fn run(&self, ctx: &mut TokenCopyCtx<'_>) -> Result<TokenStepOut, SptError> {
        let chunk = ctx.set.copy.verify_chunk_blocks;
        let OperationSet {
            sources,
            destination: dst,
            ..
        } = &mut *ctx.set;
        let Some(src) = sources.first_mut() else {
            return Ok(Transition::Next(TokenCopyStates::Advance(AdvanceWindows), Ok(())));
        };
        let (src_lba, dst_lba) = (src.current_lba, dst.current_lba);
        let done = compare_ranges(
            &mut src.ctx,
            src_lba,
            &mut dst.ctx,
            dst_lba,
            ctx.blocks,
            chunk,
            dst.dump_limit,
            &ctx.cancel,
        )?;
        if done == Completion::Interrupted {
            ctx.interrupted = true;
            return Ok(Transition::Done(Ok(())));
        }
        Ok(Transition::Next(TokenCopyStates::Advance(AdvanceWindows), Ok(())))
    }
}

impl<'ctx> StateMachine<TokenCopyCtx<'ctx>, TokenStepOut> for Verify {
    fn step(&self, ctx: &mut TokenCopyCtx<'ctx>) -> TokenStepOut {
        flatten(self.run(ctx))
    }
}

impl AdvanceWindows {
    fn run(&self, ctx: &mut TokenCopyCtx<'_>) -> Result<TokenStepOut, SptError> {
        ctx.passes += 1;
        ctx.blocks_copied += ctx.blocks;
        ctx.restarts = 0;
        if ctx.set.advance_all(ctx.blocks)? == Advance::EndOfData {
            return Ok(Transition::Done(Ok(())));
        }
        ctx.blocks = ctx.set.pass_blocks();
        if ctx.blocks == 0 {
            return Ok(Transition::Done(Ok(())));
        }
        Ok(Transition::Next(ctx.first_phase(), Ok(())))
    }
}

impl<'ctx> StateMachine<TokenCopyCtx<'ctx>, TokenStepOut> for AdvanceWindows {
    fn step(&self, ctx: &mut TokenCopyCtx<'ctx>) -> TokenStepOut {
        flatten(self.run(ctx))
    }
}

impl<'ctx> StateMachineCtx<TokenCopyCtx<'ctx>, Completion> for TokenCopyCtx<'ctx> {
    fn execute(&mut self, cancel: &CancellationToken) -> Result<Completion, SptError> {
        self.cancel = cancel.clone();
        loop {
            if cancel.is_cancelled() {
                return Ok(Completion::Interrupted);
            }
            let state = self
                .state
                .take()
                .ok_or_else(|| anyhow!("state must be set TokenCopyCtx"))?;
            let tr = match &state {
                TokenCopyStates::Init(s) => s.step(self),
                TokenCopyStates::PopulateToken(s) => s.step(self),
                TokenCopyStates::ReceiveTokenInfo(s) => s.step(self),
                TokenCopyStates::WriteUsingToken(s) => s.step(self),
                TokenCopyStates::Verify(s) => s.step(self),
                TokenCopyStates::Advance(s) => s.step(self),
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
                        "{}: token copy done, {} blocks in {} passes",
                        self.set.destination.dsf(),
                        self.blocks_copied,
                        self.passes
                    );
                    return Ok(Completion::Done);
                },
            }
        }
    }
}

/// Run a token copy of `set` to completion or interruption.
pub fn run_token_copy(
    set: &mut OperationSet,
    cancel: &CancellationToken,
) -> Result<Completion, SptError> {
    TokenCopyCtx::new(set).execute(cancel)
}

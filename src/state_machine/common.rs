// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tokio_util::sync::CancellationToken;

use crate::error::SptError;

pub enum Transition<S, R> {
    Next(S, R),
    Stay(R),
    Done(R),
}

/// One phase of a multi-command sequence. Steps block on the device.
pub trait StateMachine<Ctx, Resp>: Sized {
    fn step(&self, ctx: &mut Ctx) -> Resp;
}

/// Drives its states until `Done`, polling `cancel` between steps.
pub trait StateMachineCtx<Ctx, Out = ()>: Sized {
    fn execute(&mut self, cancel: &CancellationToken) -> Result<Out, SptError>;
}

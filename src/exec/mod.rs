// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Per-device command state and recovery policy.
pub mod context;
/// The execute loop.
pub mod engine;
/// Error reports and hex dumps.
pub mod report;
/// Retryability classification.
pub mod retry;
/// The pass-through primitive.
pub mod submit;

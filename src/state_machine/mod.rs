//! State machines driving multi-command copy sequences.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Common structures and traits for state machines.
pub mod common;
/// POPULATE TOKEN / WRITE USING TOKEN copy.
pub mod token_copy_states;
/// EXTENDED COPY (LID1) copy.
pub mod xcopy_states;

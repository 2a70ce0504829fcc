// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Capacity and designator discovery.
pub mod capacity;
/// Per-device transfer window state.
pub mod params;
/// Fixed and position-seeded fill patterns.
pub mod pattern;
/// Data comparison and miscompare reports.
pub mod verify;
/// The windowing state machine.
pub mod window;

/// How a cancellable loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Every block of the window was processed.
    Done,
    /// The interrupt token fired; work stopped at an iteration boundary.
    Interrupted,
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Source and destination windows of one copy, plus the shared buffers.
pub mod operation;
/// Block range descriptor lists.
pub mod ranges;
/// ROD token holder and persistence.
pub mod rod_token;
/// Copy and verify through plain READ / WRITE.
pub mod rw_copy;
/// EXTENDED COPY target and segment lists.
pub mod xcopy;

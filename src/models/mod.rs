//! This module defines the wire-level data types shared by the CDB builders,
//! the execution engine and the copy orchestration.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Big-endian field encode/decode for widths 1..=8.
pub mod byte_order;
/// Data direction and CDB buffer constants.
pub mod common;
/// Sense data parsing and ASC/ASCQ descriptions.
pub mod sense;
/// SCSI status codes and sense keys.
pub mod status;

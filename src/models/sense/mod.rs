//! SCSI sense data: fixed and descriptor formats plus the ASC/ASCQ text
//! table used by error reports.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// ASC/ASCQ description lookup.
pub mod asc_table;
/// Sense data parsing and nested copy sense extraction.
pub mod sense_data;

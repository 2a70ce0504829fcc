//! This crate drives SCSI commands through an OS pass-through path: it builds
//! CDBs, submits them, classifies and retries failures, walks transfer
//! windows, and orchestrates offload (token and extended) copy sequences.
// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Handles configuration, config path resolution, and logging.
pub mod cfg;
/// Builders and parsers for SCSI CDBs and parameter lists.
pub mod control_block;
/// Offload copy support: operation sets, range descriptors and segments.
pub mod copy;
/// Error types shared by the execution and copy layers.
pub mod error;
/// CDB execution, retry classification and error reporting.
pub mod exec;
/// Transfer windows, capacity discovery, fill patterns and data
/// verification.
pub mod io;
/// Wire-level data types: byte-order codec, SCSI status and sense data.
pub mod models;
/// Static opcode metadata table.
pub mod registry;
/// Runs independent operation sets on worker threads.
pub mod runner;
/// Contains the state machines that drive multi-command copy sequences.
pub mod state_machine;
/// Provides utility functions used throughout the crate.
pub mod utils;

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fmt, mem, time::Duration};

use crate::{
    cfg::config::Config,
    exec::submit::{SubmitRequest, Submitter},
    models::{
        byte_order::CodecError,
        common::{DEFAULT_SENSE_LEN, DataDirection},
        status::ScsiStatus,
    },
    registry::{
        self, OpcodeInfo,
        family::{Cdb, CdbFields},
    },
};

/// Retry behaviour of one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub enabled: bool,
    pub retry_limit: u32,
    pub delay: Duration,
    /// Return `Restart` to the caller instead of resubmitting the same CDB.
    pub restart_on_error: bool,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            retry_limit: 60,
            delay: Duration::from_secs(2),
            restart_on_error: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFlags {
    pub debug: bool,
    /// Report errors (retries and final failures). Failures are returned to
    /// the caller either way.
    pub errors: bool,
    /// Dump the raw sense bytes with every SCSI error report.
    pub show_sense: bool,
}

impl Default for LogFlags {
    fn default() -> Self {
        Self {
            debug: false,
            errors: true,
            show_sense: false,
        }
    }
}

/// Per-submission results, reset before every attempt except `retries`,
/// which counts attempts within one `execute`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    pub os_error: Option<i32>,
    pub scsi_status: ScsiStatus,
    pub host_status: u16,
    pub driver_status: u16,
    pub resid: usize,
    pub sense_len: usize,
    pub retries: u32,
}

impl Outcome {
    /// Device reported an error: non-good status or sense data returned.
    #[inline]
    pub fn scsi_error(&self) -> bool {
        self.os_error.is_none() && (self.scsi_status != ScsiStatus::Good || self.sense_len > 0)
    }

    #[inline]
    pub fn failed(&self) -> bool {
        self.os_error.is_some() || self.scsi_error()
    }

    fn clear(&mut self) {
        *self = Outcome {
            retries: self.retries,
            ..Default::default()
        };
    }
}

/// Everything needed to issue CDBs to one device.
pub struct CommandContext {
    device: Box<dyn Submitter>,
    /// Device special file (path) used in every report.
    pub dsf: String,
    pub device_type: u8,
    /// Logical block length, 0 until discovered.
    pub device_size: u32,
    /// Capacity in blocks, 0 until discovered.
    pub device_capacity: u64,
    pub cdb: Cdb,
    pub op: Option<&'static OpcodeInfo>,
    pub direction: DataDirection,
    pub data: Vec<u8>,
    pub data_length: usize,
    sense: Vec<u8>,
    pub timeout: Duration,
    pub log: LogFlags,
    pub recovery: RecoveryPolicy,
    pub outcome: Outcome,
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("dsf", &self.dsf)
            .field("device_size", &self.device_size)
            .field("device_capacity", &self.device_capacity)
            .field("cdb", &self.cdb)
            .field("direction", &self.direction)
            .field("data_length", &self.data_length)
            .field("outcome", &self.outcome)
            .finish()
    }
}

impl CommandContext {
    pub fn new(device: Box<dyn Submitter>, dsf: impl Into<String>) -> Self {
        Self {
            device,
            dsf: dsf.into(),
            device_type: 0,
            device_size: 0,
            device_capacity: 0,
            cdb: Cdb::default(),
            op: None,
            direction: DataDirection::None,
            data: Vec::new(),
            data_length: 0,
            sense: vec![0u8; DEFAULT_SENSE_LEN],
            timeout: Duration::from_secs(60),
            log: LogFlags::default(),
            recovery: RecoveryPolicy::default(),
            outcome: Outcome::default(),
        }
    }

    /// Context configured from the `recovery`, `logging` and `io` sections.
    pub fn from_config(device: Box<dyn Submitter>, dsf: impl Into<String>, cfg: &Config) -> Self {
        let mut ctx = Self::new(device, dsf);
        ctx.recovery = cfg.recovery.policy();
        ctx.log = cfg.logging.flags();
        ctx.timeout = cfg.io.timeout;
        ctx.sense = vec![0u8; cfg.io.sense_length as usize];
        ctx
    }

    /// Name of the current CDB for reports.
    pub fn cdb_name(&self) -> &'static str {
        match self.op {
            Some(info) => info.name,
            None => registry::opcode_name(self.cdb.as_slice(), self.device_type),
        }
    }

    #[inline]
    pub fn opcode(&self) -> u8 {
        self.cdb.bytes[0]
    }

    /// Build the CDB for `info` and adopt its data direction.
    pub fn prepare(
        &mut self,
        info: &'static OpcodeInfo,
        fields: &CdbFields,
    ) -> Result<(), CodecError> {
        self.cdb = info.build_cdb(fields)?;
        self.op = Some(info);
        self.direction = info.direction;
        Ok(())
    }

    /// Size the data buffer for `len` bytes. The allocation is reused and
    /// only grows.
    pub fn ensure_data_len(&mut self, len: usize) {
        if self.data.len() < len {
            self.data.resize(len, 0);
        }
        self.data_length = len;
    }

    /// Replace the data-out payload (parameter lists).
    pub fn set_data(&mut self, payload: &[u8]) {
        self.ensure_data_len(payload.len());
        self.data[..payload.len()].copy_from_slice(payload);
    }

    /// Valid sense bytes of the last submission.
    #[inline]
    pub fn sense(&self) -> &[u8] {
        &self.sense[..self.outcome.sense_len.min(self.sense.len())]
    }

    #[inline]
    pub fn data_transferred(&self) -> usize {
        self.data_length.saturating_sub(self.outcome.resid)
    }

    /// Data-in bytes actually returned by the last submission.
    #[inline]
    pub fn response(&self) -> &[u8] {
        &self.data[..self.data_transferred()]
    }

    pub(crate) fn reset_outcome(&mut self) {
        self.outcome.clear();
        self.sense.fill(0);
    }

    pub(crate) fn is_os_retryable(&self, os_error: i32) -> bool {
        self.device.is_os_retryable(os_error)
    }

    /// One pass-through call, outcome fields refreshed.
    pub(crate) fn submit_once(&mut self) {
        self.reset_outcome();
        let len = self.data_length.min(self.data.len());
        let req = SubmitRequest {
            cdb: self.cdb.as_slice(),
            direction: self.direction,
            data: &mut self.data[..len],
            timeout: self.timeout,
        };
        let out = self.device.submit(req, &mut self.sense);
        if let Some(errno) = out.os_error {
            self.outcome.os_error = Some(errno);
            self.sense.fill(0);
            return;
        }
        self.outcome.scsi_status = ScsiStatus::from(out.scsi_status);
        self.outcome.host_status = out.host_status;
        self.outcome.driver_status = out.driver_status;
        self.outcome.resid = out.resid.min(len);
        self.outcome.sense_len = out.sense_len.min(self.sense.len());
    }

    /// Run `f` with a scratch command, then put the current CDB, direction
    /// and data buffer back. Used for capacity and identification queries
    /// and verification reads issued in the middle of a windowed operation.
    pub fn with_scratch<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let cdb = self.cdb;
        let op = self.op;
        let direction = self.direction;
        let data_length = self.data_length;
        let data = mem::take(&mut self.data);

        let out = f(self);

        self.cdb = cdb;
        self.op = op;
        self.direction = direction;
        self.data_length = data_length;
        self.data = data;
        out
    }
}

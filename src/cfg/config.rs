// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    cfg::enums::{PatternKind, YesNo},
    exec::context::{LogFlags, RecoveryPolicy},
    io::pattern::{DEFAULT_IOT_SEED, DEFAULT_PATTERN, FillPattern},
    models::common::DEFAULT_SENSE_LEN,
};

/// Smallest sense buffer that still holds a full fixed-format header.
pub const MIN_SENSE_LEN: u16 = 18;

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Config {
    /// Retry and restart behaviour of the execution engine.
    #[serde(default)]
    pub recovery: RecoveryConfig,
    /// Which diagnostics the engine emits.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Transfer window and per-command knobs.
    #[serde(default)]
    pub io: IoConfig,
    /// Fill pattern and data verification.
    #[serde(default)]
    pub pattern: PatternConfig,
    /// Offload copy tuning.
    #[serde(default)]
    pub copy: CopyConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RecoveryConfig {
    #[serde(default = "yes", rename = "Enabled")]
    pub enabled: YesNo,

    #[serde(default = "default_retries", rename = "Retries")]
    /// Attempts per CDB before the failure is reported.
    pub retries: u32,

    #[serde(default = "default_delay", rename = "DelaySecs", with = "serde_secs")]
    pub delay: Duration,

    #[serde(default, rename = "RestartOnError")]
    /// Hand retryable errors back to the caller instead of resubmitting.
    pub restart_on_error: YesNo,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: YesNo::Yes,
            retries: default_retries(),
            delay: default_delay(),
            restart_on_error: YesNo::No,
        }
    }
}

impl RecoveryConfig {
    pub fn policy(&self) -> RecoveryPolicy {
        RecoveryPolicy {
            enabled: self.enabled.as_bool(),
            retry_limit: self.retries,
            delay: self.delay,
            restart_on_error: self.restart_on_error.as_bool(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LoggingConfig {
    #[serde(default, rename = "Debug")]
    pub debug: YesNo,
    #[serde(default = "yes", rename = "Errors")]
    pub errors: YesNo,
    #[serde(default, rename = "ShowSense")]
    pub show_sense: YesNo,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            debug: YesNo::No,
            errors: YesNo::Yes,
            show_sense: YesNo::No,
        }
    }
}

impl LoggingConfig {
    pub fn flags(&self) -> LogFlags {
        LogFlags {
            debug: self.debug.as_bool(),
            errors: self.errors.as_bool(),
            show_sense: self.show_sense.as_bool(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct IoConfig {
    #[serde(default = "default_timeout", rename = "TimeoutSecs", with = "serde_secs")]
    pub timeout: Duration,

    #[serde(default = "default_sense_length", rename = "SenseLength")]
    pub sense_length: u16,

    #[serde(default, rename = "DataLimit")]
    /// Bytes to move in total, 0 for the whole window.
    pub data_limit: u64,

    #[serde(default, rename = "StartingLba")]
    pub starting_lba: u64,

    #[serde(default, rename = "EndingLba")]
    /// Exclusive end of the window, 0 for device capacity.
    pub ending_lba: u64,

    #[serde(default, rename = "BlockLimit")]
    pub block_limit: u64,

    #[serde(default, rename = "StepValue")]
    /// Bytes skipped between transfers (strided access).
    pub step_value: u64,

    #[serde(default, rename = "Blocks")]
    /// Explicit block count per CDB, 0 for the opcode default.
    pub blocks: u64,

    #[serde(default, rename = "Bypass")]
    /// Allow block counts above the opcode maximum.
    pub bypass: YesNo,

    #[serde(default, rename = "DisableLengthCheck")]
    pub disable_length_check: YesNo,

    #[serde(default = "default_dump_limit", rename = "DumpLimit")]
    /// Bytes of context shown around a miscompare.
    pub dump_limit: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            sense_length: default_sense_length(),
            data_limit: 0,
            starting_lba: 0,
            ending_lba: 0,
            block_limit: 0,
            step_value: 0,
            blocks: 0,
            bypass: YesNo::No,
            disable_length_check: YesNo::No,
            dump_limit: default_dump_limit(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PatternConfig {
    #[serde(default, rename = "Kind")]
    pub kind: PatternKind,
    #[serde(default = "default_pattern", rename = "Value")]
    pub value: u32,
    #[serde(default = "default_iot_seed", rename = "IotSeed")]
    pub iot_seed: u32,
    #[serde(default, rename = "Compare")]
    /// Compare data read back against the expected pattern or source.
    pub compare: YesNo,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            kind: PatternKind::None,
            value: DEFAULT_PATTERN,
            iot_seed: DEFAULT_IOT_SEED,
            compare: YesNo::No,
        }
    }
}

impl PatternConfig {
    pub fn fill_pattern(&self) -> FillPattern {
        FillPattern {
            kind: self.kind,
            value: self.value,
            iot_seed: self.iot_seed,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CopyConfig {
    #[serde(default = "one", rename = "RangeCount")]
    /// Block range descriptors per POPULATE TOKEN / WRITE USING TOKEN.
    pub range_count: u32,

    #[serde(default = "one", rename = "SegmentCount")]
    /// Segment descriptors per EXTENDED COPY.
    pub segment_count: u32,

    #[serde(default, rename = "ZeroToken")]
    /// Write zeroes with the well-known zero ROD token, no POPULATE TOKEN.
    pub zero_token: YesNo,

    #[serde(default, rename = "InactivityTimeout")]
    pub inactivity_timeout: u32,

    #[serde(default = "default_verify_chunk", rename = "VerifyChunkBlocks")]
    pub verify_chunk_blocks: u64,

    #[serde(default, rename = "TokenFile", skip_serializing_if = "Option::is_none")]
    /// Where to save each populated ROD token.
    pub token_file: Option<PathBuf>,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            range_count: 1,
            segment_count: 1,
            zero_token: YesNo::No,
            inactivity_timeout: 0,
            verify_chunk_blocks: default_verify_chunk(),
            token_file: None,
        }
    }
}

fn yes() -> YesNo {
    YesNo::Yes
}
fn one() -> u32 {
    1
}
fn default_retries() -> u32 {
    60
}
fn default_delay() -> Duration {
    Duration::from_secs(2)
}
fn default_timeout() -> Duration {
    Duration::from_secs(60)
}
fn default_sense_length() -> u16 {
    DEFAULT_SENSE_LEN as u16
}
fn default_dump_limit() -> usize {
    1024
}
fn default_pattern() -> u32 {
    DEFAULT_PATTERN
}
fn default_iot_seed() -> u32 {
    DEFAULT_IOT_SEED
}
fn default_verify_chunk() -> u64 {
    256
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {path:?}"))?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        if self.recovery.enabled.as_bool() {
            ensure!(
                self.recovery.retries >= 1,
                "Retries must be >= 1 when recovery is enabled"
            );
        }
        ensure!(
            (MIN_SENSE_LEN..=DEFAULT_SENSE_LEN as u16).contains(&self.io.sense_length),
            "SenseLength must be within {MIN_SENSE_LEN}..={DEFAULT_SENSE_LEN}"
        );
        ensure!(
            self.io.dump_limit >= 16,
            "DumpLimit must be >= 16 (one dump line)"
        );
        ensure!(self.copy.range_count >= 1, "RangeCount must be >= 1");
        ensure!(self.copy.segment_count >= 1, "SegmentCount must be >= 1");
        ensure!(
            self.copy.verify_chunk_blocks >= 1,
            "VerifyChunkBlocks must be >= 1"
        );
        if self.io.ending_lba != 0 {
            ensure!(
                self.io.ending_lba >= self.io.starting_lba,
                "EndingLba must not be below StartingLba"
            );
        }

        // Zero-token copies have no source data to compare against.
        if self.copy.zero_token.as_bool() && self.pattern.compare.as_bool() {
            debug!("ZeroToken set, disabling Compare");
            self.pattern.compare = YesNo::No;
        }

        Ok(())
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

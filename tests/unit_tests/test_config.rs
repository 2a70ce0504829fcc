use std::time::Duration;

use anyhow::{Context, Result};
use spt_rs::cfg::{
    cli::resolve_config_path,
    config::Config,
    enums::{PatternKind, YesNo},
};

fn load() -> Result<Config> {
    resolve_config_path("tests/config.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")
}

#[test]
fn loads_every_section() -> Result<()> {
    let cfg = load()?;

    assert_eq!(cfg.recovery.retries, 10);
    assert_eq!(cfg.recovery.delay, Duration::ZERO);
    assert_eq!(cfg.recovery.restart_on_error, YesNo::No);
    assert!(cfg.logging.flags().show_sense);
    assert_eq!(cfg.io.timeout, Duration::from_secs(30));
    assert_eq!(cfg.io.sense_length, 96);
    assert_eq!(cfg.io.ending_lba, 2048);
    assert_eq!(cfg.io.blocks, 128);
    assert_eq!(cfg.io.dump_limit, 512);
    assert_eq!(cfg.pattern.kind, PatternKind::Iot);
    assert_eq!(cfg.pattern.iot_seed, 0x0101_0101);
    assert_eq!(cfg.pattern.value, 0x39C3_9C39);
    assert_eq!(cfg.copy.range_count, 4);
    assert_eq!(cfg.copy.segment_count, 2);
    assert_eq!(cfg.copy.verify_chunk_blocks, 64);
    assert!(cfg.copy.token_file.is_none());

    let policy = cfg.recovery.policy();
    assert!(policy.enabled);
    assert_eq!(policy.retry_limit, 10);
    Ok(())
}

#[test]
fn empty_document_takes_defaults() -> Result<()> {
    let mut cfg: Config = serde_yaml::from_str("{}")?;
    cfg.validate_and_normalize()?;

    assert_eq!(cfg.recovery.retries, 60);
    assert_eq!(cfg.recovery.delay, Duration::from_secs(2));
    assert_eq!(cfg.io.sense_length, 255);
    assert_eq!(cfg.pattern.kind, PatternKind::None);
    assert_eq!(cfg.copy.range_count, 1);
    Ok(())
}

#[test]
fn zero_token_turns_compare_off() -> Result<()> {
    let mut cfg = load()?;
    cfg.copy.zero_token = YesNo::Yes;
    cfg.validate_and_normalize()?;
    assert_eq!(cfg.pattern.compare, YesNo::No);
    Ok(())
}

#[test]
fn rejects_out_of_range_values() -> Result<()> {
    let mut cfg = load()?;
    cfg.io.sense_length = 8;
    assert!(cfg.validate_and_normalize().is_err());

    let mut cfg = load()?;
    cfg.copy.segment_count = 0;
    assert!(cfg.validate_and_normalize().is_err());

    let mut cfg = load()?;
    cfg.io.starting_lba = 4096;
    assert!(cfg.validate_and_normalize().is_err());

    let mut cfg = load()?;
    cfg.io.dump_limit = 8;
    assert!(cfg.validate_and_normalize().is_err());
    Ok(())
}

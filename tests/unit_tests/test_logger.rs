use anyhow::Result;
use serial_test::serial;
use spt_rs::cfg::logger::{LogConfig, init_logger};
use tracing::info;

#[test]
#[serial]
fn logger_config_parses() -> Result<()> {
    let cfg = LogConfig::load("tests/config_logger.yaml")?;
    assert_eq!(cfg.level, "debug");
    assert_eq!(cfg.output, "stdout");
    assert!(cfg.is_show_line);
    assert!(!cfg.is_show_target);
    assert!(cfg.file.is_none());
    Ok(())
}

#[test]
#[serial]
fn installs_the_global_subscriber_once() -> Result<()> {
    let guard = init_logger("tests/config_logger.yaml")?;
    info!(device = "/dev/sim0", blocks = 8u64, "logger ready");
    assert!(init_logger("tests/config_logger.yaml").is_err());
    drop(guard);
    Ok(())
}

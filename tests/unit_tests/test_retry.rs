use anyhow::Result;
use spt_rs::{
    cfg::{config::Config, enums::YesNo},
    control_block::read::READ16,
    error::{ScsiError, SptError},
    exec::{
        context::CommandContext,
        engine::{ExecStatus, issue},
    },
    models::status::{ScsiStatus, SenseKey},
    registry::{self, family::CdbFields},
};

use super::sim_device::{
    Array, BECOMING_READY, BUSY, EAGAIN, EIO, Fault, INVALID_FIELD, SharedArray, SimDevice,
    UNIT_ATTENTION, quick_config,
};

fn setup(cfg: &Config) -> (SharedArray, CommandContext) {
    let array = Array::shared();
    array.lock().expect("array").add_lun(64, 512);
    let ctx = CommandContext::from_config(SimDevice::boxed(&array, 0), "/dev/sim0", cfg);
    (array, ctx)
}

fn read_one(ctx: &mut CommandContext) -> Result<ExecStatus, SptError> {
    let info = registry::lookup(READ16, None, 0).expect("READ(16) entry");
    let fields = CdbFields {
        lba: 1,
        blocks: 1,
        ..Default::default()
    };
    issue(ctx, info, &fields, 512)
}

fn reads(array: &SharedArray) -> usize {
    array.lock().expect("array").luns[0].count(READ16)
}

#[test]
fn busy_is_retried_until_good() -> Result<()> {
    let (array, mut ctx) = setup(&quick_config());
    {
        let mut a = array.lock().expect("array");
        a.inject(0, READ16, Fault::Status(BUSY));
        a.inject(0, READ16, Fault::Status(BUSY));
    }

    assert_eq!(read_one(&mut ctx)?, ExecStatus::Success);
    assert_eq!(ctx.outcome.retries, 2);
    assert_eq!(reads(&array), 3);
    assert_eq!(ctx.data_transferred(), 512);
    Ok(())
}

#[test]
fn becoming_ready_is_retried() -> Result<()> {
    let (array, mut ctx) = setup(&quick_config());
    array
        .lock()
        .expect("array")
        .inject(0, READ16, Fault::Check(BECOMING_READY));

    assert_eq!(read_one(&mut ctx)?, ExecStatus::Success);
    assert_eq!(reads(&array), 2);
    Ok(())
}

#[test]
fn illegal_request_fails_at_once() {
    let (array, mut ctx) = setup(&quick_config());
    array
        .lock()
        .expect("array")
        .inject(0, READ16, Fault::Check(INVALID_FIELD));

    let err = read_one(&mut ctx).expect_err("must fail");
    match err {
        SptError::Exec(e @ ScsiError::Scsi { .. }) => {
            let sense = e.sense().expect("sense summary");
            assert_eq!(sense.key, SenseKey::IllegalRequest);
            assert_eq!((sense.asc, sense.ascq), (0x24, 0x00));
            assert!(e.to_string().contains("/dev/sim0"));
        },
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(reads(&array), 1);
}

#[test]
fn retry_limit_bounds_attempts() {
    let mut cfg = quick_config();
    cfg.recovery.retries = 3;
    let (array, mut ctx) = setup(&cfg);
    {
        let mut a = array.lock().expect("array");
        for _ in 0..5 {
            a.inject(0, READ16, Fault::Status(BUSY));
        }
    }

    assert!(read_one(&mut ctx).is_err());
    // The first attempt plus three retries.
    assert_eq!(reads(&array), 4);
}

#[test]
fn disabled_recovery_never_retries() {
    let mut cfg = quick_config();
    cfg.recovery.enabled = YesNo::No;
    let (array, mut ctx) = setup(&cfg);
    array
        .lock()
        .expect("array")
        .inject(0, READ16, Fault::Status(BUSY));

    assert!(read_one(&mut ctx).is_err());
    assert_eq!(reads(&array), 1);
}

#[test]
fn restart_on_error_hands_back_restart() -> Result<()> {
    let mut cfg = quick_config();
    cfg.recovery.restart_on_error = YesNo::Yes;
    let (array, mut ctx) = setup(&cfg);
    array
        .lock()
        .expect("array")
        .inject(0, READ16, Fault::Check(UNIT_ATTENTION));

    assert_eq!(read_one(&mut ctx)?, ExecStatus::Restart);
    assert_eq!(reads(&array), 1);
    // The fault is gone: the caller's redo succeeds.
    assert_eq!(read_one(&mut ctx)?, ExecStatus::Success);
    Ok(())
}

#[test]
fn os_errors_follow_the_submitter() -> Result<()> {
    let (array, mut ctx) = setup(&quick_config());
    array
        .lock()
        .expect("array")
        .inject(0, READ16, Fault::Os(EAGAIN));
    assert_eq!(read_one(&mut ctx)?, ExecStatus::Success);

    array.lock().expect("array").inject(0, READ16, Fault::Os(EIO));
    match read_one(&mut ctx) {
        Err(SptError::Exec(ScsiError::Transport { os_error, .. })) => assert_eq!(os_error, EIO),
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}

#[test]
fn os_failure_never_reports_the_previous_sense() {
    let mut cfg = quick_config();
    cfg.recovery.enabled = YesNo::No;
    let (array, mut ctx) = setup(&cfg);
    array
        .lock()
        .expect("array")
        .inject(0, READ16, Fault::Check(INVALID_FIELD));

    assert!(read_one(&mut ctx).is_err());
    assert_eq!(ctx.outcome.scsi_status, ScsiStatus::CheckCondition);
    assert_eq!(ctx.sense().len(), 18);
    assert!(ctx.outcome.scsi_error());

    array.lock().expect("array").inject(0, READ16, Fault::Os(EIO));
    match read_one(&mut ctx) {
        Err(SptError::Exec(ScsiError::Transport { os_error, .. })) => assert_eq!(os_error, EIO),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(ctx.outcome.os_error, Some(EIO));
    assert_eq!(ctx.outcome.scsi_status, ScsiStatus::Good);
    assert!(ctx.sense().is_empty());
    assert!(!ctx.outcome.scsi_error());
}

use anyhow::Result;
use spt_rs::{
    control_block::{read::READ16, write::WRITE16},
    io::Completion,
    runner::{CopyMode, DeviceHandle, Job, build_operation_set, copy_opcodes, run_jobs},
};
use tokio_util::sync::CancellationToken;

use super::sim_device::{Array, SharedArray, SimDevice, quick_config};

fn pair(blocks: u64) -> SharedArray {
    let array = Array::shared();
    {
        let mut a = array.lock().expect("array");
        a.add_lun(blocks, 512);
        a.add_lun(blocks, 512);
        a.fill_distinct(0);
    }
    array
}

fn job(name: &str, array: &SharedArray, mode: CopyMode) -> Result<Job> {
    let mut cfg = quick_config();
    cfg.io.blocks = 32;
    let set = build_operation_set(
        mode,
        vec![DeviceHandle::new(format!("{name}-src"), SimDevice::boxed(array, 0))],
        DeviceHandle::new(format!("{name}-dst"), SimDevice::boxed(array, 1)),
        &cfg,
    )?;
    Ok(Job {
        name: name.to_string(),
        set,
        mode,
    })
}

#[test]
fn opcodes_per_mode() -> Result<()> {
    let (src, dst) = copy_opcodes(CopyMode::ReadWrite, 0)?;
    assert_eq!((src.opcode, dst.opcode), (READ16, WRITE16));
    let (src, dst) = copy_opcodes(CopyMode::Token, 0)?;
    assert_eq!((src.subcode, dst.subcode), (Some(0x10), Some(0x11)));
    let (_, dst) = copy_opcodes(CopyMode::Extended, 0)?;
    assert_eq!(dst.subcode, Some(0x00));
    Ok(())
}

#[tokio::test]
async fn jobs_run_side_by_side() -> Result<()> {
    let token = pair(96);
    let rw = pair(96);
    let jobs = vec![
        job("token", &token, CopyMode::Token)?,
        job("rw", &rw, CopyMode::ReadWrite)?,
    ];

    let reports = run_jobs(jobs, CancellationToken::new()).await?;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].name, "token");
    assert_eq!(reports[1].name, "rw");
    assert!(reports.iter().all(|r| r.succeeded()));
    for array in [&token, &rw] {
        let a = array.lock().expect("array");
        assert!(a.luns[0].data == a.luns[1].data);
    }
    Ok(())
}

#[tokio::test]
async fn cancelled_jobs_report_interruption() -> Result<()> {
    let array = pair(64);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let reports = run_jobs(vec![job("rw", &array, CopyMode::ReadWrite)?], cancel).await?;

    assert!(matches!(reports[0].result, Ok(Completion::Interrupted)));
    assert!(!reports[0].succeeded());
    Ok(())
}

#[tokio::test]
async fn failures_stay_with_their_job() -> Result<()> {
    let good = pair(32);
    let bad = pair(32);
    let jobs = vec![
        job("good", &good, CopyMode::ReadWrite)?,
        job("bad", &bad, CopyMode::Verify)?,
    ];

    let reports = run_jobs(jobs, CancellationToken::new()).await?;

    assert!(reports[0].succeeded());
    // Verify of a filled source against an empty destination.
    assert!(reports[1].result.is_err());
    Ok(())
}

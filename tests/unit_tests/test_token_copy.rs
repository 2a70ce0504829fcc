use std::fs;

use anyhow::Result;
use spt_rs::{
    cfg::{config::Config, enums::YesNo},
    control_block::{read::READ16, receive_copy::THIRD_PARTY_COPY_IN, token::THIRD_PARTY_COPY_OUT},
    copy::operation::OperationSet,
    error::SptError,
    io::Completion,
    runner::{CopyMode, DeviceHandle, build_operation_set, run_copy},
};
use tokio_util::sync::CancellationToken;

use super::sim_device::{Array, Fault, SharedArray, SimDevice, UNIT_ATTENTION, quick_config};

fn two_luns(blocks: u64) -> SharedArray {
    let array = Array::shared();
    {
        let mut a = array.lock().expect("array");
        a.add_lun(blocks, 512);
        a.add_lun(blocks, 512);
        a.fill_distinct(0);
    }
    array
}

fn token_set(array: &SharedArray, src_lun: usize, dst_lun: usize, cfg: &Config) -> OperationSet {
    build_operation_set(
        CopyMode::Token,
        vec![DeviceHandle::new("/dev/src", SimDevice::boxed(array, src_lun))],
        DeviceHandle::new("/dev/dst", SimDevice::boxed(array, dst_lun)),
        cfg,
    )
    .expect("operation set")
}

fn copy(set: &mut OperationSet) -> Result<Completion, SptError> {
    run_copy(set, CopyMode::Token, &CancellationToken::new())
}

#[test]
fn copies_the_whole_source_in_passes() -> Result<()> {
    let array = two_luns(200);
    let mut cfg = quick_config();
    cfg.io.blocks = 64;
    let mut set = token_set(&array, 0, 1, &cfg);

    assert_eq!(copy(&mut set)?, Completion::Done);

    let a = array.lock().expect("array");
    assert!(a.luns[0].data == a.luns[1].data);
    // 64 + 64 + 64 + 8 blocks.
    assert_eq!(a.luns[0].count(THIRD_PARTY_COPY_OUT), 4);
    assert_eq!(a.luns[1].count(THIRD_PARTY_COPY_OUT), 4);
    assert_eq!(a.luns[0].count(THIRD_PARTY_COPY_IN), 4);
    assert_eq!(a.luns[1].count(THIRD_PARTY_COPY_IN), 4);
    Ok(())
}

#[test]
fn range_descriptors_split_each_pass() -> Result<()> {
    let array = two_luns(90);
    let mut cfg = quick_config();
    cfg.copy.range_count = 4;
    let mut set = token_set(&array, 0, 1, &cfg);

    copy(&mut set)?;

    let a = array.lock().expect("array");
    assert!(a.luns[0].data == a.luns[1].data);
    // One pass: the default token transfer covers the 90 block window.
    assert_eq!(a.luns[1].count(THIRD_PARTY_COPY_OUT), 1);
    Ok(())
}

#[test]
fn compare_reads_both_sides_after_each_pass() -> Result<()> {
    let array = two_luns(128);
    let mut cfg = quick_config();
    cfg.io.blocks = 64;
    cfg.pattern.compare = YesNo::Yes;
    let mut set = token_set(&array, 0, 1, &cfg);

    assert_eq!(copy(&mut set)?, Completion::Done);
    let a = array.lock().expect("array");
    assert_eq!(a.luns[0].count(READ16), 2);
    assert_eq!(a.luns[1].count(READ16), 2);
    Ok(())
}

#[test]
fn zero_token_clears_the_destination() -> Result<()> {
    let array = Array::shared();
    {
        let mut a = array.lock().expect("array");
        a.add_lun(100, 512);
        a.fill_distinct(0);
    }
    let mut cfg = quick_config();
    cfg.copy.zero_token = YesNo::Yes;
    cfg.pattern.compare = YesNo::Yes;
    let mut set = build_operation_set(
        CopyMode::Token,
        Vec::new(),
        DeviceHandle::new("/dev/dst", SimDevice::boxed(&array, 0)),
        &cfg,
    )?;
    assert!(!set.compare);

    assert_eq!(copy(&mut set)?, Completion::Done);
    let a = array.lock().expect("array");
    assert!(a.luns[0].data.iter().all(|&b| b == 0));
    assert_eq!(a.luns[0].count(THIRD_PARTY_COPY_OUT), 1);
    assert_eq!(a.luns[0].count(READ16), 0);
    Ok(())
}

#[test]
fn wrong_token_descriptor_length_is_fatal() {
    let array = two_luns(64);
    array.lock().expect("array").token_desc_len = Some(0x100);
    let mut set = token_set(&array, 0, 1, &quick_config());

    assert!(matches!(copy(&mut set), Err(SptError::Protocol { .. })));
    let a = array.lock().expect("array");
    assert_eq!(a.luns[1].count(THIRD_PARTY_COPY_OUT), 0);
    assert!(a.luns[1].data.iter().all(|&b| b == 0));
}

#[test]
fn failed_copy_status_is_fatal() {
    let array = two_luns(64);
    array.lock().expect("array").copy_status = Some(0x02);
    let mut set = token_set(&array, 0, 1, &quick_config());

    match copy(&mut set) {
        Err(SptError::Protocol { device, message }) => {
            assert_eq!(device, "/dev/src");
            assert!(message.contains("failure"), "{message}");
        },
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn same_lun_copies_lower_half_to_upper_half() -> Result<()> {
    let array = Array::shared();
    {
        let mut a = array.lock().expect("array");
        a.add_lun(200, 512);
        a.fill_distinct(0);
    }
    let mut set = token_set(&array, 0, 0, &quick_config());

    assert_eq!(copy(&mut set)?, Completion::Done);
    assert_eq!(set.sources[0].ending_lba, 100);
    assert_eq!(set.destination.starting_lba, 100);

    let a = array.lock().expect("array");
    for lba in 0..100u64 {
        assert_eq!(a.luns[0].block(lba), a.luns[0].block(lba + 100), "lba {lba}");
    }
    Ok(())
}

#[test]
fn restart_repopulates_the_token() -> Result<()> {
    let array = two_luns(128);
    array
        .lock()
        .expect("array")
        .inject(1, THIRD_PARTY_COPY_OUT, Fault::Check(UNIT_ATTENTION));
    let mut cfg = quick_config();
    cfg.io.blocks = 64;
    cfg.recovery.restart_on_error = YesNo::Yes;
    let mut set = token_set(&array, 0, 1, &cfg);

    assert_eq!(copy(&mut set)?, Completion::Done);
    let a = array.lock().expect("array");
    assert!(a.luns[0].data == a.luns[1].data);
    assert_eq!(a.luns[0].count(THIRD_PARTY_COPY_OUT), 3);
    assert_eq!(a.luns[1].count(THIRD_PARTY_COPY_OUT), 3);
    Ok(())
}

#[test]
fn populated_token_is_saved_to_the_token_file() -> Result<()> {
    let path = std::env::temp_dir().join(format!("spt-rs-token-{}.bin", std::process::id()));
    let array = two_luns(32);
    let mut cfg = quick_config();
    cfg.copy.token_file = Some(path.clone());
    let mut set = token_set(&array, 0, 1, &cfg);

    copy(&mut set)?;
    let saved = fs::read(&path)?;
    fs::remove_file(&path)?;
    assert_eq!(saved.len(), 512);
    assert_eq!(&saved[..4], &[0x00, 0x01, 0x00, 0x00]);
    Ok(())
}

#[test]
fn several_sources_are_rejected() -> Result<()> {
    let array = two_luns(32);
    array.lock().expect("array").add_lun(32, 512);
    let cfg = quick_config();
    let mut set = build_operation_set(
        CopyMode::Token,
        vec![
            DeviceHandle::new("/dev/src0", SimDevice::boxed(&array, 0)),
            DeviceHandle::new("/dev/src1", SimDevice::boxed(&array, 1)),
        ],
        DeviceHandle::new("/dev/dst", SimDevice::boxed(&array, 2)),
        &cfg,
    )?;

    assert!(matches!(copy(&mut set), Err(SptError::Config(_))));
    Ok(())
}

#[test]
fn interrupt_stops_before_any_command() -> Result<()> {
    let array = two_luns(32);
    let mut set = token_set(&array, 0, 1, &quick_config());
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert_eq!(run_copy(&mut set, CopyMode::Token, &cancel)?, Completion::Interrupted);
    assert!(array.lock().expect("array").luns[1].cdbs.is_empty());
    Ok(())
}

use anyhow::Result;
use spt_rs::{
    cfg::{config::Config, enums::YesNo},
    control_block::{read::READ16, write::WRITE16},
    copy::operation::OperationSet,
    error::SptError,
    io::Completion,
    runner::{CopyMode, DeviceHandle, build_operation_set, run_copy},
};
use tokio_util::sync::CancellationToken;

use super::sim_device::{Array, SharedArray, SimDevice, quick_config};

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

fn rw_set(array: &SharedArray, mode: CopyMode, cfg: &Config) -> OperationSet {
    build_operation_set(
        mode,
        vec![DeviceHandle::new("/dev/src", SimDevice::boxed(array, 0))],
        DeviceHandle::new("/dev/dst", SimDevice::boxed(array, 1)),
        cfg,
    )
    .expect("operation set")
}

fn blocks_config(blocks: u64) -> Config {
    let mut cfg = quick_config();
    cfg.io.blocks = blocks;
    cfg
}

#[test]
fn read_write_copy_moves_every_block() -> Result<()> {
    let array = two_luns(200);
    let mut set = rw_set(&array, CopyMode::ReadWrite, &blocks_config(64));

    assert_eq!(
        run_copy(&mut set, CopyMode::ReadWrite, &CancellationToken::new())?,
        Completion::Done
    );
    let a = array.lock().expect("array");
    assert!(a.luns[0].data == a.luns[1].data);
    assert_eq!(a.luns[0].count(READ16), 4);
    assert_eq!(a.luns[1].count(WRITE16), 4);
    assert_eq!(a.luns[1].count(READ16), 0);
    Ok(())
}

#[test]
fn compare_reads_back_every_write() -> Result<()> {
    let array = two_luns(128);
    let mut cfg = blocks_config(32);
    cfg.pattern.compare = YesNo::Yes;
    let mut set = rw_set(&array, CopyMode::ReadWrite, &cfg);

    run_copy(&mut set, CopyMode::ReadWrite, &CancellationToken::new())?;
    let a = array.lock().expect("array");
    assert!(a.luns[0].data == a.luns[1].data);
    assert_eq!(a.luns[1].count(READ16), 4);
    Ok(())
}

#[test]
fn verify_passes_on_identical_devices() -> Result<()> {
    let array = two_luns(100);
    {
        let mut a = array.lock().expect("array");
        let copy = a.luns[0].data.clone();
        a.luns[1].data = copy;
    }
    let mut set = rw_set(&array, CopyMode::Verify, &blocks_config(40));

    assert_eq!(
        run_copy(&mut set, CopyMode::Verify, &CancellationToken::new())?,
        Completion::Done
    );
    assert_eq!(array.lock().expect("array").luns[1].count(WRITE16), 0);
    Ok(())
}

#[test]
fn verify_reports_the_first_differing_block() {
    let array = two_luns(128);
    {
        let mut a = array.lock().expect("array");
        let mut copy = a.luns[0].data.clone();
        copy[70 * 512 + 5] ^= 0x55;
        a.luns[1].data = copy;
    }
    let mut set = rw_set(&array, CopyMode::Verify, &blocks_config(64));

    match run_copy(&mut set, CopyMode::Verify, &CancellationToken::new()) {
        Err(SptError::Verify {
            source_device,
            destination_device,
            offset,
            lba,
        }) => {
            assert_eq!(source_device, "/dev/src");
            assert_eq!(destination_device, "/dev/dst");
            assert_eq!(offset, 6 * 512 + 5);
            assert_eq!(lba, 70);
        },
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn write_command_cannot_verify() {
    let array = two_luns(16);
    let mut set = rw_set(&array, CopyMode::ReadWrite, &quick_config());

    assert!(matches!(
        run_copy(&mut set, CopyMode::Verify, &CancellationToken::new()),
        Err(SptError::Config(_))
    ));
}

/// Two sources with distinct contents followed by a destination.
fn sources_then_destination(sources: &[u64], dst: u64) -> SharedArray {
    let array = Array::shared();
    {
        let mut a = array.lock().expect("array");
        for (n, &blocks) in sources.iter().enumerate() {
            let lun = a.add_lun(blocks, 512);
            a.fill_distinct(lun);
            for b in a.luns[lun].data.iter_mut() {
                *b ^= (n as u8) << 7;
            }
        }
        a.add_lun(dst, 512);
    }
    array
}

fn multi_source_set(array: &SharedArray, sources: usize, cfg: &Config) -> OperationSet {
    let handles = (0..sources)
        .map(|lun| DeviceHandle::new(format!("/dev/src{lun}"), SimDevice::boxed(array, lun)))
        .collect();
    build_operation_set(
        CopyMode::ReadWrite,
        handles,
        DeviceHandle::new("/dev/dst", SimDevice::boxed(array, sources)),
        cfg,
    )
    .expect("operation set")
}

#[test]
fn sources_are_copied_back_to_back() -> Result<()> {
    let array = sources_then_destination(&[40, 60], 100);
    let mut set = multi_source_set(&array, 2, &blocks_config(16));

    assert_eq!(
        run_copy(&mut set, CopyMode::ReadWrite, &CancellationToken::new())?,
        Completion::Done
    );
    let a = array.lock().expect("array");
    assert_eq!(a.luns[2].data[..40 * 512], a.luns[0].data[..]);
    assert_eq!(a.luns[2].data[40 * 512..], a.luns[1].data[..]);
    // 16 + 16 + 8 from the first source, then 16 * 3 + 12 from the second.
    assert_eq!(a.luns[0].count(READ16), 3);
    assert_eq!(a.luns[1].count(READ16), 4);
    assert_eq!(a.luns[2].count(WRITE16), 7);
    Ok(())
}

#[test]
fn full_destination_stops_the_remaining_sources() -> Result<()> {
    let array = sources_then_destination(&[50, 50], 60);
    let mut set = multi_source_set(&array, 2, &blocks_config(10));

    assert_eq!(
        run_copy(&mut set, CopyMode::ReadWrite, &CancellationToken::new())?,
        Completion::Done
    );
    let a = array.lock().expect("array");
    assert_eq!(a.luns[2].data[..50 * 512], a.luns[0].data[..]);
    assert_eq!(a.luns[2].data[50 * 512..], a.luns[1].data[..10 * 512]);
    assert_eq!(a.luns[1].count(READ16), 1);
    assert_eq!(a.luns[2].count(WRITE16), 6);
    Ok(())
}

#[test]
fn discovery_records_block_limits() -> Result<()> {
    let array = two_luns(64);
    array.lock().expect("array").luns[1].max_unmap = None;
    let mut set = rw_set(&array, CopyMode::ReadWrite, &quick_config());

    set.prepare()?;
    assert_eq!(set.sources[0].caps.max_unmap_lba_count, 0x0010_0000);
    assert_eq!(set.sources[0].caps.max_transfer_length, 0x1000);
    // The destination rejects the page and simply reports nothing.
    assert!(set.destination.caps.block_limits_known);
    assert_eq!(set.destination.caps.max_unmap_lba_count, 0);
    assert!(set.destination.caps.designator.is_some());
    Ok(())
}

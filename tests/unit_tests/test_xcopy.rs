use anyhow::Result;
use spt_rs::{
    cfg::{config::Config, enums::YesNo},
    control_block::{read::READ16, token::THIRD_PARTY_COPY_OUT},
    copy::{operation::OperationSet, xcopy::plan_segments},
    io::Completion,
    runner::{CopyMode, DeviceHandle, build_operation_set, run_copy},
};
use tokio_util::sync::CancellationToken;

use super::sim_device::{Array, SharedArray, SimDevice, quick_config};

fn array(sizes: &[u64]) -> SharedArray {
    let array = Array::shared();
    {
        let mut a = array.lock().expect("array");
        for &blocks in sizes {
            let lun = a.add_lun(blocks, 512);
            a.fill_distinct(lun);
        }
    }
    array
}

fn xcopy_set(array: &SharedArray, sources: &[usize], dst: usize, cfg: &Config) -> OperationSet {
    let sources = sources
        .iter()
        .map(|&lun| DeviceHandle::new(format!("/dev/src{lun}"), SimDevice::boxed(array, lun)))
        .collect();
    build_operation_set(
        CopyMode::Extended,
        sources,
        DeviceHandle::new("/dev/dst", SimDevice::boxed(array, dst)),
        cfg,
    )
    .expect("operation set")
}

fn copy(set: &mut OperationSet) -> Result<Completion> {
    Ok(run_copy(set, CopyMode::Extended, &CancellationToken::new())?)
}

#[test]
fn single_source_in_one_command() -> Result<()> {
    let array = array(&[300, 300]);
    let mut cfg = quick_config();
    cfg.copy.segment_count = 2;
    let mut set = xcopy_set(&array, &[0], 1, &cfg);

    assert_eq!(copy(&mut set)?, Completion::Done);
    let a = array.lock().expect("array");
    assert!(a.luns[0].data == a.luns[1].data);
    assert_eq!(a.luns[1].count(THIRD_PARTY_COPY_OUT), 1);
    Ok(())
}

#[test]
fn explicit_block_count_takes_several_commands() -> Result<()> {
    let array = array(&[100, 100]);
    let mut cfg = quick_config();
    cfg.io.blocks = 25;
    let mut set = xcopy_set(&array, &[0], 1, &cfg);

    assert_eq!(copy(&mut set)?, Completion::Done);
    let a = array.lock().expect("array");
    assert!(a.luns[0].data == a.luns[1].data);
    assert_eq!(a.luns[1].count(THIRD_PARTY_COPY_OUT), 4);
    Ok(())
}

#[test]
fn sources_are_concatenated_round_robin() -> Result<()> {
    let array = array(&[100, 100, 200]);
    let mut cfg = quick_config();
    cfg.copy.segment_count = 4;
    let mut set = xcopy_set(&array, &[0, 1], 2, &cfg);

    assert_eq!(copy(&mut set)?, Completion::Done);
    let a = array.lock().expect("array");
    assert_eq!(a.luns[2].data[..51200], a.luns[0].data[..]);
    assert_eq!(a.luns[2].data[51200..], a.luns[1].data[..]);
    Ok(())
}

#[test]
fn plan_respects_segment_and_destination_budget() -> Result<()> {
    let array = array(&[100, 100, 200]);
    let mut cfg = quick_config();
    cfg.copy.segment_count = 4;
    let mut set = xcopy_set(&array, &[0, 1], 2, &cfg);
    set.destination.scale_count = 4;
    set.prepare()?;

    let plan = plan_segments(&set.sources, &[false, false], &set.destination, 1);
    assert_eq!(plan.segments.len(), 1);
    assert_eq!(plan.per_source, vec![100, 0]);

    let plan = plan_segments(&set.sources, &[true, false], &set.destination, 4);
    assert_eq!(plan.per_source, vec![0, 100]);
    assert_eq!(plan.segments[0].src_index, 1);
    assert_eq!(plan.segments[0].dst_index, 2);
    assert_eq!(plan.total, 100);
    Ok(())
}

#[test]
fn compare_reads_every_segment() -> Result<()> {
    let array = array(&[64, 64]);
    let mut cfg = quick_config();
    cfg.pattern.compare = YesNo::Yes;
    cfg.copy.verify_chunk_blocks = 16;
    let mut set = xcopy_set(&array, &[0], 1, &cfg);

    assert_eq!(copy(&mut set)?, Completion::Done);
    let a = array.lock().expect("array");
    assert_eq!(a.luns[0].count(READ16), 4);
    assert_eq!(a.luns[1].count(READ16), 4);
    Ok(())
}

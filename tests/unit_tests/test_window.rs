use anyhow::Result;
use spt_rs::{
    cfg::{
        config::Config,
        enums::{PatternKind, YesNo},
    },
    control_block::{read::READ16, write::WRITE16},
    error::SptError,
    exec::context::CommandContext,
    io::{
        Completion,
        params::DeviceIoParams,
        window::{Advance, advance_op, run_window},
    },
    registry,
};
use tokio_util::sync::CancellationToken;

use super::sim_device::{Array, SharedArray, SimDevice, quick_config};

const PATTERN_BYTES: [u8; 4] = [0x39, 0x9C, 0xC3, 0x39];

fn array(blocks: u64) -> SharedArray {
    let array = Array::shared();
    array.lock().expect("array").add_lun(blocks, 512);
    array
}

fn window(array: &SharedArray, opcode: u8, cfg: &Config) -> DeviceIoParams {
    let op = registry::lookup(opcode, None, 0).expect("opcode entry");
    let ctx = CommandContext::from_config(SimDevice::boxed(array, 0), "/dev/sim0", cfg);
    DeviceIoParams::from_config(ctx, op, cfg)
}

fn windowed_config(ending_lba: u64, blocks: u64) -> Config {
    let mut cfg = quick_config();
    cfg.io.ending_lba = ending_lba;
    cfg.io.blocks = blocks;
    cfg
}

#[test]
fn ten_block_steps_end_after_the_window() -> Result<()> {
    let array = array(200);
    let mut iop = window(&array, READ16, &windowed_config(100, 10));

    assert_eq!(advance_op(&mut iop)?, Advance::Continue);
    assert_eq!(iop.ctx.device_capacity, 200);
    assert_eq!(iop.block_limit, 100);
    assert_eq!(iop.ctx.data_length, 10 * 512);

    for step in 1..10u64 {
        assert_eq!(advance_op(&mut iop)?, Advance::Continue, "step {step}");
        assert_eq!(iop.current_lba, step * 10);
    }
    assert_eq!(advance_op(&mut iop)?, Advance::EndOfData);

    // Rewound for another pass.
    assert!(iop.end_of_data);
    assert!(iop.first_time);
    assert_eq!(iop.current_lba, 0);
    assert_eq!(iop.block_count, 0);
    Ok(())
}

#[test]
fn last_transfer_shrinks_to_what_is_left() -> Result<()> {
    let array = array(200);
    let mut iop = window(&array, READ16, &windowed_config(25, 10));

    advance_op(&mut iop)?;
    advance_op(&mut iop)?;
    assert_eq!(advance_op(&mut iop)?, Advance::Continue);
    assert_eq!(iop.current_lba, 20);
    assert_eq!(iop.data_blocks, 5);
    assert_eq!(iop.ctx.data_length, 5 * 512);
    assert_eq!(advance_op(&mut iop)?, Advance::EndOfData);
    Ok(())
}

#[test]
fn write_window_fills_the_range_with_the_pattern() -> Result<()> {
    let array = array(200);
    let mut cfg = windowed_config(100, 10);
    cfg.pattern.kind = PatternKind::Fixed;
    let mut iop = window(&array, WRITE16, &cfg);

    assert_eq!(run_window(&mut iop, &CancellationToken::new())?, Completion::Done);

    let a = array.lock().expect("array");
    assert_eq!(a.luns[0].count(WRITE16), 10);
    assert!(a.luns[0].block(99).starts_with(&PATTERN_BYTES));
    assert!(a.luns[0].block(100).iter().all(|&b| b == 0));
    Ok(())
}

#[test]
fn step_value_skips_between_transfers() -> Result<()> {
    let array = array(200);
    let mut cfg = windowed_config(100, 10);
    cfg.pattern.kind = PatternKind::Fixed;
    cfg.io.step_value = 10 * 512;
    let mut iop = window(&array, WRITE16, &cfg);

    run_window(&mut iop, &CancellationToken::new())?;

    let a = array.lock().expect("array");
    assert_eq!(a.luns[0].count(WRITE16), 5);
    for lba in [0u64, 20, 40, 60, 80] {
        assert!(a.luns[0].block(lba).starts_with(&PATTERN_BYTES), "lba {lba}");
    }
    for lba in [10u64, 30, 90] {
        assert!(a.luns[0].block(lba).iter().all(|&b| b == 0), "lba {lba}");
    }
    Ok(())
}

#[test]
fn iot_read_back_detects_a_flipped_byte() -> Result<()> {
    let array = array(128);
    let mut cfg = windowed_config(64, 16);
    cfg.pattern.kind = PatternKind::Iot;
    let cancel = CancellationToken::new();

    let mut writer = window(&array, WRITE16, &cfg);
    run_window(&mut writer, &cancel)?;

    cfg.pattern.compare = YesNo::Yes;
    let mut reader = window(&array, READ16, &cfg);
    assert_eq!(run_window(&mut reader, &cancel)?, Completion::Done);

    array.lock().expect("array").luns[0].data[42 * 512 + 7] ^= 0xFF;
    let mut reader = window(&array, READ16, &cfg);
    match run_window(&mut reader, &cancel) {
        Err(SptError::Verify { lba, offset, .. }) => {
            assert_eq!(lba, 42);
            assert_eq!(offset, (42 - 32) * 512 + 7);
        },
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}

#[test]
fn starting_lba_beyond_capacity_is_rejected() {
    let array = array(50);
    let mut cfg = quick_config();
    cfg.io.starting_lba = 50;
    let mut iop = window(&array, READ16, &cfg);

    assert!(matches!(advance_op(&mut iop), Err(SptError::Range { .. })));
    assert_eq!(array.lock().expect("array").luns[0].count(READ16), 0);
}

#[test]
fn misaligned_data_limit_is_rejected() {
    let array = array(50);
    let mut cfg = quick_config();
    cfg.io.data_limit = 1000;
    let mut iop = window(&array, READ16, &cfg);

    assert!(matches!(advance_op(&mut iop), Err(SptError::Range { .. })));
}

#[test]
fn cancelled_window_stops_before_the_first_transfer() -> Result<()> {
    let array = array(50);
    let mut iop = window(&array, READ16, &windowed_config(40, 10));
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert_eq!(run_window(&mut iop, &cancel)?, Completion::Interrupted);
    assert_eq!(array.lock().expect("array").luns[0].count(READ16), 0);
    Ok(())
}

#[test]
fn slices_partition_the_window() -> Result<()> {
    let array = array(200);
    let mut iop = window(&array, READ16, &windowed_config(100, 10));
    let slices = iop.slices(3)?.slices;
    assert_eq!(slices.len(), 3);
    assert_eq!((slices[0].starting_lba, slices[0].ending_lba), (0, 33));
    assert_eq!((slices[2].starting_lba, slices[2].ending_lba), (66, 100));

    iop.initialize_slice(&slices[1]);
    run_window(&mut iop, &CancellationToken::new())?;
    let a = array.lock().expect("array");
    let lbas: Vec<u64> = a.luns[0]
        .cdbs
        .iter()
        .filter(|c| c[0] == READ16)
        .map(|c| u64::from_be_bytes(c[2..10].try_into().expect("lba")))
        .collect();
    assert_eq!(lbas, vec![33, 43, 53, 63]);
    Ok(())
}

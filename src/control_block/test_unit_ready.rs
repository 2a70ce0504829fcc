// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub const TEST_UNIT_READY: u8 = 0x00;

/// Build a TEST UNIT READY(6) CDB. Moves no data.
#[inline]
pub fn build_test_unit_ready(cdb: &mut [u8; 16], control: u8) {
    cdb.fill(0);
    cdb[0] = TEST_UNIT_READY;
    cdb[5] = control;
}

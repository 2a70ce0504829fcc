// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::cfg::enums::PatternKind;

pub const DEFAULT_PATTERN: u32 = 0x39C3_9C39;
pub const DEFAULT_IOT_SEED: u32 = 0x0101_0101;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillPattern {
    pub kind: PatternKind,
    pub value: u32,
    pub iot_seed: u32,
}

impl Default for FillPattern {
    fn default() -> Self {
        Self {
            kind: PatternKind::None,
            value: DEFAULT_PATTERN,
            iot_seed: DEFAULT_IOT_SEED,
        }
    }
}

impl FillPattern {
    /// Fill `buf` the way data at `lba` is expected to look.
    pub fn fill(&self, buf: &mut [u8], block_size: usize, lba: u64) {
        match self.kind {
            PatternKind::None => {},
            PatternKind::Fixed => fill_fixed(buf, self.value),
            PatternKind::Iot => fill_iot(buf, block_size, lba, self.iot_seed),
        }
    }

    #[inline]
    pub fn is_iot(&self) -> bool {
        self.kind == PatternKind::Iot
    }
}

/// Repeat a 32-bit pattern in host (little-endian) byte order.
pub fn fill_fixed(buf: &mut [u8], pattern: u32) {
    let bytes = pattern.to_le_bytes();
    for (i, b) in buf.iter_mut().enumerate() {
        *b = bytes[i % 4];
    }
}

/// IOT pattern: every block starts its words at its own LBA, and each
/// following word adds `seed`. Data is therefore tied to its address and a
/// misplaced block shows up on compare.
pub fn fill_iot(buf: &mut [u8], block_size: usize, lba: u64, seed: u32) {
    if block_size == 0 {
        return;
    }
    let mut block_lba = lba as u32;
    for block in buf.chunks_mut(block_size) {
        let mut word = block_lba;
        for chunk in block.chunks_mut(4) {
            let bytes = word.to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
            word = word.wrapping_add(seed);
        }
        block_lba = block_lba.wrapping_add(1);
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Big-endian wire field codec.
//!
//! SCSI fields are stored MSB first with widths of 1 to 8 bytes (3, 5, 6
//! and 7 byte fields exist too, e.g. 24-bit block lengths in XCOPY
//! descriptors). Every access is checked against the enclosing buffer.

use thiserror::Error;

/// Widest field the codec handles.
pub const MAX_FIELD_WIDTH: usize = 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported field width {0} (expected 1..=8)")]
    Width(usize),
    #[error("field at offset {offset} (width {width}) exceeds buffer of {len} bytes")]
    OutOfBounds {
        offset: usize,
        width: usize,
        len: usize,
    },
    #[error("value {value:#x} does not fit in {width} bytes")]
    Overflow { value: u64, width: usize },
    #[error("unexpected {what}: {value:#x}")]
    Unexpected { what: &'static str, value: u64 },
}

#[inline]
fn check_width(width: usize) -> Result<(), CodecError> {
    if (1..=MAX_FIELD_WIDTH).contains(&width) {
        Ok(())
    } else {
        Err(CodecError::Width(width))
    }
}

/// Decode a big-endian field occupying all of `bytes` (SCSI to host).
pub fn stoh(bytes: &[u8]) -> Result<u64, CodecError> {
    check_width(bytes.len())?;
    Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

/// Encode `value` big-endian into all of `dst` (host to SCSI).
pub fn htos(dst: &mut [u8], value: u64) -> Result<(), CodecError> {
    let width = dst.len();
    check_width(width)?;
    if width < MAX_FIELD_WIDTH && value >> (width * 8) != 0 {
        return Err(CodecError::Overflow { value, width });
    }
    for (i, b) in dst.iter_mut().enumerate() {
        let shift = (width - 1 - i) * 8;
        *b = (value >> shift) as u8;
    }
    Ok(())
}

/// Bounds-checked sub-slice used by [`get_be`] / [`put_be`].
#[inline]
pub fn field(buf: &[u8], offset: usize, width: usize) -> Result<&[u8], CodecError> {
    let end = offset.checked_add(width).ok_or(CodecError::OutOfBounds {
        offset,
        width,
        len: buf.len(),
    })?;
    buf.get(offset..end).ok_or(CodecError::OutOfBounds {
        offset,
        width,
        len: buf.len(),
    })
}

#[inline]
fn field_mut(buf: &mut [u8], offset: usize, width: usize) -> Result<&mut [u8], CodecError> {
    let len = buf.len();
    let end = offset
        .checked_add(width)
        .ok_or(CodecError::OutOfBounds { offset, width, len })?;
    buf.get_mut(offset..end)
        .ok_or(CodecError::OutOfBounds { offset, width, len })
}

/// Read a `width`-byte big-endian field at `offset`.
pub fn get_be(buf: &[u8], offset: usize, width: usize) -> Result<u64, CodecError> {
    check_width(width)?;
    stoh(field(buf, offset, width)?)
}

/// Write `value` as a `width`-byte big-endian field at `offset`.
pub fn put_be(
    buf: &mut [u8],
    offset: usize,
    width: usize,
    value: u64,
) -> Result<(), CodecError> {
    check_width(width)?;
    htos(field_mut(buf, offset, width)?, value)
}

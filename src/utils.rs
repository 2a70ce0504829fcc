// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use rand::RngExt;

/// Random copy list identifier. Zero is avoided so a fresh identifier never
/// matches an unset field in a device response.
pub fn generate_list_identifier() -> u32 {
    let mut bytes = [0u8; 4];
    rand::rng().fill(&mut bytes);
    match u32::from_be_bytes(bytes) {
        0 => 1,
        id => id,
    }
}

/// Lowercase hex without prefix, used for designators and tokens in logs.
pub fn hex_string(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod extended_copy;
pub mod inquiry;
pub mod lba;
pub mod read;
pub mod read_capacity;
pub mod receive_copy;
pub mod test_unit_ready;
pub mod token;
pub mod write;

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// Direction of the data phase of a CDB.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataDirection {
    #[default]
    #[serde(rename = "none", alias = "None")]
    None,
    #[serde(rename = "read", alias = "Read")]
    Read,
    #[serde(rename = "write", alias = "Write")]
    Write,
}

impl fmt::Display for DataDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataDirection::None => "none",
            DataDirection::Read => "read",
            DataDirection::Write => "write",
        })
    }
}

/// CDBs are kept in a 16-byte buffer regardless of their length.
pub const MAX_CDB_LEN: usize = 16;

/// Default sense allocation per command.
pub const DEFAULT_SENSE_LEN: usize = 255;

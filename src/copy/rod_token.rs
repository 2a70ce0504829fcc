// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path};

use anyhow::{Context, Result};

use crate::control_block::token::{ROD_TOKEN_LENGTH, zero_rod_token};

/// The ROD token of the current copy pass.
///
/// A populated token is single use: it is cleared once WRITE USING TOKEN
/// consumed it. The zero token stays valid for the whole operation.
#[derive(Debug, Clone, Default)]
pub struct RodToken {
    bytes: Vec<u8>,
    list_identifier: u32,
    zero: bool,
}

impl RodToken {
    /// The well-known token that makes WRITE USING TOKEN write zeroes.
    pub fn zero() -> Self {
        Self {
            bytes: zero_rod_token(),
            list_identifier: 0,
            zero: true,
        }
    }

    /// Take over the token returned for POPULATE TOKEN `list_identifier`.
    pub fn set(&mut self, token: &[u8], list_identifier: u32) {
        self.bytes.clear();
        self.bytes.extend_from_slice(token);
        self.list_identifier = list_identifier;
        self.zero = false;
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.bytes.len() == ROD_TOKEN_LENGTH
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.zero
    }

    #[inline]
    pub fn list_identifier(&self) -> u32 {
        self.list_identifier
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mark a populated token as used.
    pub fn consume(&mut self) {
        if !self.zero {
            self.bytes.clear();
        }
    }

    /// Write the raw token so another host can use it.
    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {parent:?}"))?;
        }
        fs::write(path, &self.bytes)
            .with_context(|| format!("Failed to write ROD token to {path:?}"))
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Environment variable that overrides the config path handed to
/// [`resolve_config_path`].
pub const CONFIG_ENV: &str = "SPT_RS_CONFIG";

fn absolute(p: &Path) -> Result<PathBuf> {
    if p.is_absolute() {
        return Ok(p.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("cannot get current working dir")?
        .join(p))
}

/// Resolves a config file path to its canonical form.
///
/// When `SPT_RS_CONFIG` is set and non-empty it wins over `rel`. Relative
/// paths are taken from the current working directory.
pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let chosen = match std::env::var(CONFIG_ENV) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => rel.to_string(),
    };
    let abs = absolute(Path::new(&chosen))?;

    let canon = abs
        .canonicalize()
        .with_context(|| format!("failed to canonicalize config path {abs:?}"))?;
    if !canon.is_file() {
        bail!("config path {canon:?} is not a regular file");
    }
    Ok(canon)
}

/// Resolves a device special file path. Symlinks such as
/// `/dev/disk/by-id/...` are followed so logs name the real node.
pub fn resolve_device_path(dsf: &str) -> Result<PathBuf> {
    if dsf.trim().is_empty() {
        bail!("empty device path");
    }
    let abs = absolute(Path::new(dsf))?;
    abs.canonicalize()
        .with_context(|| format!("device {dsf} is not accessible"))
}

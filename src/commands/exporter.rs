// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::export::{export_to_path, safe_file_name};
use crate::repository::Repository;
use crate::settings::Settings;

pub fn handle(repo: &Repository, m: &clap::ArgMatches) -> Result<()> {
    let out = m.get_one::<String>("out").unwrap().trim();
    match export_active(repo, Path::new(out))? {
        Some(path) => println!("Exported transactions to {}", path.display()),
        None => println!("No active ledger to export."),
    }
    Ok(())
}

/// Export the active ledger. A directory `out` receives the default file name.
pub fn export_active(repo: &Repository, out: &Path) -> Result<Option<PathBuf>> {
    let Some(snapshot) = repo.active_snapshot()? else {
        return Ok(None);
    };
    let path = if out.is_dir() {
        out.join(safe_file_name(&snapshot.ledger.name))
    } else {
        out.to_path_buf()
    };
    let lang = Settings::load(repo.store())?.language;
    export_to_path(&path, &snapshot.transactions, lang)
        .with_context(|| format!("Write CSV to {}", path.display()))?;
    Ok(Some(path))
}

// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use std::sync::Arc;

use budgetpace::repository::Repository;
use budgetpace::{cli, commands, db, utils};

fn main() -> Result<()> {
    utils::init_tracing();
    let cli = cli::build_cli();
    let matches = cli.get_matches();

    let store = Arc::new(db::open_or_init()?);
    let repo = Repository::new(Arc::clone(&store));
    repo.archive_expired_ledgers(repo.now())?;

    match matches.subcommand() {
        Some(("init", _)) => {
            println!("Database initialized at {}", db::db_path()?.display());
        }
        Some(("ledger", sub)) => commands::ledgers::handle(&repo, sub)?,
        Some(("tx", sub)) => commands::transactions::handle(&repo, sub)?,
        Some(("export", sub)) => commands::exporter::handle(&repo, sub)?,
        Some(("analyze", _)) => commands::analyze::handle(&repo)?,
        Some(("config", sub)) => commands::config::handle(&store, sub)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}

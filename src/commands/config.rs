// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;

use crate::db::Store;
use crate::settings::Settings;
use crate::utils::{maybe_print_json, pretty_table};

pub fn handle(store: &Store, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("show", sub)) => show(store, sub)?,
        Some(("set", sub)) => {
            let settings = apply(Settings::load(store)?, sub)?;
            settings.save(store)?;
            println!("Settings saved");
        }
        _ => {}
    }
    Ok(())
}

/// Overlay the flags given on the command line onto `settings`.
pub fn apply(mut settings: Settings, sub: &clap::ArgMatches) -> Result<Settings> {
    if let Some(url) = sub.get_one::<String>("url") {
        settings.api_url = url.trim().to_string();
    }
    if let Some(key) = sub.get_one::<String>("key") {
        settings.api_key = key.trim().to_string();
    }
    if let Some(model) = sub.get_one::<String>("model") {
        settings.api_model = model.trim().to_string();
    }
    if let Some(lang) = sub.get_one::<String>("language") {
        settings.language = lang.parse()?;
    }
    Ok(settings)
}

fn masked(key: &str) -> String {
    let shown: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    match key.chars().count() {
        0 => "(unset)".into(),
        n if n <= 4 => "****".into(),
        _ => format!("****{}", shown),
    }
}

fn show(store: &Store, sub: &clap::ArgMatches) -> Result<()> {
    let mut settings = Settings::load(store)?;
    settings.api_key = masked(&settings.api_key);
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &settings)? {
        let rows = vec![
            vec!["api_url".into(), settings.api_url],
            vec!["api_key".into(), settings.api_key],
            vec!["api_model".into(), settings.api_model],
            vec!["language".into(), settings.language.to_string()],
        ];
        println!("{}", pretty_table(&["Setting", "Value"], rows));
    }
    Ok(())
}

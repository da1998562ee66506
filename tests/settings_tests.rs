// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use budgetpace::cli;
use budgetpace::commands::config;
use budgetpace::db::Store;
use budgetpace::settings::{DEFAULT_API_MODEL, DEFAULT_API_URL, Language, Settings};

#[test]
fn defaults_apply_to_a_new_store() {
    let store = Store::open_in_memory().unwrap();
    let s = Settings::load(&store).unwrap();
    assert_eq!(s.api_url, DEFAULT_API_URL);
    assert_eq!(s.api_model, DEFAULT_API_MODEL);
    assert_eq!(s.api_key, "");
    assert_eq!(s.language, Language::Chinese);
    assert!(!s.is_configured());
}

#[test]
fn save_then_load_round_trips() {
    let store = Store::open_in_memory().unwrap();
    let s = Settings {
        api_url: "https://api.example.com/v1/chat".into(),
        api_key: " secret ".into(),
        api_model: "m".into(),
        language: Language::English,
    };
    s.save(&store).unwrap();
    let loaded = Settings::load(&store).unwrap();
    assert_eq!(loaded.api_key, "secret");
    assert_eq!(loaded.language, Language::English);
    assert!(loaded.is_configured());
}

#[test]
fn config_set_overlays_only_given_flags() {
    let store = Store::open_in_memory().unwrap();
    let matches = cli::build_cli().get_matches_from([
        "budgetpace",
        "config",
        "set",
        "--key",
        "abc",
        "--language",
        "en",
    ]);
    let Some(("config", config_m)) = matches.subcommand() else {
        panic!("no config subcommand");
    };
    config::handle(&store, config_m).unwrap();
    let s = Settings::load(&store).unwrap();
    assert_eq!(s.api_key, "abc");
    assert_eq!(s.language, Language::English);
    assert_eq!(s.api_url, DEFAULT_API_URL);
}

#[test]
fn unknown_language_is_an_error() {
    assert!("fr".parse::<Language>().is_err());
    assert_eq!("EN".parse::<Language>().unwrap(), Language::English);
}

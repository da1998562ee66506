// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::Store;
use crate::error::{Error, Result};
use crate::models::TxKind;

pub const DEFAULT_API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions";
pub const DEFAULT_API_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    Chinese,
    English,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Chinese => "zh",
            Language::English => "en",
        }
    }

    pub fn kind_label(&self, kind: TxKind) -> &'static str {
        match (self, kind) {
            (Language::Chinese, TxKind::Expense) => "支出",
            (Language::Chinese, TxKind::Income) => "收入",
            (Language::English, TxKind::Expense) => "Expense",
            (Language::English, TxKind::Income) => "Income",
        }
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zh" | "chinese" => Ok(Language::Chinese),
            "en" | "english" => Ok(Language::English),
            other => Err(Error::InvalidValue(format!(
                "unknown language '{}' (use zh|en)",
                other
            ))),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Analysis endpoint and display preferences, persisted in the `settings` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub api_url: String,
    pub api_key: String,
    pub api_model: String,
    pub language: Language,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            api_key: String::new(),
            api_model: DEFAULT_API_MODEL.into(),
            language: Language::default(),
        }
    }
}

fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT value FROM settings WHERE key=?1",
            params![key],
            |r| r.get(0),
        )
        .optional()?)
}

fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, value],
    )?;
    Ok(())
}

impl Settings {
    pub fn load(store: &Store) -> Result<Self> {
        store.read(Self::load_from)
    }

    pub fn load_from(conn: &Connection) -> Result<Self> {
        let defaults = Settings::default();
        let language = match get_setting(conn, "language")? {
            Some(code) => code.parse()?,
            None => defaults.language,
        };
        Ok(Self {
            api_url: get_setting(conn, "api_url")?.unwrap_or(defaults.api_url),
            api_key: get_setting(conn, "api_key")?.unwrap_or(defaults.api_key),
            api_model: get_setting(conn, "api_model")?.unwrap_or(defaults.api_model),
            language,
        })
    }

    /// Persist all four settings together.
    pub fn save(&self, store: &Store) -> Result<()> {
        store.write(|tx| {
            set_setting(tx, "api_url", self.api_url.trim())?;
            set_setting(tx, "api_key", self.api_key.trim())?;
            set_setting(tx, "api_model", self.api_model.trim())?;
            set_setting(tx, "language", self.language.code())?;
            Ok(())
        })
    }

    /// Analysis runs only with both an endpoint and a credential.
    pub fn is_configured(&self) -> bool {
        !self.api_url.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use thiserror::Error;

/// Failures raised by the storage and export layers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Schema migration to version {version} failed: {source}")]
    Migration {
        version: i32,
        #[source]
        source: rusqlite::Error,
    },
    #[error("Store is at schema version {found}, newer than supported version {supported}")]
    UnsupportedVersion { found: i32, supported: i32 },
    #[error("Integrity violation: {0}")]
    Integrity(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a repository operation was not applied. Rejections leave the store untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("ledger name must not be blank")]
    BlankName,
    #[error("budget must be greater than zero")]
    NonPositiveBudget,
    #[error("amount must be greater than zero")]
    NonPositiveAmount,
    #[error("amount exceeds the largest accepted value")]
    AmountTooLarge,
    #[error("category must not be blank")]
    BlankCategory,
    #[error("custom end date is before the start date")]
    EndBeforeStart,
    #[error("ledger {0} does not exist")]
    UnknownLedger(i64),
    #[error("ledger {0} is closed")]
    LedgerClosed(i64),
    #[error("ledger {0} has passed its end date")]
    LedgerExpired(i64),
    #[error("transaction {0} does not exist")]
    UnknownTransaction(i64),
}

/// Result of a validated write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Applied(T),
    Rejected(Rejection),
}

impl<T> Outcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Outcome::Applied(v) => Some(v),
            Outcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Outcome::Applied(_) => None,
            Outcome::Rejected(r) => Some(r),
        }
    }
}

// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerKind {
    Daily,
    Temporary,
    Special,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Daily => "Daily",
            LedgerKind::Temporary => "Temporary",
            LedgerKind::Special => "Special",
        }
    }
}

impl FromStr for LedgerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(LedgerKind::Daily),
            "temporary" => Ok(LedgerKind::Temporary),
            "special" => Ok(LedgerKind::Special),
            other => Err(Error::InvalidValue(format!(
                "unknown ledger type '{}' (use daily|temporary|special)",
                other
            ))),
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expense or income. Stored as `expense` / `income`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Expense,
    Income,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Expense => "expense",
            TxKind::Income => "income",
        }
    }
}

impl FromStr for TxKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "expense" => Ok(TxKind::Expense),
            "income" => Ok(TxKind::Income),
            other => Err(Error::InvalidValue(format!(
                "unknown transaction kind '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Length of a non-temporary budgeting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodUnit {
    Week,
    Month,
    Quarter,
    Year,
}

impl FromStr for PeriodUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(PeriodUnit::Week),
            "month" => Ok(PeriodUnit::Month),
            "quarter" => Ok(PeriodUnit::Quarter),
            "year" => Ok(PeriodUnit::Year),
            other => Err(Error::InvalidValue(format!(
                "unknown period '{}' (use week|month|quarter|year)",
                other
            ))),
        }
    }
}

macro_rules! text_column {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: Error| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_column!(LedgerKind);
text_column!(TxKind);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub id: i64,
    pub name: String,
    pub kind: LedgerKind,
    pub total_budget: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    pub is_closed: bool,
}

impl Ledger {
    /// True once `now` is strictly past the end timestamp.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.end_date
    }
}

/// A ledger row before the store assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedger {
    pub name: String,
    pub kind: LedgerKind,
    pub total_budget: Decimal,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    pub is_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub ledger_id: i64,
    pub amount: Decimal,
    pub category: String,
    pub note: String,
    pub date: DateTime<Utc>,
    pub kind: TxKind,
}

impl Transaction {
    /// Amount with the sign it contributes to net spend.
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            TxKind::Expense => self.amount,
            TxKind::Income => -self.amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub ledger_id: i64,
    pub amount: Decimal,
    pub category: String,
    pub note: String,
    pub date: DateTime<Utc>,
    pub kind: TxKind,
}

/// Everything the analysis prompt needs about the ledger being reviewed.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSnapshot {
    pub ledger: Ledger,
    pub net_spent: Decimal,
    pub transactions: Vec<Transaction>,
}

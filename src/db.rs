// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Context;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use rust_decimal::Decimal;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::models::{Ledger, NewLedger, NewTransaction, Transaction, TxKind};
use crate::schema;

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Budgetpace", "budgetpace"));

pub fn db_path() -> anyhow::Result<PathBuf> {
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("budgetpace.sqlite"))
}

pub fn open_or_init() -> anyhow::Result<Store> {
    let path = db_path()?;
    Store::open(&path).with_context(|| format!("Open DB at {}", path.display()))
}

/// Durable owner of the ledger and transaction tables.
///
/// All access goes through one connection behind a mutex, so writes are
/// serialized and a multi-statement [`Store::write`] is invisible to readers
/// until it commits.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(mut conn: Connection) -> Result<Self> {
        schema::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves no partial SQL transaction behind.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock();
        f(&conn)
    }

    /// Run `f` inside one SQL transaction; rolled back if `f` fails.
    pub fn write<T>(&self, f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

fn decimal_at(r: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let s: String = r.get(idx)?;
    s.parse::<Decimal>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

const LEDGER_COLUMNS: &str =
    "id, name, kind, total_budget, start_date, end_date, is_active, is_closed";

fn ledger_from_row(r: &Row<'_>) -> rusqlite::Result<Ledger> {
    Ok(Ledger {
        id: r.get(0)?,
        name: r.get(1)?,
        kind: r.get(2)?,
        total_budget: decimal_at(r, 3)?,
        start_date: r.get(4)?,
        end_date: r.get(5)?,
        is_active: r.get(6)?,
        is_closed: r.get(7)?,
    })
}

const TRANSACTION_COLUMNS: &str = "id, ledger_id, amount, category, note, date, kind";

fn transaction_from_row(r: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: r.get(0)?,
        ledger_id: r.get(1)?,
        amount: decimal_at(r, 2)?,
        category: r.get(3)?,
        note: r.get(4)?,
        date: r.get(5)?,
        kind: r.get(6)?,
    })
}

fn integrity_error(e: rusqlite::Error, what: String) -> Error {
    match e {
        rusqlite::Error::SqliteFailure(ref f, _) if f.code == ErrorCode::ConstraintViolation => {
            debug_assert!(false, "{}: {}", what, e);
            Error::Integrity(format!("{}: {}", what, e))
        }
        other => Error::Sqlite(other),
    }
}

pub fn insert_ledger(conn: &Connection, l: &NewLedger) -> Result<i64> {
    conn.execute(
        "INSERT INTO ledgers(name, kind, total_budget, start_date, end_date, is_active, is_closed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            l.name,
            l.kind,
            l.total_budget.to_string(),
            l.start_date,
            l.end_date,
            l.is_active,
            l.is_closed
        ],
    )
    .map_err(|e| integrity_error(e, format!("insert ledger '{}'", l.name)))?;
    Ok(conn.last_insert_rowid())
}

/// Insert-or-replace keyed by id. Updates in place, so existing transactions survive.
pub fn upsert_ledger(conn: &Connection, l: &Ledger) -> Result<i64> {
    conn.execute(
        "INSERT INTO ledgers(id, name, kind, total_budget, start_date, end_date, is_active, is_closed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            name=excluded.name, kind=excluded.kind, total_budget=excluded.total_budget,
            start_date=excluded.start_date, end_date=excluded.end_date,
            is_active=excluded.is_active, is_closed=excluded.is_closed",
        params![
            l.id,
            l.name,
            l.kind,
            l.total_budget.to_string(),
            l.start_date,
            l.end_date,
            l.is_active,
            l.is_closed
        ],
    )
    .map_err(|e| integrity_error(e, format!("upsert ledger {}", l.id)))?;
    Ok(l.id)
}

pub fn insert_transaction(conn: &Connection, t: &NewTransaction) -> Result<i64> {
    conn.execute(
        "INSERT INTO transactions(ledger_id, amount, category, note, date, kind)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            t.ledger_id,
            t.amount.to_string(),
            t.category,
            t.note,
            t.date,
            t.kind
        ],
    )
    .map_err(|e| integrity_error(e, format!("transaction for ledger {}", t.ledger_id)))?;
    Ok(conn.last_insert_rowid())
}

pub fn upsert_transaction(conn: &Connection, t: &Transaction) -> Result<i64> {
    conn.execute(
        "INSERT INTO transactions(id, ledger_id, amount, category, note, date, kind)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
            ledger_id=excluded.ledger_id, amount=excluded.amount, category=excluded.category,
            note=excluded.note, date=excluded.date, kind=excluded.kind",
        params![
            t.id,
            t.ledger_id,
            t.amount.to_string(),
            t.category,
            t.note,
            t.date,
            t.kind
        ],
    )
    .map_err(|e| integrity_error(e, format!("transaction for ledger {}", t.ledger_id)))?;
    Ok(t.id)
}

pub fn delete_transaction(conn: &Connection, id: i64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM transactions WHERE id=?1", params![id])?)
}

/// Hard delete; the schema cascades to the ledger's transactions.
pub fn delete_ledger(conn: &Connection, id: i64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM ledgers WHERE id=?1", params![id])?)
}

pub fn list_ledgers(conn: &Connection) -> Result<Vec<Ledger>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM ledgers ORDER BY start_date DESC, id DESC",
        LEDGER_COLUMNS
    ))?;
    let rows = stmt.query_map([], ledger_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn find_ledger(conn: &Connection, id: i64) -> Result<Option<Ledger>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM ledgers WHERE id=?1", LEDGER_COLUMNS),
            params![id],
            ledger_from_row,
        )
        .optional()?)
}

pub fn active_ledger(conn: &Connection) -> Result<Option<Ledger>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM ledgers WHERE is_active = 1 LIMIT 1",
                LEDGER_COLUMNS
            ),
            [],
            ledger_from_row,
        )
        .optional()?)
}

pub fn find_transaction(conn: &Connection, id: i64) -> Result<Option<Transaction>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM transactions WHERE id=?1", TRANSACTION_COLUMNS),
            params![id],
            transaction_from_row,
        )
        .optional()?)
}

pub fn list_transactions(conn: &Connection, ledger_id: i64) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM transactions WHERE ledger_id=?1 ORDER BY date DESC, id DESC",
        TRANSACTION_COLUMNS
    ))?;
    let rows = stmt.query_map(params![ledger_id], transaction_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Expense total minus income total. Zero for a ledger without transactions.
pub fn net_balance(conn: &Connection, ledger_id: i64) -> Result<Decimal> {
    let mut stmt =
        conn.prepare_cached("SELECT kind, amount FROM transactions WHERE ledger_id=?1")?;
    let mut rows = stmt.query(params![ledger_id])?;
    let mut net = Decimal::ZERO;
    while let Some(r) = rows.next()? {
        let kind: TxKind = r.get(0)?;
        let amount = decimal_at(r, 1)?;
        net = match kind {
            TxKind::Expense => net.checked_add(amount),
            TxKind::Income => net.checked_sub(amount),
        }
        .ok_or_else(|| {
            Error::InvalidValue(format!("net balance of ledger {ledger_id} overflows"))
        })?;
    }
    Ok(net)
}

pub fn set_active(conn: &Connection, ledger_id: i64, active: bool) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE ledgers SET is_active=?2 WHERE id=?1",
        params![ledger_id, active],
    )?)
}

pub fn deactivate_all(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("UPDATE ledgers SET is_active=0 WHERE is_active=1", [])?)
}

/// Ids of ledgers still open at `now` whose end timestamp has passed.
pub fn expired_open_ledgers(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<i64>> {
    let mut stmt =
        conn.prepare_cached("SELECT id, end_date FROM ledgers WHERE is_closed = 0")?;
    let rows = stmt.query_map([], |r| {
        Ok((r.get::<_, i64>(0)?, r.get::<_, DateTime<Utc>>(1)?))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, end) = row?;
        if now > end {
            out.push(id);
        }
    }
    Ok(out)
}

pub fn close_ledger(conn: &Connection, ledger_id: i64) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE ledgers SET is_closed=1, is_active=0 WHERE id=?1 AND is_closed=0",
        params![ledger_id],
    )?)
}

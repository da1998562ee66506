// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Versioned, additive schema evolution.
//!
//! The stored version lives in `PRAGMA user_version`. Fresh stores are
//! created with the latest table layout, then every step above the stored
//! version runs; each step probes the existing schema first and does nothing
//! when its change is already present.

use rusqlite::{Connection, Transaction};
use tracing::info;

use crate::error::{Error, Result};

pub const CURRENT_VERSION: i32 = 4;

const BASE_TABLES: &str = r#"
    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS ledgers(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        total_budget TEXT NOT NULL,
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 0,
        is_closed INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS transactions(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ledger_id INTEGER NOT NULL,
        amount TEXT NOT NULL,
        category TEXT NOT NULL,
        note TEXT NOT NULL DEFAULT '',
        date TEXT NOT NULL,
        kind TEXT NOT NULL DEFAULT 'expense',
        FOREIGN KEY(ledger_id) REFERENCES ledgers(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_transactions_ledger ON transactions(ledger_id);
    CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);
"#;

/// One step of the chain. `apply` must be a no-op when its change already exists.
struct Step {
    version: i32,
    apply: fn(&Transaction<'_>) -> rusqlite::Result<()>,
}

const STEPS: &[Step] = &[
    Step {
        version: 2,
        apply: add_transaction_kind,
    },
    Step {
        version: 3,
        apply: add_ledger_closed_flag,
    },
    Step {
        version: 4,
        apply: add_single_active_index,
    },
];

pub fn schema_version(conn: &Connection) -> Result<i32> {
    Ok(conn.query_row("PRAGMA user_version", [], |r| r.get(0))?)
}

/// Bring the store to `CURRENT_VERSION`. Any failing step aborts initialization.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    migrate_to(conn, CURRENT_VERSION)
}

pub fn migrate_to(conn: &mut Connection, target: i32) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    let found = schema_version(conn)?;
    if found > CURRENT_VERSION {
        return Err(Error::UnsupportedVersion {
            found,
            supported: CURRENT_VERSION,
        });
    }
    let fresh = found == 0;
    if fresh {
        conn.execute_batch(BASE_TABLES)?;
        set_version(conn, 1)?;
    }

    for step in STEPS {
        if step.version > target || step.version <= schema_version(conn)? {
            continue;
        }
        let tx = conn.transaction()?;
        (step.apply)(&tx).map_err(|source| Error::Migration {
            version: step.version,
            source,
        })?;
        tx.pragma_update(None, "user_version", step.version)
            .map_err(|source| Error::Migration {
                version: step.version,
                source,
            })?;
        tx.commit().map_err(|source| Error::Migration {
            version: step.version,
            source,
        })?;
        if !fresh {
            info!(version = step.version, "applied schema migration");
        }
    }
    Ok(())
}

fn set_version(conn: &Connection, version: i32) -> Result<()> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

/// Column names of `table`, via `PRAGMA table_info`.
pub fn columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt
        .query_map([], |r| r.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

fn add_column_if_missing(
    tx: &Transaction<'_>,
    table: &str,
    column: &str,
    definition: &str,
) -> rusqlite::Result<()> {
    if columns(tx, table)?.iter().any(|c| c == column) {
        return Ok(());
    }
    tx.execute(
        &format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition),
        [],
    )?;
    Ok(())
}

fn add_transaction_kind(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    add_column_if_missing(tx, "transactions", "kind", "TEXT NOT NULL DEFAULT 'expense'")
}

fn add_ledger_closed_flag(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    add_column_if_missing(tx, "ledgers", "is_closed", "INTEGER NOT NULL DEFAULT 0")
}

fn add_single_active_index(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_ledgers_single_active
         ON ledgers(is_active) WHERE is_active = 1;",
    )
}

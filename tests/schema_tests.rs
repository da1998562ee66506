// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use budgetpace::db::{self, Store};
use budgetpace::error::Error;
use budgetpace::models::TxKind;
use budgetpace::schema::{self, CURRENT_VERSION};
use chrono::{TimeZone, Utc};
use rusqlite::{Connection, params};
use tempfile::tempdir;

/// A store as the first release left it: no `kind`, no `is_closed`.
fn v1_store() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE settings(key TEXT PRIMARY KEY, value TEXT NOT NULL);
        CREATE TABLE ledgers(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            total_budget TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE transactions(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ledger_id INTEGER NOT NULL,
            amount TEXT NOT NULL,
            category TEXT NOT NULL,
            note TEXT NOT NULL DEFAULT '',
            date TEXT NOT NULL,
            FOREIGN KEY(ledger_id) REFERENCES ledgers(id) ON DELETE CASCADE
        );
        PRAGMA user_version = 1;
        "#,
    )
    .unwrap();
    conn
}

fn insert_v1_ledger(conn: &Connection, name: &str, active: bool) -> i64 {
    let start = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap();
    conn.execute(
        "INSERT INTO ledgers(name, kind, total_budget, start_date, end_date, is_active)
         VALUES (?1, 'Daily', '1000', ?2, ?3, ?4)",
        params![name, start, end, active],
    )
    .unwrap();
    conn.last_insert_rowid()
}

#[test]
fn v1_store_upgrades_without_losing_rows() {
    let conn = v1_store();
    let id = insert_v1_ledger(&conn, "January", true);
    conn.execute(
        "INSERT INTO transactions(ledger_id, amount, category, note, date)
         VALUES (?1, '42.50', 'Food', 'lunch', ?2)",
        params![id, Utc.with_ymd_and_hms(2025, 1, 3, 12, 0, 0).unwrap()],
    )
    .unwrap();

    let store = Store::from_connection(conn).unwrap();
    store
        .read(|conn| {
            assert_eq!(schema::schema_version(conn)?, CURRENT_VERSION);
            let ledgers = db::list_ledgers(conn)?;
            assert_eq!(ledgers.len(), 1);
            assert!(!ledgers[0].is_closed);
            assert!(ledgers[0].is_active);
            let txs = db::list_transactions(conn, id)?;
            assert_eq!(txs.len(), 1);
            assert_eq!(txs[0].kind, TxKind::Expense);
            assert_eq!(txs[0].note, "lunch");
            Ok(())
        })
        .unwrap();
}

#[test]
fn steps_skip_columns_that_already_exist() {
    let mut conn = Connection::open_in_memory().unwrap();
    schema::migrate(&mut conn).unwrap();
    // Pretend the version marker was lost; every step must probe and pass.
    conn.pragma_update(None, "user_version", 1).unwrap();
    schema::migrate(&mut conn).unwrap();
    assert_eq!(schema::schema_version(&conn).unwrap(), CURRENT_VERSION);
    let cols = schema::columns(&conn, "transactions").unwrap();
    assert_eq!(cols.iter().filter(|c| *c == "kind").count(), 1);
}

#[test]
fn partial_migration_can_stop_at_target() {
    let mut conn = v1_store();
    schema::migrate_to(&mut conn, 2).unwrap();
    assert_eq!(schema::schema_version(&conn).unwrap(), 2);
    let ledger_cols = schema::columns(&conn, "ledgers").unwrap();
    assert!(!ledger_cols.contains(&"is_closed".to_string()));
    schema::migrate(&mut conn).unwrap();
    assert_eq!(schema::schema_version(&conn).unwrap(), CURRENT_VERSION);
}

#[test]
fn failed_step_is_fatal_and_keeps_data() {
    let mut conn = v1_store();
    insert_v1_ledger(&conn, "A", true);
    insert_v1_ledger(&conn, "B", true);

    let err = schema::migrate(&mut conn).unwrap_err();
    assert!(matches!(err, Error::Migration { version: 4, .. }));
    assert_eq!(schema::schema_version(&conn).unwrap(), 3);
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM ledgers", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn reopening_on_disk_store_is_a_no_op() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("budgetpace.sqlite");
    {
        let store = Store::open(&path).unwrap();
        store
            .write(|tx| {
                db::insert_ledger(
                    tx,
                    &budgetpace::models::NewLedger {
                        name: "Persisted".into(),
                        kind: budgetpace::models::LedgerKind::Special,
                        total_budget: rust_decimal::Decimal::new(300, 0),
                        start_date: Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap(),
                        end_date: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
                        is_active: false,
                        is_closed: false,
                    },
                )
            })
            .unwrap();
    }
    let store = Store::open(&path).unwrap();
    let ledgers = store.read(|c| db::list_ledgers(c)).unwrap();
    assert_eq!(ledgers.len(), 1);
    assert_eq!(ledgers[0].name, "Persisted");
}

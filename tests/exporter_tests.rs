// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use budgetpace::commands::exporter;
use budgetpace::db::Store;
use budgetpace::export::{UTF8_BOM, safe_file_name, write_transactions};
use budgetpace::models::{LedgerKind, PeriodUnit, Transaction, TxKind};
use budgetpace::repository::{NewLedgerRequest, PeriodChoice, Repository};
use budgetpace::settings::Language;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tempfile::tempdir;

fn tx(id: i64, cents: i64, kind: TxKind, note: &str) -> Transaction {
    Transaction {
        id,
        ledger_id: 1,
        amount: Decimal::new(cents, 2),
        category: "Food".into(),
        note: note.into(),
        date: Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap(),
        kind,
    }
}

fn parse(bytes: &[u8]) -> Vec<Vec<String>> {
    assert!(bytes.starts_with(UTF8_BOM));
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(&bytes[UTF8_BOM.len()..]);
    rdr.records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect()
}

#[test]
fn rows_carry_signed_amounts_and_escaped_notes() {
    let mut out = Vec::new();
    write_transactions(
        &mut out,
        &[
            tx(1, 1250, TxKind::Expense, "lunch, with \"friends\""),
            tx(2, 500, TxKind::Income, "refund"),
        ],
        Language::English,
    )
    .unwrap();

    let text = String::from_utf8(out[UTF8_BOM.len()..].to_vec()).unwrap();
    assert!(text.ends_with('\n'));
    assert!(!text.contains('\r'));
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], r#""Date","Type","Category","Amount","Note""#);
    assert!(lines[1].ends_with(r#","-12.50","lunch, with ""friends""""#));
    assert!(lines[2].ends_with(r#","+5.00","refund""#));

    let rows = parse(&out);
    assert_eq!(rows[0], vec!["Date", "Type", "Category", "Amount", "Note"]);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1][1..], ["Expense", "Food", "-12.50", "lunch, with \"friends\""]);
    assert_eq!(rows[2][1..], ["Income", "Food", "+5.00", "refund"]);
    assert_eq!(rows[1][0].len(), "2025-06-02 12:00".len());
}

#[test]
fn chinese_labels() {
    let mut out = Vec::new();
    write_transactions(&mut out, &[tx(1, 100, TxKind::Expense, "")], Language::Chinese).unwrap();
    let rows = parse(&out);
    assert_eq!(rows[0], vec!["日期", "类型", "分类", "金额", "备注"]);
    assert_eq!(rows[1][1], "支出");
}

#[test]
fn file_names_drop_reserved_characters() {
    assert_eq!(safe_file_name("Trip: Rome/Paris?"), "Trip_ Rome_Paris_.csv");
    assert_eq!(safe_file_name("March"), "March.csv");
}

#[test]
fn export_active_writes_into_directory() {
    let repo = Repository::new(Arc::new(Store::open_in_memory().unwrap()));
    let dir = tempdir().unwrap();
    assert!(exporter::export_active(&repo, dir.path()).unwrap().is_none());

    let id = repo
        .start_new_ledger(&NewLedgerRequest {
            name: "June|Summer".into(),
            kind: LedgerKind::Daily,
            budget: Decimal::new(900, 0),
            period: PeriodChoice::Period(PeriodUnit::Month),
            fixed_expenses: vec![("Rent".into(), Decimal::new(400, 0))],
        })
        .unwrap()
        .applied()
        .unwrap();
    repo.add_transaction(id, "salary", Decimal::new(1000, 0), "Work", TxKind::Income)
        .unwrap();

    let path = exporter::export_active(&repo, dir.path()).unwrap().unwrap();
    assert_eq!(path, dir.path().join("June_Summer.csv"));
    let rows = parse(&std::fs::read(&path).unwrap());
    // Default language is Chinese.
    assert_eq!(rows[0][0], "日期");
    assert_eq!(rows.len(), 3);
    let amounts: Vec<&str> = rows[1..].iter().map(|r| r[3].as_str()).collect();
    assert!(amounts.contains(&"-400"));
    assert!(amounts.contains(&"+1000"));
}

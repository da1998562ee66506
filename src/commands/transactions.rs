// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::Outcome;
use crate::models::{Transaction, TxKind};
use crate::repository::Repository;
use crate::utils::{fmt_local, fmt_money, maybe_print_json, parse_decimal, pretty_table};

pub fn handle(repo: &Repository, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(repo, sub)?,
        Some(("list", sub)) => list(repo, sub)?,
        Some(("rm", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            match repo.delete_transaction_by_id(id)? {
                Outcome::Applied(()) => println!("Removed transaction {}", id),
                Outcome::Rejected(reason) => println!("Nothing removed: {}", reason),
            }
        }
        _ => {}
    }
    Ok(())
}

fn add(repo: &Repository, sub: &clap::ArgMatches) -> Result<()> {
    let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
    let category = sub.get_one::<String>("category").unwrap();
    let note = sub.get_one::<String>("note").unwrap();
    let kind = if sub.get_flag("income") {
        TxKind::Income
    } else {
        TxKind::Expense
    };
    let Some(ledger) = repo.active_ledger()?.recv().context("ledger query closed")? else {
        println!("No active ledger. Start one with `budgetpace ledger new`.");
        return Ok(());
    };
    match repo.add_transaction(ledger.id, note, amount, category, kind)? {
        Outcome::Applied(id) => println!(
            "Recorded {} {} in '{}' (id {})",
            kind, amount, ledger.name, id
        ),
        Outcome::Rejected(reason) => println!("Not recorded: {}", reason),
    }
    Ok(())
}

#[derive(Serialize)]
pub struct TransactionRow {
    pub id: i64,
    pub date: String,
    pub kind: String,
    pub category: String,
    pub amount: String,
    pub note: String,
}

impl From<&Transaction> for TransactionRow {
    fn from(t: &Transaction) -> Self {
        Self {
            id: t.id,
            date: fmt_local(&t.date),
            kind: t.kind.to_string(),
            category: t.category.clone(),
            amount: fmt_money(&t.amount),
            note: t.note.clone(),
        }
    }
}

/// Rows for `ledger`, or the active ledger when none is given.
pub fn query_rows(repo: &Repository, ledger: Option<i64>) -> Result<Vec<TransactionRow>> {
    let ledger_id = match ledger {
        Some(id) => id,
        None => match repo.active_ledger()?.recv().context("ledger query closed")? {
            Some(l) => l.id,
            None => return Ok(Vec::new()),
        },
    };
    let txs = repo
        .transactions_for(ledger_id)?
        .recv()
        .context("transaction query closed")?;
    Ok(txs.iter().map(TransactionRow::from).collect())
}

fn list(repo: &Repository, sub: &clap::ArgMatches) -> Result<()> {
    let data = query_rows(repo, sub.get_one::<i64>("ledger").copied())?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|r| {
                vec![
                    r.id.to_string(),
                    r.date.clone(),
                    r.kind.clone(),
                    r.category.clone(),
                    r.amount.clone(),
                    r.note.clone(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["ID", "Date", "Kind", "Category", "Amount", "Note"], rows)
        );
    }
    Ok(())
}

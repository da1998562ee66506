// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result, anyhow};
use serde::Serialize;

use crate::budget;
use crate::error::Outcome;
use crate::models::{Ledger, LedgerKind, PeriodUnit};
use crate::repository::{NewLedgerRequest, PeriodChoice, Repository};
use crate::utils::{
    end_of_local_day, fmt_local, fmt_money, maybe_print_json, parse_date, parse_decimal,
    parse_fixed_expense, pretty_table,
};

pub fn handle(repo: &Repository, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("new", sub)) => new_ledger(repo, sub)?,
        Some(("list", sub)) => list(repo, sub)?,
        Some(("switch", sub)) => switch(repo, sub)?,
        Some(("status", sub)) => status(repo, sub)?,
        Some(("archive", _)) => {
            let closed = repo.archive_expired_ledgers(repo.now())?;
            println!("Archived {} ledger(s)", closed);
        }
        _ => {}
    }
    Ok(())
}

pub fn request_from_args(sub: &clap::ArgMatches) -> Result<NewLedgerRequest> {
    let name = sub.get_one::<String>("name").unwrap().trim().to_string();
    let kind: LedgerKind = sub.get_one::<String>("type").unwrap().parse()?;
    let budget = parse_decimal(sub.get_one::<String>("budget").unwrap())?;
    let period = match sub.get_one::<String>("end") {
        Some(end) if kind == LedgerKind::Temporary => {
            PeriodChoice::CustomEnd(Some(end_of_local_day(parse_date(end)?)?))
        }
        Some(_) => return Err(anyhow!("--end only applies to temporary ledgers")),
        None if kind == LedgerKind::Temporary => PeriodChoice::CustomEnd(None),
        None => {
            let unit: PeriodUnit = sub.get_one::<String>("period").unwrap().parse()?;
            PeriodChoice::Period(unit)
        }
    };
    let fixed_expenses = sub
        .get_many::<String>("fixed")
        .map(|vals| vals.map(|v| parse_fixed_expense(v)).collect::<Result<Vec<_>>>())
        .transpose()?
        .unwrap_or_default();
    Ok(NewLedgerRequest {
        name,
        kind,
        budget,
        period,
        fixed_expenses,
    })
}

fn new_ledger(repo: &Repository, sub: &clap::ArgMatches) -> Result<()> {
    let req = request_from_args(sub)?;
    match repo.start_new_ledger(&req)? {
        Outcome::Applied(id) => println!("Started ledger '{}' (id {})", req.name, id),
        Outcome::Rejected(reason) => println!("Ledger not created: {}", reason),
    }
    Ok(())
}

fn list(repo: &Repository, sub: &clap::ArgMatches) -> Result<()> {
    let subscription = if sub.get_flag("archived") {
        repo.archived_ledgers()?
    } else if sub.get_flag("open") {
        repo.active_ledgers()?
    } else {
        repo.all_ledgers()?
    };
    let ledgers: Vec<Ledger> = subscription.recv().context("ledger query closed")?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &ledgers)? {
        let rows = ledgers
            .iter()
            .map(|l| {
                vec![
                    l.id.to_string(),
                    l.name.clone(),
                    l.kind.to_string(),
                    fmt_money(&l.total_budget),
                    fmt_local(&l.start_date),
                    fmt_local(&l.end_date),
                    state_label(l).to_string(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["ID", "Name", "Type", "Budget", "Start", "End", "State"],
                rows
            )
        );
    }
    Ok(())
}

fn state_label(l: &Ledger) -> &'static str {
    if l.is_closed {
        "closed"
    } else if l.is_active {
        "active"
    } else {
        "open"
    }
}

fn switch(repo: &Repository, sub: &clap::ArgMatches) -> Result<()> {
    let id = *sub.get_one::<i64>("id").unwrap();
    match repo.switch_ledger(id)? {
        Outcome::Applied(()) => println!("Switched to ledger {}", id),
        Outcome::Rejected(reason) => println!("Not switched: {}", reason),
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct LedgerStatus {
    pub id: i64,
    pub name: String,
    pub budget: String,
    pub net_spent: String,
    pub remaining: String,
    pub days_remaining: i64,
    pub daily_suggestion: String,
    pub closed: bool,
}

pub fn ledger_status(repo: &Repository) -> Result<Option<LedgerStatus>> {
    let Some(snapshot) = repo.active_snapshot()? else {
        return Ok(None);
    };
    let now = repo.now();
    let l = &snapshot.ledger;
    Ok(Some(LedgerStatus {
        id: l.id,
        name: l.name.clone(),
        budget: fmt_money(&l.total_budget),
        net_spent: fmt_money(&snapshot.net_spent),
        remaining: fmt_money(&budget::remaining_budget(l, snapshot.net_spent)?),
        days_remaining: budget::days_remaining(l, now),
        daily_suggestion: fmt_money(&budget::daily_suggestion(l, snapshot.net_spent, now)?),
        closed: l.is_closed,
    }))
}

fn status(repo: &Repository, sub: &clap::ArgMatches) -> Result<()> {
    let Some(st) = ledger_status(repo)? else {
        println!("No active ledger. Start one with `budgetpace ledger new`.");
        return Ok(());
    };
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &st)? {
        let rows = vec![
            vec!["Ledger".into(), format!("{} (id {})", st.name, st.id)],
            vec!["Budget".into(), st.budget.clone()],
            vec!["Net spent".into(), st.net_spent.clone()],
            vec!["Remaining".into(), st.remaining.clone()],
            vec!["Days remaining".into(), st.days_remaining.to_string()],
            vec!["Suggested per day".into(), st.daily_suggestion.clone()],
        ];
        println!("{}", pretty_table(&["", ""], rows));
    }
    Ok(())
}

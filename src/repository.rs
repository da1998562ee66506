// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! The only writer of ledgers and transactions.
//!
//! Multi-step writes run inside one SQL transaction and the live queries are
//! notified after commit, so subscribers never see a half-applied change.
//! Notifying only queues the refresh; writes do not wait for subscribers.
//! The single active ledger is kept by always clearing every flag before
//! setting one, backed by a partial unique index in the schema.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::budget;
use crate::db::{self, Store};
use crate::error::{Outcome, Rejection, Result};
use crate::live::{LiveQueries, QueryKey, Subscription, Table};
use crate::models::{
    Ledger, LedgerKind, LedgerSnapshot, NewLedger, NewTransaction, PeriodUnit, Transaction, TxKind,
};

pub const FIXED_EXPENSE_CATEGORY: &str = "Fixed Expense";

/// Largest accepted budget or transaction amount, 10^12. Keeps ledger sums
/// far from the `Decimal` range.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// How a new ledger's end date is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PeriodChoice {
    Period(PeriodUnit),
    /// Only meaningful for temporary ledgers; `None` means the default week.
    CustomEnd(Option<DateTime<Utc>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerRequest {
    pub name: String,
    pub kind: LedgerKind,
    pub budget: Decimal,
    pub period: PeriodChoice,
    /// (label, amount) pairs seeded as expenses.
    pub fixed_expenses: Vec<(String, Decimal)>,
}

pub struct Repository {
    store: Arc<Store>,
    queries: LiveQueries,
    clock: Arc<dyn Clock>,
}

impl Repository {
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        let queries = LiveQueries::new(Arc::clone(&store));
        Self {
            store,
            queries,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn queries(&self) -> &LiveQueries {
        &self.queries
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ---- read projections ----

    pub fn active_ledger(&self) -> Result<Subscription<Option<Ledger>>> {
        self.queries.subscribe(QueryKey::ActiveLedger)
    }

    pub fn all_ledgers(&self) -> Result<Subscription<Vec<Ledger>>> {
        self.queries.subscribe(QueryKey::AllLedgers)
    }

    /// Ledgers not yet closed.
    pub fn active_ledgers(&self) -> Result<Subscription<Vec<Ledger>>> {
        self.queries
            .subscribe_filtered(QueryKey::AllLedgers, |l| !l.is_closed)
    }

    pub fn archived_ledgers(&self) -> Result<Subscription<Vec<Ledger>>> {
        self.queries
            .subscribe_filtered(QueryKey::AllLedgers, |l| l.is_closed)
    }

    pub fn transactions_for(&self, ledger_id: i64) -> Result<Subscription<Vec<Transaction>>> {
        self.queries.subscribe(QueryKey::Transactions(ledger_id))
    }

    pub fn net_balance_for(&self, ledger_id: i64) -> Result<Subscription<Decimal>> {
        self.queries.subscribe(QueryKey::NetBalance(ledger_id))
    }

    /// Point-in-time view of the active ledger for prompts and status output.
    pub fn active_snapshot(&self) -> Result<Option<LedgerSnapshot>> {
        self.store.read(|conn| {
            let Some(ledger) = db::active_ledger(conn)? else {
                return Ok(None);
            };
            let net_spent = db::net_balance(conn, ledger.id)?;
            let transactions = db::list_transactions(conn, ledger.id)?;
            Ok(Some(LedgerSnapshot {
                ledger,
                net_spent,
                transactions,
            }))
        })
    }

    // ---- writes ----

    pub fn switch_ledger(&self, ledger_id: i64) -> Result<Outcome<()>> {
        let outcome = self.store.write(|tx| {
            match db::find_ledger(tx, ledger_id)? {
                None => return Ok(Outcome::Rejected(Rejection::UnknownLedger(ledger_id))),
                Some(l) if l.is_closed => {
                    return Ok(Outcome::Rejected(Rejection::LedgerClosed(ledger_id)));
                }
                Some(_) => {}
            }
            db::deactivate_all(tx)?;
            db::set_active(tx, ledger_id, true)?;
            Ok(Outcome::Applied(()))
        })?;
        self.finish(outcome, &[Table::Ledgers], "switch ledger")
    }

    pub fn start_new_ledger(&self, req: &NewLedgerRequest) -> Result<Outcome<i64>> {
        let now = self.clock.now();
        if let Some(rejection) = validate_new_ledger(req, now) {
            return self.finish(Outcome::Rejected(rejection), &[], "start ledger");
        }
        let end_date = match req.period {
            PeriodChoice::Period(unit) => budget::compute_end_date(req.kind, unit, None, now),
            PeriodChoice::CustomEnd(custom) => {
                budget::compute_end_date(req.kind, PeriodUnit::Week, custom, now)
            }
        };
        let new_ledger = NewLedger {
            name: req.name.trim().to_string(),
            kind: req.kind,
            total_budget: req.budget,
            start_date: now,
            end_date,
            is_active: true,
            is_closed: false,
        };
        let id = self.store.write(|tx| {
            db::deactivate_all(tx)?;
            let id = db::insert_ledger(tx, &new_ledger)?;
            for (label, amount) in &req.fixed_expenses {
                if label.trim().is_empty() || *amount <= Decimal::ZERO {
                    continue;
                }
                db::insert_transaction(
                    tx,
                    &NewTransaction {
                        ledger_id: id,
                        amount: *amount,
                        category: FIXED_EXPENSE_CATEGORY.to_string(),
                        note: label.trim().to_string(),
                        date: now,
                        kind: TxKind::Expense,
                    },
                )?;
            }
            Ok(id)
        })?;
        info!(ledger = id, name = %new_ledger.name, end = %end_date, "started ledger");
        self.finish(
            Outcome::Applied(id),
            &[Table::Ledgers, Table::Transactions],
            "start ledger",
        )
    }

    pub fn add_transaction(
        &self,
        ledger_id: i64,
        note: &str,
        amount: Decimal,
        category: &str,
        kind: TxKind,
    ) -> Result<Outcome<i64>> {
        let now = self.clock.now();
        let outcome = self.store.write(|tx| {
            if amount <= Decimal::ZERO {
                return Ok(Outcome::Rejected(Rejection::NonPositiveAmount));
            }
            if amount > MAX_AMOUNT {
                return Ok(Outcome::Rejected(Rejection::AmountTooLarge));
            }
            if category.trim().is_empty() {
                return Ok(Outcome::Rejected(Rejection::BlankCategory));
            }
            let Some(ledger) = db::find_ledger(tx, ledger_id)? else {
                return Ok(Outcome::Rejected(Rejection::UnknownLedger(ledger_id)));
            };
            if ledger.is_closed {
                return Ok(Outcome::Rejected(Rejection::LedgerClosed(ledger_id)));
            }
            if ledger.is_expired_at(now) {
                return Ok(Outcome::Rejected(Rejection::LedgerExpired(ledger_id)));
            }
            let id = db::insert_transaction(
                tx,
                &NewTransaction {
                    ledger_id,
                    amount,
                    category: category.trim().to_string(),
                    note: note.trim().to_string(),
                    date: now,
                    kind,
                },
            )?;
            Ok(Outcome::Applied(id))
        })?;
        self.finish(outcome, &[Table::Transactions], "add transaction")
    }

    pub fn delete_transaction(&self, transaction: &Transaction) -> Result<Outcome<()>> {
        self.delete_transaction_by_id(transaction.id)
    }

    pub fn delete_transaction_by_id(&self, id: i64) -> Result<Outcome<()>> {
        let outcome = self.store.write(|tx| {
            if db::delete_transaction(tx, id)? == 0 {
                Ok(Outcome::Rejected(Rejection::UnknownTransaction(id)))
            } else {
                Ok(Outcome::Applied(()))
            }
        })?;
        self.finish(outcome, &[Table::Transactions], "delete transaction")
    }

    /// Close every open ledger whose end date is before `now`. Returns how many closed.
    pub fn archive_expired_ledgers(&self, now: DateTime<Utc>) -> Result<usize> {
        let closed = self.store.write(|tx| {
            let mut closed = 0;
            for id in db::expired_open_ledgers(tx, now)? {
                closed += db::close_ledger(tx, id)?;
            }
            Ok(closed)
        })?;
        if closed > 0 {
            info!(closed, "archived expired ledgers");
            self.queries.notify(&[Table::Ledgers]);
        }
        Ok(closed)
    }

    fn finish<T>(&self, outcome: Outcome<T>, tables: &[Table], op: &str) -> Result<Outcome<T>> {
        match &outcome {
            Outcome::Applied(_) => self.queries.notify(tables),
            Outcome::Rejected(reason) => warn!(op, %reason, "operation not applied"),
        }
        Ok(outcome)
    }
}

fn validate_new_ledger(req: &NewLedgerRequest, now: DateTime<Utc>) -> Option<Rejection> {
    if req.name.trim().is_empty() {
        return Some(Rejection::BlankName);
    }
    if req.budget <= Decimal::ZERO {
        return Some(Rejection::NonPositiveBudget);
    }
    if req.budget > MAX_AMOUNT || req.fixed_expenses.iter().any(|(_, a)| *a > MAX_AMOUNT) {
        return Some(Rejection::AmountTooLarge);
    }
    match req.period {
        PeriodChoice::CustomEnd(Some(end)) if req.kind == LedgerKind::Temporary && end < now => {
            Some(Rejection::EndBeforeStart)
        }
        _ => None,
    }
}

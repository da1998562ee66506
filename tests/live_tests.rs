// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use budgetpace::db::Store;
use budgetpace::live::{IDLE_GRACE, QueryKey};
use budgetpace::models::{LedgerKind, PeriodUnit, TxKind};
use budgetpace::repository::{NewLedgerRequest, PeriodChoice, Repository};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn repo() -> Repository {
    Repository::new(Arc::new(Store::open_in_memory().unwrap()))
}

fn new_ledger(repo: &Repository, name: &str) -> i64 {
    repo.start_new_ledger(&NewLedgerRequest {
        name: name.into(),
        kind: LedgerKind::Daily,
        budget: Decimal::new(500, 0),
        period: PeriodChoice::Period(PeriodUnit::Month),
        fixed_expenses: Vec::new(),
    })
    .unwrap()
    .applied()
    .unwrap()
}

#[test]
fn subscription_delivers_current_value_immediately() {
    let repo = repo();
    let id = new_ledger(&repo, "A");
    let ledgers = repo.all_ledgers().unwrap();
    let first = ledgers.try_next().expect("value queued on subscribe");
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].id, id);
}

#[test]
fn writes_push_new_values() {
    let repo = repo();
    let ledgers = repo.all_ledgers().unwrap();
    assert!(ledgers.recv().unwrap().is_empty());
    new_ledger(&repo, "A");
    assert_eq!(ledgers.recv().unwrap().len(), 1);
    new_ledger(&repo, "B");
    assert_eq!(ledgers.recv().unwrap().len(), 2);
    assert!(repo.queries().wait_idle(WAIT));
    assert!(ledgers.try_next().is_none());
}

#[test]
fn subscribers_share_one_cached_query() {
    let repo = repo();
    let id = new_ledger(&repo, "A");
    let a = repo.transactions_for(id).unwrap();
    let b = repo.transactions_for(id).unwrap();
    let queries = repo.queries();
    assert_eq!(queries.subscriber_count(QueryKey::Transactions(id)), 2);

    repo.add_transaction(id, "", Decimal::ONE, "Food", TxKind::Expense)
        .unwrap();
    assert!(queries.wait_idle(WAIT));
    assert_eq!(a.latest().unwrap().len(), 1);
    assert_eq!(b.latest().unwrap().len(), 1);

    drop(a);
    assert_eq!(queries.subscriber_count(QueryKey::Transactions(id)), 1);
}

#[test]
fn unrelated_writes_do_not_re_emit() {
    let repo = repo();
    let id = new_ledger(&repo, "A");
    let active = repo.active_ledger().unwrap();
    assert!(active.recv().unwrap().is_some());
    repo.add_transaction(id, "", Decimal::ONE, "Food", TxKind::Expense)
        .unwrap();
    assert!(repo.queries().wait_idle(WAIT));
    assert!(active.try_next().is_none());
}

#[test]
fn writes_return_before_subscribers_are_refreshed() {
    let repo = repo();
    let id = new_ledger(&repo, "A");
    let balance = repo.net_balance_for(id).unwrap();
    assert_eq!(balance.recv().unwrap(), Decimal::ZERO);

    let queries = repo.queries();
    assert!(queries.wait_idle(WAIT));
    let pause = queries.pause();
    let outcome = repo
        .add_transaction(id, "", Decimal::new(30, 0), "Food", TxKind::Expense)
        .unwrap();
    assert!(outcome.is_applied());
    assert_eq!(queries.pending_refreshes(), 1);
    assert!(balance.try_next().is_none());

    // Queued invalidations are applied together.
    repo.add_transaction(id, "", Decimal::new(12, 0), "Food", TxKind::Expense)
        .unwrap();
    drop(pause);
    assert_eq!(balance.recv_timeout(WAIT), Some(Decimal::new(42, 0)));
    assert!(queries.wait_idle(WAIT));
    assert_eq!(queries.pending_refreshes(), 0);
    assert!(balance.try_next().is_none());
}

#[test]
fn new_subscriber_sees_writes_still_queued() {
    let repo = repo();
    let id = new_ledger(&repo, "A");
    let first = repo.transactions_for(id).unwrap();
    assert!(first.recv().unwrap().is_empty());

    let queries = repo.queries();
    assert!(queries.wait_idle(WAIT));
    let pause = queries.pause();
    repo.add_transaction(id, "tea", Decimal::new(3, 0), "Food", TxKind::Expense)
        .unwrap();
    let second = repo.transactions_for(id).unwrap();
    assert_eq!(second.try_next().unwrap().len(), 1);
    assert_eq!(first.try_next().unwrap().len(), 1);
    drop(pause);

    assert!(queries.wait_idle(WAIT));
    assert!(first.try_next().is_none());
    assert!(second.try_next().is_none());
}

#[test]
fn filtered_views_skip_unchanged_lists() {
    let repo = repo();
    let a = new_ledger(&repo, "A");
    let b = new_ledger(&repo, "B");
    let archived = repo.archived_ledgers().unwrap();
    let open = repo.active_ledgers().unwrap();
    assert!(archived.recv().unwrap().is_empty());
    assert_eq!(open.recv().unwrap().len(), 2);

    assert!(repo.switch_ledger(a).unwrap().is_applied());
    assert!(repo.queries().wait_idle(WAIT));
    assert!(archived.try_next().is_none());
    let reordered = open.try_next().expect("active flag changed");
    assert!(reordered.iter().any(|l| l.id == a && l.is_active));
    assert!(reordered.iter().any(|l| l.id == b && !l.is_active));
}

#[test]
fn idle_queries_are_torn_down_and_rebuilt() {
    let repo = repo();
    let id = new_ledger(&repo, "A");
    let before = repo.all_ledgers().unwrap().recv().unwrap();
    let queries = repo.queries();
    assert_eq!(queries.cached_queries(), 1);

    // Still inside the grace period: kept.
    queries.evict_idle_at(Instant::now());
    assert_eq!(queries.cached_queries(), 1);

    queries.evict_idle_at(Instant::now() + IDLE_GRACE + Duration::from_secs(1));
    assert_eq!(queries.cached_queries(), 0);

    let after = repo.all_ledgers().unwrap().recv().unwrap();
    assert_eq!(before, after);
    assert_eq!(after[0].id, id);
}

#[test]
fn subscribers_on_other_threads_see_writes() {
    let repo = repo();
    let id = new_ledger(&repo, "A");
    let balance = repo.net_balance_for(id).unwrap();
    assert_eq!(balance.recv().unwrap(), Decimal::ZERO);

    let reader = thread::spawn(move || balance.recv_timeout(Duration::from_secs(5)));
    repo.add_transaction(id, "", Decimal::new(75, 0), "Food", TxKind::Expense)
        .unwrap();
    assert_eq!(reader.join().unwrap(), Some(Decimal::new(75, 0)));
}

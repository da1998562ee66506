// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Live queries over the store.
//!
//! Each distinct [`QueryKey`] has at most one cached result shared by all of
//! its subscribers. A write reports the tables it touched through
//! [`LiveQueries::notify`], which only queues the invalidation and returns.
//! A refresh worker drains the queue, recomputes every cached query that
//! depends on one of the tables once, and pushes changed values to each
//! subscriber's channel. Entries left without subscribers are evicted after
//! [`IDLE_GRACE`] and are rebuilt from the store on the next subscription.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::db::{self, Store};
use crate::error::Result;
use crate::models::{Ledger, Transaction};

pub const IDLE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Ledgers,
    Transactions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    AllLedgers,
    ActiveLedger,
    Transactions(i64),
    NetBalance(i64),
}

impl QueryKey {
    fn depends_on(&self, table: Table) -> bool {
        match self {
            QueryKey::AllLedgers | QueryKey::ActiveLedger => table == Table::Ledgers,
            // Ledger deletes cascade into transactions.
            QueryKey::Transactions(_) | QueryKey::NetBalance(_) => true,
        }
    }

    fn compute(&self, store: &Store) -> Result<QueryResult> {
        store.read(|conn| {
            Ok(match *self {
                QueryKey::AllLedgers => QueryResult::Ledgers(db::list_ledgers(conn)?),
                QueryKey::ActiveLedger => QueryResult::Ledger(db::active_ledger(conn)?),
                QueryKey::Transactions(id) => {
                    QueryResult::Transactions(db::list_transactions(conn, id)?)
                }
                QueryKey::NetBalance(id) => QueryResult::Balance(db::net_balance(conn, id)?),
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Ledgers(Vec<Ledger>),
    Ledger(Option<Ledger>),
    Transactions(Vec<Transaction>),
    Balance(Decimal),
}

/// Conversion from the shared cache value into what a subscriber asked for.
pub trait Projection: Sized {
    fn project(value: QueryResult) -> Option<Self>;
}

impl Projection for Vec<Ledger> {
    fn project(value: QueryResult) -> Option<Self> {
        match value {
            QueryResult::Ledgers(v) => Some(v),
            _ => None,
        }
    }
}

impl Projection for Option<Ledger> {
    fn project(value: QueryResult) -> Option<Self> {
        match value {
            QueryResult::Ledger(v) => Some(v),
            _ => None,
        }
    }
}

impl Projection for Vec<Transaction> {
    fn project(value: QueryResult) -> Option<Self> {
        match value {
            QueryResult::Transactions(v) => Some(v),
            _ => None,
        }
    }
}

impl Projection for Decimal {
    fn project(value: QueryResult) -> Option<Self> {
        match value {
            QueryResult::Balance(v) => Some(v),
            _ => None,
        }
    }
}

pub type LedgerFilter = fn(&Ledger) -> bool;

struct Subscriber {
    id: u64,
    tx: Sender<QueryResult>,
    keep: Option<LedgerFilter>,
    /// Last filtered value sent, for subscribers with a filter.
    last: Option<QueryResult>,
}

impl Subscriber {
    /// Send `value` through this subscriber's filter. False once the receiver is gone.
    fn offer(&mut self, value: &QueryResult) -> bool {
        let Some(keep) = self.keep else {
            return self.tx.send(value.clone()).is_ok();
        };
        let filtered = match value {
            QueryResult::Ledgers(list) => {
                QueryResult::Ledgers(list.iter().filter(|l| keep(l)).cloned().collect())
            }
            other => other.clone(),
        };
        if self.last.as_ref() == Some(&filtered) {
            return true;
        }
        self.last = Some(filtered.clone());
        self.tx.send(filtered).is_ok()
    }
}

struct Entry {
    value: QueryResult,
    subscribers: Vec<Subscriber>,
    idle_since: Option<Instant>,
    /// The last refresh failed, so `value` may be out of date.
    stale: bool,
}

impl Entry {
    fn update(&mut self, key: QueryKey, value: QueryResult) {
        self.stale = false;
        if value == self.value {
            return;
        }
        debug!(?key, subscribers = self.subscribers.len(), "live query changed");
        self.subscribers.retain_mut(|s| s.offer(&value));
        if self.subscribers.is_empty() && self.idle_since.is_none() {
            self.idle_since = Some(Instant::now());
        }
        self.value = value;
    }
}

struct Shared {
    store: Arc<Store>,
    entries: Mutex<HashMap<QueryKey, Entry>>,
    next_id: AtomicU64,
    invalidations: Sender<Vec<Table>>,
    /// Invalidations queued but not yet applied.
    backlog: Mutex<usize>,
    settled: Condvar,
    paused: Mutex<()>,
}

impl Shared {
    fn entries(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn backlog(&self) -> MutexGuard<'_, usize> {
        self.backlog
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn settle(&self, applied: usize) {
        let mut backlog = self.backlog();
        *backlog = backlog.saturating_sub(applied);
        if *backlog == 0 {
            self.settled.notify_all();
        }
    }

    fn refresh(&self, tables: &[Table]) {
        let mut entries = self.entries();
        evict_idle(&mut entries, Instant::now());
        for (key, entry) in entries.iter_mut() {
            if !tables.iter().any(|t| key.depends_on(*t)) {
                continue;
            }
            match key.compute(&self.store) {
                Ok(value) => entry.update(*key, value),
                Err(error) => {
                    warn!(?key, %error, "live query refresh failed");
                    entry.stale = true;
                }
            }
        }
    }
}

/// Applies queued invalidations until every [`LiveQueries`] handle is gone.
fn run_refresher(weak: Weak<Shared>, rx: Receiver<Vec<Table>>) {
    while let Ok(mut tables) = rx.recv() {
        let Some(shared) = weak.upgrade() else {
            break;
        };
        let _running = shared
            .paused
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut applied = 1;
        while let Ok(more) = rx.try_recv() {
            tables.extend(more);
            applied += 1;
        }
        tables.sort_unstable();
        tables.dedup();
        shared.refresh(&tables);
        shared.settle(applied);
    }
    debug!("live query refresher stopped");
}

/// Holds back refreshes while alive. Invalidations queue up and are applied
/// together once it is dropped.
pub struct RefreshPause<'a> {
    _guard: MutexGuard<'a, ()>,
}

#[derive(Clone)]
pub struct LiveQueries {
    shared: Arc<Shared>,
}

impl LiveQueries {
    pub fn new(store: Arc<Store>) -> Self {
        let (tx, rx) = mpsc::channel();
        let shared = Arc::new(Shared {
            store,
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            invalidations: tx,
            backlog: Mutex::new(0),
            settled: Condvar::new(),
            paused: Mutex::new(()),
        });
        let weak = Arc::downgrade(&shared);
        if let Err(error) = thread::Builder::new()
            .name("live-queries".into())
            .spawn(move || run_refresher(weak, rx))
        {
            warn!(%error, "could not start live query refresher");
        }
        Self { shared }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.shared.store
    }

    /// Subscribe to `key`. The current value is queued before this returns.
    pub fn subscribe<T: Projection>(&self, key: QueryKey) -> Result<Subscription<T>> {
        self.attach(key, None)
    }

    /// Like [`subscribe`](Self::subscribe), with a row filter applied to ledger
    /// lists. The subscriber is only woken when its filtered list changes.
    pub fn subscribe_filtered<T: Projection>(
        &self,
        key: QueryKey,
        keep: LedgerFilter,
    ) -> Result<Subscription<T>> {
        self.attach(key, Some(keep))
    }

    fn attach<T: Projection>(
        &self,
        key: QueryKey,
        keep: Option<LedgerFilter>,
    ) -> Result<Subscription<T>> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel();
        let queued = *self.shared.backlog() > 0;
        let mut entries = self.shared.entries();
        evict_idle(&mut entries, Instant::now());
        match entries.get_mut(&key) {
            // A queued write may not be reflected yet.
            Some(entry) if queued || entry.stale => {
                entry.update(key, key.compute(&self.shared.store)?)
            }
            Some(_) => {}
            None => {
                debug!(?key, "building live query");
                let value = key.compute(&self.shared.store)?;
                entries.insert(
                    key,
                    Entry {
                        value,
                        subscribers: Vec::new(),
                        idle_since: None,
                        stale: false,
                    },
                );
            }
        }
        if let Some(entry) = entries.get_mut(&key) {
            let mut subscriber = Subscriber {
                id,
                tx,
                keep,
                last: None,
            };
            // Receiver is alive: it is returned below.
            subscriber.offer(&entry.value);
            entry.subscribers.push(subscriber);
            entry.idle_since = None;
        }
        Ok(Subscription {
            owner: self.clone(),
            key,
            id,
            rx,
            _marker: PhantomData,
        })
    }

    /// Queue a refresh of every cached query that reads one of `tables`.
    /// Returns without waiting for the refresh.
    pub fn notify(&self, tables: &[Table]) {
        if tables.is_empty() {
            return;
        }
        *self.shared.backlog() += 1;
        if self.shared.invalidations.send(tables.to_vec()).is_err() {
            warn!(?tables, "live query refresher is gone; subscribers not updated");
            self.shared.settle(1);
        }
    }

    /// Hold back refreshes until the returned guard is dropped.
    pub fn pause(&self) -> RefreshPause<'_> {
        RefreshPause {
            _guard: self
                .shared
                .paused
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        }
    }

    /// Invalidations queued but not yet applied.
    pub fn pending_refreshes(&self) -> usize {
        *self.shared.backlog()
    }

    /// Block until every queued refresh has been applied. False on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let backlog = self.shared.backlog();
        let (backlog, _) = self
            .shared
            .settled
            .wait_timeout_while(backlog, timeout, |pending| *pending > 0)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *backlog == 0
    }

    /// Drop entries idle for longer than [`IDLE_GRACE`] as of `now`.
    pub fn evict_idle_at(&self, now: Instant) {
        evict_idle(&mut self.shared.entries(), now);
    }

    /// Number of queries currently cached.
    pub fn cached_queries(&self) -> usize {
        self.shared.entries().len()
    }

    pub fn subscriber_count(&self, key: QueryKey) -> usize {
        self.shared
            .entries()
            .get(&key)
            .map(|e| e.subscribers.len())
            .unwrap_or(0)
    }

    fn unsubscribe(&self, key: QueryKey, id: u64) {
        let mut entries = self.shared.entries();
        if let Some(entry) = entries.get_mut(&key) {
            entry.subscribers.retain(|s| s.id != id);
            if entry.subscribers.is_empty() {
                entry.idle_since = Some(Instant::now());
            }
        }
    }
}

fn evict_idle(entries: &mut HashMap<QueryKey, Entry>, now: Instant) {
    entries.retain(|key, entry| match entry.idle_since {
        Some(since) if now.saturating_duration_since(since) >= IDLE_GRACE => {
            debug!(?key, "tearing down idle live query");
            false
        }
        _ => true,
    });
}

/// One subscriber's view of a live query. Dropping it unsubscribes.
pub struct Subscription<T> {
    owner: LiveQueries,
    key: QueryKey,
    id: u64,
    rx: Receiver<QueryResult>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Projection> Subscription<T> {
    pub fn key(&self) -> QueryKey {
        self.key
    }

    /// Block until the next value. `None` once the query is torn down.
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok().and_then(T::project)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(v) => T::project(v),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Next queued value without blocking.
    pub fn try_next(&self) -> Option<T> {
        self.rx.try_recv().ok().and_then(T::project)
    }

    /// Drain the queue and return the newest value, if any arrived.
    pub fn latest(&self) -> Option<T> {
        let mut last = None;
        while let Ok(v) = self.rx.try_recv() {
            last = Some(v);
        }
        last.and_then(T::project)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.owner.unsubscribe(self.key, self.id);
    }
}

// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::models::{Ledger, LedgerKind, PeriodUnit};

pub const TEMPORARY_DEFAULT_DAYS: i64 = 7;

/// End of a period starting at `start`.
///
/// Temporary ledgers end at `custom_end` or a week after start. Other ledgers
/// advance by `period` on the calendar; a day past the end of the target month
/// clamps to its last day (Jan 31 + 1 month = Feb 28/29).
pub fn compute_end_date(
    kind: LedgerKind,
    period: PeriodUnit,
    custom_end: Option<DateTime<Utc>>,
    start: DateTime<Utc>,
) -> DateTime<Utc> {
    if kind == LedgerKind::Temporary {
        return custom_end.unwrap_or(start + Duration::days(TEMPORARY_DEFAULT_DAYS));
    }
    let months = match period {
        PeriodUnit::Week => return start + Duration::days(7),
        PeriodUnit::Month => 1,
        PeriodUnit::Quarter => 3,
        PeriodUnit::Year => 12,
    };
    start
        .checked_add_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whole days from `from` to `to`, floored, never below 1.
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_days().max(1)
}

/// Suggested spend per day.
///
/// Before the end date: what is left of the budget spread over the remaining
/// days. After it: the average actually spent per day of the whole period.
pub fn daily_suggestion(
    ledger: &Ledger,
    net_spent: Decimal,
    now: DateTime<Utc>,
) -> Result<Decimal> {
    let (amount, days) = if now > ledger.end_date {
        (net_spent, days_between(ledger.start_date, ledger.end_date))
    } else {
        (
            remaining_budget(ledger, net_spent)?,
            days_between(now, ledger.end_date),
        )
    };
    amount
        .checked_div(Decimal::from(days))
        .ok_or_else(|| overflow(ledger))
}

pub fn remaining_budget(ledger: &Ledger, net_spent: Decimal) -> Result<Decimal> {
    ledger
        .total_budget
        .checked_sub(net_spent)
        .ok_or_else(|| overflow(ledger))
}

fn overflow(ledger: &Ledger) -> Error {
    Error::InvalidValue(format!("budget arithmetic for ledger {} overflows", ledger.id))
}

/// Whole days left before the end date; zero once it has passed.
pub fn days_remaining(ledger: &Ledger, now: DateTime<Utc>) -> i64 {
    if now > ledger.end_date {
        0
    } else {
        (ledger.end_date - now).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 30, 0).unwrap()
    }

    #[test]
    fn month_clamps_to_short_month() {
        let end = compute_end_date(LedgerKind::Daily, PeriodUnit::Month, None, at(2024, 1, 31));
        assert_eq!(end, at(2024, 2, 29));
    }

    #[test]
    fn quarter_and_year_are_calendar_aware() {
        let start = at(2025, 11, 30);
        assert_eq!(
            compute_end_date(LedgerKind::Special, PeriodUnit::Quarter, None, start),
            at(2026, 2, 28)
        );
        assert_eq!(
            compute_end_date(LedgerKind::Daily, PeriodUnit::Year, None, at(2024, 2, 29)),
            at(2025, 2, 28)
        );
    }

    #[test]
    fn temporary_ignores_period() {
        let start = at(2025, 3, 1);
        let custom = at(2025, 3, 20);
        assert_eq!(
            compute_end_date(LedgerKind::Temporary, PeriodUnit::Year, Some(custom), start),
            custom
        );
    }

    #[test]
    fn overflowing_pace_is_an_error() {
        let start = at(2025, 3, 1);
        let ledger = Ledger {
            id: 4,
            name: "Huge".into(),
            kind: LedgerKind::Daily,
            total_budget: Decimal::MAX,
            start_date: start,
            end_date: start + Duration::days(10),
            is_active: true,
            is_closed: false,
        };
        let refunds = -Decimal::MAX;
        assert!(matches!(
            remaining_budget(&ledger, refunds),
            Err(Error::InvalidValue(_))
        ));
        assert!(daily_suggestion(&ledger, refunds, start).is_err());
        assert_eq!(
            daily_suggestion(&ledger, Decimal::MAX, start).unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn same_day_period_counts_as_one_day() {
        let start = at(2025, 3, 1);
        assert_eq!(days_between(start, start + Duration::hours(3)), 1);
    }
}

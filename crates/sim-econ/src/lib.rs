#![deny(warnings)]

//! Economic models: calendar and rent helpers for City Developer.
//!
//! This module provides exact utilities for:
//! - Calendar arithmetic (days in month, month boundaries, rollovers crossed)
//! - Splitting elapsed time into partial and full rent windows
//! - Prorating rent and upgrade increases over a window, rounded down to 5
//! - Sale proceeds and neighborhood value/boost statistics

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors produced by economic helpers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EconError {
    /// Decimal arithmetic exceeded the representable range.
    #[error("decimal overflow while computing {0}")]
    Overflow(&'static str),
}

/// Rent amounts are truncated to multiples of this value.
pub const RENT_GRANULARITY: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// Share of the listed price refunded when a property is sold.
pub const SALE_REFUND_RATIO: Decimal = Decimal::from_parts(8, 0, 0, false, 1);

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Number of days in the calendar month containing `date`.
///
/// Example:
/// let feb = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
/// assert_eq!(days_in_month(feb), 29);
pub fn days_in_month(date: NaiveDate) -> u32 {
    month_end(date).day()
}

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Last day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    next_month_start(date)
        .and_then(|next| next.pred_opt())
        .unwrap_or_else(|| date.with_day(31).unwrap_or(date))
}

/// First day of the month after the one containing `date`.
pub fn next_month_start(date: NaiveDate) -> Option<NaiveDate> {
    month_start(date).checked_add_months(Months::new(1))
}

pub fn is_last_day_of_month(date: NaiveDate) -> bool {
    date.day() == days_in_month(date)
}

fn month_ordinal(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

/// Number of first-of-month boundaries strictly after `last` and not after
/// `current`. Zero when `current` precedes `last`.
///
/// Example:
/// months_passed(2023-01-27, 2023-02-01) == 1
/// months_passed(2023-02-01, 2023-05-01) == 3
pub fn months_passed(last: NaiveDate, current: NaiveDate) -> u32 {
    if current < last {
        return 0;
    }
    u32::try_from(month_ordinal(current) - month_ordinal(last)).unwrap_or(u32::MAX)
}

/// Inclusive day count of `[start, end]`; zero for an empty range.
pub fn inclusive_days(start: NaiveDate, end: NaiveDate) -> u32 {
    if end < start {
        return 0;
    }
    u32::try_from((end - start).num_days() + 1).unwrap_or(u32::MAX)
}

/// A contiguous date range within a single calendar month.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RentWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// True for the remainder of the month rent was last processed in.
    pub partial: bool,
}

impl RentWindow {
    /// The whole calendar month containing `date`.
    pub fn month_of(date: NaiveDate) -> Self {
        Self {
            start: month_start(date),
            end: month_end(date),
            partial: false,
        }
    }

    /// Days of the window's calendar month, the divisor for proration.
    pub fn days_in_month(&self) -> u32 {
        days_in_month(self.start)
    }
}

/// Split the span between the last processed date and the current date
/// into rent windows.
///
/// Nothing is due until at least one month boundary has been crossed. The
/// remainder of `last`'s month, when it has any days left, is a partial
/// window that consumes one of the crossed months. Each remaining crossed
/// month is processed in full, starting with the month after `last`.
pub fn rent_windows(last: NaiveDate, current: NaiveDate) -> Vec<RentWindow> {
    let mut remaining = months_passed(last, current);
    if remaining == 0 {
        return Vec::new();
    }
    let mut windows = Vec::new();
    if !is_last_day_of_month(last) {
        windows.push(RentWindow {
            start: last,
            end: month_end(last),
            partial: true,
        });
        remaining -= 1;
    }
    let mut next = next_month_start(last);
    while remaining > 0 {
        let Some(start) = next else { break };
        windows.push(RentWindow::month_of(start));
        next = next_month_start(start);
        remaining -= 1;
    }
    windows
}

/// An upgrade's monthly increase and the day its work finishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpgradeAccrual {
    pub rent_increase: Decimal,
    pub completion_date: NaiveDate,
}

/// Rent terms of one owned property.
#[derive(Clone, Copy, Debug)]
pub struct RentBasis<'a> {
    pub base_rent: Decimal,
    pub rent_boost: Decimal,
    pub purchase_date: NaiveDate,
    pub upgrades: &'a [UpgradeAccrual],
}

/// Round down to the nearest multiple of [`RENT_GRANULARITY`].
///
/// Example:
/// assert_eq!(round_down_to_granularity(Decimal::new(12999, 2)), Decimal::new(125, 0));
pub fn round_down_to_granularity(value: Decimal) -> Decimal {
    (value / RENT_GRANULARITY).floor() * RENT_GRANULARITY
}

/// Rent owed for one property over one window.
///
/// Rent accrues from the day after purchase; each upgrade accrues from the
/// day after its completion, never before the property itself accrues. All
/// contributions are summed over whole days before the single division by
/// the month length and the final truncation.
pub fn window_rent(window: &RentWindow, basis: &RentBasis<'_>) -> Result<Decimal, EconError> {
    let Some(first_rent_day) = basis.purchase_date.succ_opt() else {
        return Ok(Decimal::ZERO);
    };
    let rent_start = first_rent_day.max(window.start);
    if rent_start > window.end {
        return Ok(Decimal::ZERO);
    }
    let monthly = basis
        .base_rent
        .checked_add(basis.rent_boost)
        .ok_or(EconError::Overflow("monthly rent"))?;
    let mut accrued = monthly
        .checked_mul(Decimal::from(inclusive_days(rent_start, window.end)))
        .ok_or(EconError::Overflow("base rent"))?;
    for upgrade in basis.upgrades {
        let Some(first_day) = upgrade.completion_date.succ_opt() else {
            continue;
        };
        let days = inclusive_days(first_day.max(rent_start), window.end);
        if days == 0 {
            continue;
        }
        let share = upgrade
            .rent_increase
            .checked_mul(Decimal::from(days))
            .ok_or(EconError::Overflow("upgrade rent"))?;
        accrued = accrued
            .checked_add(share)
            .ok_or(EconError::Overflow("window rent"))?;
    }
    Ok(round_down_to_granularity(
        accrued / Decimal::from(window.days_in_month()),
    ))
}

/// Amount credited to the owner when a property is sold.
///
/// Example:
/// assert_eq!(sale_proceeds(Decimal::new(300_000, 0)), Decimal::new(240_000, 0));
pub fn sale_proceeds(price: Decimal) -> Decimal {
    price * SALE_REFUND_RATIO
}

/// Mean of the given values; zero for an empty slice.
pub fn average_value(values: &[Decimal]) -> Result<Decimal, EconError> {
    if values.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let total = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
        .ok_or(EconError::Overflow("average value"))?;
    Ok(total / Decimal::from(values.len()))
}

/// Percentage of `total` represented by `upgraded`; zero when `total` is zero.
pub fn upgraded_percent(upgraded: usize, total: usize) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(upgraded) * HUNDRED / Decimal::from(total)
}

/// Whether the upgraded percentage strictly exceeds the threshold.
pub fn boost_threshold_exceeded(upgraded_percent: Decimal, threshold_percent: Decimal) -> bool {
    upgraded_percent > threshold_percent
}

/// Rent boost granted by a neighborhood: `boost_percent` of `base_rent`.
pub fn neighborhood_rent_boost(base_rent: Decimal, boost_percent: Decimal) -> Result<Decimal, EconError> {
    base_rent
        .checked_mul(boost_percent)
        .map(|scaled| scaled / HUNDRED)
        .ok_or(EconError::Overflow("rent boost"))
}

//! Dose ledger operations on [`Medication::taken_history`].
//!
//! A day's row is sized from `time_slots` when the day is first touched and
//! is never resized afterwards, so every reader works from the stored row
//! length rather than the medication's current slot count.

use crate::{DayStatus, Medication};
use chrono::{Duration, NaiveDate};

/// Insert an all-false row for `date` if none exists.
///
/// Returns `true` when a row was inserted.
pub fn ensure_day(medication: &mut Medication, date: NaiveDate) -> bool {
    if medication.taken_history.contains_key(&date) {
        return false;
    }
    let slots = medication.time_slots.len();
    medication.taken_history.insert(date, vec![false; slots]);
    tracing::debug!(
        "Initialized {} slot(s) for {} on {}",
        slots,
        medication.id,
        date
    );
    true
}

/// Flip the taken flag for `slot` on `date`.
///
/// Returns the new value, or `None` when `slot` is outside the stored row
/// (stale index after a slot edit), in which case nothing changes apart from
/// the day row being initialized.
pub fn toggle(medication: &mut Medication, date: NaiveDate, slot: usize) -> Option<bool> {
    ensure_day(medication, date);
    let row = medication.taken_history.get_mut(&date)?;
    let len = row.len();
    match row.get_mut(slot) {
        Some(flag) => {
            *flag = !*flag;
            Some(*flag)
        }
        None => {
            tracing::debug!(
                "Ignoring toggle of slot {} for {} on {}: row has {} slot(s)",
                slot,
                medication.id,
                date,
                len
            );
            None
        }
    }
}

/// Stored row for `date`, if the day was initialized
pub fn day(medication: &Medication, date: NaiveDate) -> Option<&[bool]> {
    medication.taken_history.get(&date).map(Vec::as_slice)
}

/// All slots taken on `date` (by the stored row length)
pub fn is_complete(medication: &Medication, date: NaiveDate) -> bool {
    day(medication, date).map_or(false, |row| day_status(row) == DayStatus::Complete)
}

/// Some but not all slots taken on `date`
pub fn is_partial(medication: &Medication, date: NaiveDate) -> bool {
    day(medication, date).map_or(false, |row| day_status(row) == DayStatus::InProgress)
}

/// Three-state badge for one day row.
///
/// An empty row counts as pending.
pub fn day_status(row: &[bool]) -> DayStatus {
    let taken = row.iter().filter(|t| **t).count();
    if taken == 0 {
        DayStatus::Pending
    } else if taken == row.len() {
        DayStatus::Complete
    } else {
        DayStatus::InProgress
    }
}

/// Drop rows older than the last `retention_days` days ending at `today`.
///
/// Returns the number of rows removed.
pub fn prune_history(medication: &mut Medication, today: NaiveDate, retention_days: u32) -> usize {
    let cutoff = today - Duration::days(i64::from(retention_days.max(1)) - 1);
    let before = medication.taken_history.len();
    medication.taken_history = medication.taken_history.split_off(&cutoff);
    let removed = before - medication.taken_history.len();
    if removed > 0 {
        tracing::debug!(
            "Pruned {} ledger row(s) before {} for {}",
            removed,
            cutoff,
            medication.id
        );
    }
    removed
}

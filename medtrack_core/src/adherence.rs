//! Adherence statistics over the dose ledger.
//!
//! Every day is counted with its own stored row length; rows written before a
//! slot edit keep their original size.

use crate::{ledger, Medication};
use chrono::NaiveDate;
use serde::Serialize;

/// Percentage of scheduled doses marked taken across all tracked days.
///
/// Rounded to the nearest integer. Returns 0 when nothing was scheduled.
pub fn adherence(medication: &Medication) -> u8 {
    let (taken, scheduled) = medication
        .taken_history
        .values()
        .fold((0usize, 0usize), |(taken, scheduled), row| {
            (
                taken + row.iter().filter(|t| **t).count(),
                scheduled + row.len(),
            )
        });
    percentage(taken, scheduled)
}

/// Number of distinct days present in the ledger
pub fn days_tracked(medication: &Medication) -> usize {
    medication.taken_history.len()
}

fn percentage(taken: usize, scheduled: usize) -> u8 {
    if scheduled == 0 {
        return 0;
    }
    let pct = (taken as f64 / scheduled as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Doses taken versus scheduled for one day across all medications
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyOverview {
    pub date: NaiveDate,
    pub taken: usize,
    pub scheduled: usize,
    pub percentage: u8,
}

/// Progress for `date` over the medications whose course covers it.
///
/// Days without a stored row count their current slot count as scheduled
/// with nothing taken.
pub fn daily_overview(medications: &[Medication], date: NaiveDate) -> DailyOverview {
    let (taken, scheduled) = medications
        .iter()
        .filter(|m| m.is_active_on(date))
        .fold((0, 0), |(taken, scheduled), m| match ledger::day(m, date) {
            Some(row) => (
                taken + row.iter().filter(|t| **t).count(),
                scheduled + row.len(),
            ),
            None => (taken, scheduled + m.time_slots.len()),
        });

    DailyOverview {
        date,
        taken,
        scheduled,
        percentage: percentage(taken, scheduled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::tests::{date, medication};
    use crate::Frequency;

    #[test]
    fn test_empty_ledger_is_zero() {
        let med = medication(Frequency::Twice);
        assert_eq!(adherence(&med), 0);
        assert_eq!(days_tracked(&med), 0);
    }

    #[test]
    fn test_half_taken() {
        let d = date("2026-01-15");
        let mut med = medication(Frequency::Twice);
        ledger::ensure_day(&mut med, d);
        assert_eq!(med.taken_history[&d], vec![false, false]);

        ledger::toggle(&mut med, d, 0);
        assert_eq!(med.taken_history[&d], vec![true, false]);
        assert_eq!(adherence(&med), 50);
        assert_eq!(days_tracked(&med), 1);
    }

    #[test]
    fn test_mixed_row_lengths() {
        let mut med = medication(Frequency::Thrice);
        med.taken_history.insert(date("2026-01-15"), vec![true, true, true]);
        med.taken_history.insert(date("2026-01-16"), vec![true]);
        med.taken_history.insert(date("2026-01-17"), vec![false, false]);

        // 4 of 6
        assert_eq!(adherence(&med), 67);
        assert_eq!(days_tracked(&med), 3);
    }

    #[test]
    fn test_bounds() {
        let mut med = medication(Frequency::Once);
        med.taken_history.insert(date("2026-01-15"), vec![true]);
        med.taken_history.insert(date("2026-01-16"), vec![]);
        assert_eq!(adherence(&med), 100);

        med.taken_history.clear();
        med.taken_history.insert(date("2026-01-15"), vec![]);
        assert_eq!(adherence(&med), 0);
    }

    #[test]
    fn test_daily_overview() {
        let d = date("2026-01-20");
        let mut a = medication(Frequency::Twice);
        ledger::toggle(&mut a, d, 1);

        // No row yet: counts its current slots as pending
        let b = medication(Frequency::Thrice);

        // Course already over
        let mut c = medication(Frequency::Once);
        c.end_date = Some(date("2026-01-18"));

        let overview = daily_overview(&[a, b, c], d);
        assert_eq!(overview.taken, 1);
        assert_eq!(overview.scheduled, 5);
        assert_eq!(overview.percentage, 20);
    }
}

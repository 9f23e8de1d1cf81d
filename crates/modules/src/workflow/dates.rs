//! Weekly date range for the workflow's loop parameter.

use chrono::{Datelike, Days, NaiveDate};
use sigex_core::DomainError;

/// Inclusive range of dates advancing a week at a time.
///
/// Both bounds must fall on the same weekday so the last yielded date is
/// exactly `end`. Once constructed, iteration is total.
#[derive(Debug, Clone)]
pub struct WeeklyDates {
    next: Option<NaiveDate>,
    end: NaiveDate,
}

impl WeeklyDates {
    pub fn new(start: NaiveDate, end: NaiveDate) -> sigex_core::Result<Self> {
        if start > end {
            return Err(DomainError::Precondition(format!(
                "weekly range start {start} is after end {end}"
            )));
        }
        if start.weekday() != end.weekday() {
            return Err(DomainError::Precondition(format!(
                "weekly range bounds fall on different weekdays: {} vs {}",
                start.weekday(),
                end.weekday()
            )));
        }
        Ok(Self {
            next: Some(start),
            end,
        })
    }
}

impl Iterator for WeeklyDates {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.next?;
        self.next = current
            .checked_add_days(Days::new(7))
            .filter(|advanced| *advanced <= self.end);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn yields_every_week_inclusive_of_both_bounds() {
        let dates: Vec<_> = WeeklyDates::new(date(2024, 6, 2), date(2024, 6, 16))
            .unwrap()
            .collect();
        assert_eq!(
            dates,
            vec![date(2024, 6, 2), date(2024, 6, 9), date(2024, 6, 16)]
        );
    }

    #[test]
    fn single_week_range_yields_one_date() {
        let dates: Vec<_> = WeeklyDates::new(date(2024, 6, 16), date(2024, 6, 16))
            .unwrap()
            .collect();
        assert_eq!(dates, vec![date(2024, 6, 16)]);
    }

    #[test]
    fn rejects_start_after_end() {
        let err = WeeklyDates::new(date(2024, 6, 23), date(2024, 6, 16)).unwrap_err();
        assert!(matches!(err, DomainError::Precondition(_)));
    }

    #[test]
    fn rejects_mismatched_weekdays() {
        let err = WeeklyDates::new(date(2024, 6, 3), date(2024, 6, 16)).unwrap_err();
        assert!(matches!(err, DomainError::Precondition(_)));
    }
}

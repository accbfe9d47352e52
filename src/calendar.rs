use crate::errors::ParseError;
use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Calendar day math for a configurable first day of the week.
///
/// Dates are plain calendar days. Nothing here looks at timezones or the
/// wall clock; callers pass "today" in when they need it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    first_weekday: Weekday,
}

impl Default for Calendar {
    fn default() -> Self {
        Self::new(Weekday::Sun)
    }
}

impl Calendar {
    pub const fn new(first_weekday: Weekday) -> Self {
        Self { first_weekday }
    }

    pub fn first_weekday(&self) -> Weekday {
        self.first_weekday
    }

    pub fn start_of_week(&self, date: NaiveDate) -> NaiveDate {
        date - Duration::days(i64::from(self.days_into_week(date)))
    }

    pub fn end_of_week(&self, date: NaiveDate) -> NaiveDate {
        self.start_of_week(date) + Duration::days(6)
    }

    /// Every day from the start of the week holding the 1st through the end
    /// of the week holding the last day of the month. Always whole weeks.
    pub fn month_grid(&self, month: NaiveDate) -> Vec<NaiveDate> {
        let first = self.start_of_week(start_of_month(month));
        let last = self.end_of_week(end_of_month(month));
        first.iter_days().take_while(|day| *day <= last).collect()
    }

    /// Short weekday names in grid column order.
    pub fn weekday_labels(&self) -> [&'static str; 7] {
        const NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
        let offset = self.first_weekday.num_days_from_monday() as usize;
        std::array::from_fn(|column| NAMES[(offset + column) % 7])
    }

    fn days_into_week(&self, date: NaiveDate) -> u32 {
        let day = date.weekday().num_days_from_monday();
        let first = self.first_weekday.num_days_from_monday();
        (7 + day - first) % 7
    }
}

pub fn start_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

pub fn end_of_month(date: NaiveDate) -> NaiveDate {
    (28..=31)
        .rev()
        .find_map(|day| NaiveDate::from_ymd_opt(date.year(), date.month(), day))
        .unwrap_or(date)
}

/// Moves a month start by `delta` months, saturating at the ends of
/// chrono's representable range.
pub fn shift_months(month: NaiveDate, delta: i32) -> NaiveDate {
    let start = start_of_month(month);
    let shifted = if delta >= 0 {
        start.checked_add_months(Months::new(delta.unsigned_abs()))
    } else {
        start.checked_sub_months(Months::new(delta.unsigned_abs()))
    };
    shifted.unwrap_or(if delta < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

/// Whole months from `from`'s month to `to`'s month; negative when `to` is earlier.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32
}

pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Parses a canonical `YYYY-MM-DD` key. Anything that would not format back
/// to the same string is rejected.
pub fn parse_date(key: &str) -> Result<NaiveDate, ParseError> {
    let bytes = key.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return Err(ParseError::date(key));
    }
    let date = NaiveDate::parse_from_str(key, DATE_FORMAT).map_err(|_| ParseError::date(key))?;
    if date_key(date) != key {
        return Err(ParseError::date(key));
    }
    Ok(date)
}

/// Parses `YYYY-MM` into the first day of that month.
pub fn parse_month(key: &str) -> Result<NaiveDate, ParseError> {
    if key.len() != 7 {
        return Err(ParseError::month(key));
    }
    parse_date(&format!("{key}-01")).map_err(|_| ParseError::month(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn month_bounds() {
        assert_eq!(start_of_month(ymd(2024, 2, 17)), ymd(2024, 2, 1));
        assert_eq!(end_of_month(ymd(2024, 2, 17)), ymd(2024, 2, 29));
        assert_eq!(end_of_month(ymd(2023, 2, 1)), ymd(2023, 2, 28));
        assert_eq!(end_of_month(ymd(2024, 12, 31)), ymd(2024, 12, 31));
    }

    #[test]
    fn week_bounds_follow_first_weekday() {
        // 2024-01-03 is a Wednesday.
        let wednesday = ymd(2024, 1, 3);
        let sunday_first = Calendar::default();
        assert_eq!(sunday_first.start_of_week(wednesday), ymd(2023, 12, 31));
        assert_eq!(sunday_first.end_of_week(wednesday), ymd(2024, 1, 6));

        let monday_first = Calendar::new(Weekday::Mon);
        assert_eq!(monday_first.start_of_week(wednesday), ymd(2024, 1, 1));
        assert_eq!(monday_first.end_of_week(wednesday), ymd(2024, 1, 7));
        assert_eq!(monday_first.start_of_week(ymd(2024, 1, 7)), ymd(2024, 1, 1));
    }

    #[test]
    fn month_grid_covers_adjacent_days() {
        let grid = Calendar::default().month_grid(ymd(2024, 1, 1));
        assert_eq!(grid.len(), 35);
        assert_eq!(grid[0], ymd(2023, 12, 31));
        assert_eq!(grid[34], ymd(2024, 2, 3));

        // February 2026 starts on a Sunday and ends on a Saturday.
        let exact = Calendar::default().month_grid(ymd(2026, 2, 10));
        assert_eq!(exact.len(), 28);
        assert_eq!(exact[0], ymd(2026, 2, 1));
    }

    #[test]
    fn weekday_labels_rotate() {
        assert_eq!(Calendar::default().weekday_labels()[0], "Sun");
        assert_eq!(Calendar::new(Weekday::Mon).weekday_labels()[6], "Sun");
    }

    #[test]
    fn parse_rejects_non_canonical_keys() {
        for bad in ["2024-1-05", "2024-01-5", "2024/01/05", "2024-02-30", "", "abcd-ef-gh", " 2024-01-05"] {
            assert!(parse_date(bad).is_err(), "accepted {bad:?}");
        }
        let err = parse_date("2024-13-01").unwrap_err();
        assert_eq!(err.input, "2024-13-01");
    }

    #[test]
    fn parse_month_keys() {
        assert_eq!(parse_month("2024-03").unwrap(), ymd(2024, 3, 1));
        assert!(parse_month("2024-3").is_err());
        assert!(parse_month("2024-03-01").is_err());
    }

    #[test]
    fn month_shifting() {
        assert_eq!(shift_months(ymd(2024, 3, 15), -12), ymd(2023, 3, 1));
        assert_eq!(shift_months(ymd(2024, 11, 1), 2), ymd(2025, 1, 1));
        assert_eq!(months_between(ymd(2023, 3, 1), ymd(2024, 1, 31)), 10);
        assert_eq!(months_between(ymd(2024, 1, 1), ymd(2023, 12, 1)), -1);
    }

    fn any_supported_date() -> impl Strategy<Value = NaiveDate> {
        let first = ymd(1900, 1, 1);
        let span = (ymd(2200, 12, 31) - first).num_days();
        (0..=span).prop_map(move |offset| first + Duration::days(offset))
    }

    proptest! {
        #[test]
        fn date_key_round_trips(date in any_supported_date()) {
            prop_assert_eq!(parse_date(&date_key(date)).unwrap(), date);
        }

        #[test]
        fn month_grid_is_whole_weeks(date in any_supported_date(), first in 0u8..7) {
            let calendar = Calendar::new(Weekday::try_from(first).unwrap());
            let grid = calendar.month_grid(date);
            prop_assert_eq!(grid.len() % 7, 0);
            prop_assert!(grid[0] <= start_of_month(date));
            prop_assert!(start_of_month(date) <= grid[grid.len() - 1]);
            prop_assert!(grid[grid.len() - 1] >= end_of_month(date));
            prop_assert_eq!(grid[0].weekday(), calendar.first_weekday());
        }
    }
}

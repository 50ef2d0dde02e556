use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use circle_db::LogRow;
use circle_types::api::CalendarDay;

use crate::error::ApiError;

/// First and last day of a month, or `None` if the month does not exist.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next_first.pred_opt()?))
}

/// Parse `{year}/{month}` path segments.
pub fn parse_year_month(year: &str, month: &str) -> Result<(i32, u32), ApiError> {
    let year: i32 = year
        .parse()
        .map_err(|_| ApiError::validation("Invalid year"))?;
    let month: u32 = month
        .parse()
        .map_err(|_| ApiError::validation("Invalid month"))?;
    if month_bounds(year, month).is_none() {
        return Err(ApiError::validation("Invalid year or month"));
    }
    Ok((year, month))
}

/// Sparse day-of-month map for one month. Logs outside the month are ignored,
/// so the map never has more keys than the month has days.
pub fn aggregate(year: i32, month: u32, logs: &[LogRow]) -> BTreeMap<u32, CalendarDay> {
    logs.iter()
        .filter(|log| log.day.year() == year && log.day.month() == month)
        .map(|log| {
            (
                log.day.day(),
                CalendarDay {
                    status: log.status,
                    completed_at: log.completed_at,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use circle_types::LogStatus;

    fn log(y: i32, m: u32, d: u32, status: LogStatus) -> LogRow {
        LogRow {
            id: format!("{y}-{m}-{d}"),
            user_id: "u".into(),
            day: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            status,
            completed_at: status.is_done().then(Utc::now),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn february_lengths_follow_leap_years() {
        let (_, last) = month_bounds(2024, 2).unwrap();
        assert_eq!(last.day(), 29);
        let (_, last) = month_bounds(2023, 2).unwrap();
        assert_eq!(last.day(), 28);
        let (first, last) = month_bounds(2023, 12).unwrap();
        assert_eq!((first.day(), last.day(), last.month()), (1, 31, 12));
    }

    #[test]
    fn invalid_months_are_rejected() {
        assert!(month_bounds(2024, 0).is_none());
        assert!(month_bounds(2024, 13).is_none());
        assert!(parse_year_month("2024", "13").is_err());
        assert!(parse_year_month("twenty", "1").is_err());
        assert_eq!(parse_year_month("2024", "02").unwrap(), (2024, 2));
    }

    #[test]
    fn aggregation_keeps_only_days_of_the_month() {
        let logs = vec![
            log(2024, 1, 31, LogStatus::Done),
            log(2024, 2, 1, LogStatus::Done),
            log(2024, 2, 29, LogStatus::Missed),
            log(2024, 3, 1, LogStatus::Done),
            log(2023, 2, 15, LogStatus::Done),
        ];
        let calendar = aggregate(2024, 2, &logs);
        assert_eq!(calendar.keys().copied().collect::<Vec<_>>(), vec![1, 29]);
        assert_eq!(calendar[&29].status, LogStatus::Missed);
        assert!(calendar[&29].completed_at.is_none());
        assert!(calendar.keys().all(|d| *d <= 29));

        let feb_2023 = aggregate(2023, 2, &logs);
        assert_eq!(feb_2023.len(), 1);
        assert!(feb_2023.keys().all(|d| *d <= 28));
    }
}

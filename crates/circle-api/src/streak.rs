use std::collections::HashMap;

use chrono::{Days, NaiveDate};

use circle_db::{LogRow, UserRow};
use circle_types::LogStatus;
use circle_types::api::StreakResponse;

/// Derive streak statistics from a user's logs.
///
/// `current_streak` walks backwards from `today` and stops at the first day
/// that is missing or not `done`, so it is 0 unless today is done.
/// `longest_streak` is the longest run of consecutive `done` records in date
/// order. Only a non-`done` record ends a run; unlogged days do not.
/// `consistency_percentage` is done days over logged days, so unlogged gaps
/// do not lower it.
pub fn compute(entries: &[(NaiveDate, LogStatus)], today: NaiveDate) -> StreakResponse {
    let by_day: HashMap<NaiveDate, LogStatus> = entries.iter().copied().collect();

    let mut current_streak = 0;
    let mut cursor = Some(today);
    while let Some(day) = cursor {
        if by_day.get(&day).is_some_and(|s| s.is_done()) {
            current_streak += 1;
            cursor = day.checked_sub_days(Days::new(1));
        } else {
            break;
        }
    }

    let mut days: Vec<(NaiveDate, LogStatus)> = by_day.into_iter().collect();
    days.sort_by_key(|(day, _)| *day);

    let mut longest_streak = 0;
    let mut run = 0;
    for (_, status) in &days {
        run = if status.is_done() { run + 1 } else { 0 };
        longest_streak = longest_streak.max(run);
    }

    let total_days = days.len() as u32;
    let total_completed = days.iter().filter(|(_, s)| s.is_done()).count() as u32;

    StreakResponse {
        current_streak,
        longest_streak,
        total_completed,
        consistency_percentage: percentage(total_completed, total_days),
        total_days,
    }
}

/// Streaks for a stored user: the manual override wins over computed values.
pub fn for_user(user: &UserRow, logs: &[LogRow], today: NaiveDate) -> StreakResponse {
    let entries: Vec<(NaiveDate, LogStatus)> = logs.iter().map(|l| (l.day, l.status)).collect();
    let mut stats = compute(&entries, today);
    if user.streak_overridden {
        stats.current_streak = user.current_streak;
        stats.longest_streak = user.longest_streak;
    }
    stats
}

/// Rounded `100 * part / whole`, 0 when `whole` is 0.
pub fn percentage(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use LogStatus::{Done, Missed};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn empty_history_is_all_zero() {
        let stats = compute(&[], d(10));
        assert_eq!(
            stats,
            StreakResponse {
                current_streak: 0,
                longest_streak: 0,
                total_completed: 0,
                consistency_percentage: 0,
                total_days: 0,
            }
        );
    }

    #[test]
    fn current_streak_counts_back_from_today() {
        let entries = [(d(10), Done), (d(9), Done), (d(8), Done), (d(6), Done)];
        let stats = compute(&entries, d(10));
        assert_eq!(stats.current_streak, 3);
        assert_eq!(stats.longest_streak, 3);
        assert_eq!(stats.consistency_percentage, 100);
    }

    #[test]
    fn today_alone_is_one() {
        assert_eq!(compute(&[(d(10), Done)], d(10)).current_streak, 1);
    }

    #[test]
    fn missing_or_missed_today_is_zero() {
        let entries = [(d(9), Done), (d(8), Done)];
        assert_eq!(compute(&entries, d(10)).current_streak, 0);

        let entries = [(d(10), Missed), (d(9), Done)];
        assert_eq!(compute(&entries, d(10)).current_streak, 0);
    }

    #[test]
    fn only_missed_records_break_the_longest_run() {
        let entries = [
            (d(1), Done),
            (d(2), Done),
            (d(3), Done),
            (d(4), Missed),
            (d(5), Done),
            (d(6), Done),
            (d(8), Done),
        ];
        let stats = compute(&entries, d(8));
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.longest_streak, 3);
        assert_eq!(stats.total_completed, 6);
        assert_eq!(stats.total_days, 7);
        assert_eq!(stats.consistency_percentage, 86);
    }

    #[test]
    fn unlogged_days_do_not_end_the_longest_run() {
        let entries = [(d(1), Done), (d(2), Done), (d(3), Done), (d(5), Done)];
        let stats = compute(&entries, d(5));
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.longest_streak, 4);

        let entries = [(d(5), Done), (d(6), Done), (d(8), Done), (d(9), Missed), (d(10), Done)];
        assert_eq!(compute(&entries, d(10)).longest_streak, 3);
    }

    #[test]
    fn missed_days_end_the_run() {
        let entries = [(d(1), Done), (d(2), Missed), (d(3), Done)];
        let stats = compute(&entries, d(3));
        assert_eq!(stats.longest_streak, 1);
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.total_completed, 2);
    }

    #[test]
    fn longest_is_never_below_current() {
        let histories: [&[(NaiveDate, LogStatus)]; 4] = [
            &[(d(10), Done)],
            &[(d(1), Done), (d(2), Done), (d(10), Done)],
            &[(d(8), Done), (d(9), Done), (d(10), Done), (d(5), Missed)],
            &[(d(3), Missed), (d(4), Missed)],
        ];
        for entries in histories {
            let stats = compute(entries, d(10));
            assert!(stats.longest_streak >= stats.current_streak);
            assert!(stats.consistency_percentage <= 100);
        }
    }

    #[test]
    fn order_of_input_does_not_matter() {
        let forward = [(d(1), Done), (d(2), Done), (d(3), Done)];
        let backward = [(d(3), Done), (d(2), Done), (d(1), Done)];
        assert_eq!(compute(&forward, d(3)), compute(&backward, d(3)));
    }

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 2), 50);
        assert_eq!(percentage(0, 0), 0);
    }
}

//! Business-day boundary with a fixed 05:00 cutover.
//!
//! Late-night sales group with the prior calendar day: a timestamp whose
//! local hour is strictly before 5 belongs to yesterday's business day,
//! while 05:00:00 exactly starts the new one. Only the date string is used
//! as the grouping key.
//!
//! Note that `cleanup_old_bills` and the report aggregator filter by raw
//! calendar date instead of this boundary. That split is inherited from
//! the legacy system and is deliberately preserved; the calendar helpers
//! below exist for those two consumers.

use chrono::{Days, Local, NaiveDate, NaiveDateTime, Timelike};

/// Hour of the daily cutover, local time.
pub const DAY_CUTOVER_HOUR: u32 = 5;

/// The business day a timestamp belongs to.
pub fn day_boundary(ts: NaiveDateTime) -> NaiveDate {
    if ts.hour() < DAY_CUTOVER_HOUR {
        // Before 5am, treat as the previous day. Subtraction cannot fail
        // inside chrono's representable range.
        ts.date().checked_sub_days(Days::new(1)).unwrap_or_else(|| ts.date())
    } else {
        ts.date()
    }
}

/// The business-day grouping key (`YYYY-MM-DD`) for a timestamp.
pub fn boundary_key(ts: NaiveDateTime) -> String {
    day_boundary(ts).format("%Y-%m-%d").to_string()
}

/// Boundary keys for the retained window: (today, yesterday) relative to
/// `now`. Bills and bill items outside this pair are dropped at load time
/// and again at bill-creation time.
pub fn retention_window(now: NaiveDateTime) -> (String, String) {
    let today = boundary_key(now);
    let yesterday = boundary_key(now - chrono::Duration::hours(24));
    (today, yesterday)
}

/// Today's raw calendar date (`YYYY-MM-DD`, local time).
pub fn calendar_today() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Yesterday's raw calendar date (`YYYY-MM-DD`, local time).
pub fn calendar_yesterday() -> String {
    (Local::now().date_naive() - chrono::Duration::days(1))
        .format("%Y-%m-%d")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(date: (i32, u32, u32), time: (u32, u32, u32)) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .expect("valid date")
            .and_hms_opt(time.0, time.1, time.2)
            .expect("valid time")
    }

    #[test]
    fn before_cutover_belongs_to_previous_day() {
        assert_eq!(boundary_key(ts((2024, 5, 10), (4, 59, 0))), "2024-05-09");
        assert_eq!(boundary_key(ts((2024, 5, 10), (0, 0, 0))), "2024-05-09");
    }

    #[test]
    fn cutover_instant_starts_the_new_day() {
        // Strictly less-than: exactly 05:00:00 is the new business day.
        assert_eq!(boundary_key(ts((2024, 5, 10), (5, 0, 0))), "2024-05-10");
        assert_eq!(boundary_key(ts((2024, 5, 10), (23, 30, 0))), "2024-05-10");
    }

    #[test]
    fn cutover_crosses_month_boundaries() {
        assert_eq!(boundary_key(ts((2024, 3, 1), (2, 0, 0))), "2024-02-29");
        assert_eq!(boundary_key(ts((2024, 1, 1), (4, 0, 0))), "2023-12-31");
    }

    #[test]
    fn retention_window_spans_two_business_days() {
        let (today, yesterday) = retention_window(ts((2024, 5, 10), (14, 0, 0)));
        assert_eq!(today, "2024-05-10");
        assert_eq!(yesterday, "2024-05-09");

        // At 2am both keys shift back: "today" is still the 9th's business day.
        let (today, yesterday) = retention_window(ts((2024, 5, 10), (2, 0, 0)));
        assert_eq!(today, "2024-05-09");
        assert_eq!(yesterday, "2024-05-08");
    }
}

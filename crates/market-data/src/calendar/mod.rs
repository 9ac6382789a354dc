//! Per-market trading-day calendar.
//!
//! Pure functions of a date; no I/O. The two markets are independent: a
//! date can be a US holiday while Canada trades, and vice versa. That
//! independence is load-bearing — "US closed, Canada open" is exactly the
//! hazard window where a bare US ticker must be carried forward instead of
//! being confused with its Canadian-listed namesake.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::models::Market;

/// Trading-day calendar for the US and Canadian equity markets.
///
/// Weekend rule plus computed exchange holidays (NYSE/Nasdaq for US,
/// TSX/TSXV for Canada).
#[derive(Clone, Copy, Debug, Default)]
pub struct MarketCalendar;

impl MarketCalendar {
    pub fn new() -> Self {
        Self
    }

    /// Whether `market` is open for trading on `date`.
    pub fn is_open(&self, market: Market, date: NaiveDate) -> bool {
        if is_weekend(date) {
            return false;
        }
        match market {
            Market::Us => !is_us_holiday(date),
            Market::Ca => !is_ca_holiday(date),
        }
    }

    /// Most recent trading day for `market` on or before `date`.
    pub fn last_trading_day(&self, market: Market, date: NaiveDate) -> NaiveDate {
        let mut day = date;
        while !self.is_open(market, day) {
            day -= Duration::days(1);
        }
        day
    }

    /// Most recent day on or before `date` on which at least one of the
    /// two markets traded. The anchor day for "update latest".
    pub fn last_any_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut day = date;
        while !self.is_open(Market::Us, day) && !self.is_open(Market::Ca, day) {
            day -= Duration::days(1);
        }
        day
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Easter Sunday via the anonymous Gregorian computus.
fn easter_sunday(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32).expect("computus yields a valid date")
}

fn good_friday(year: i32) -> NaiveDate {
    easter_sunday(year) - Duration::days(2)
}

/// Nth (1-based) occurrence of `weekday` in a month.
fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u32) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month start");
    let offset = (7 + weekday.num_days_from_monday() - first.weekday().num_days_from_monday()) % 7;
    first + Duration::days((offset + (n - 1) * 7) as i64)
}

/// Last occurrence of `weekday` in a month.
fn last_weekday(year: i32, month: u32, weekday: Weekday) -> NaiveDate {
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid month start");
    let last = next_month - Duration::days(1);
    let offset = (7 + last.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
    last - Duration::days(offset as i64)
}

/// NYSE observance: Saturday holidays observed the preceding Friday,
/// Sunday holidays the following Monday.
fn observed_us(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

/// TSX observance: weekend holidays roll forward to Monday.
fn observed_monday(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date + Duration::days(2),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

fn is_us_holiday(date: NaiveDate) -> bool {
    let year = date.year();
    let ymd = |m, d| NaiveDate::from_ymd_opt(year, m, d).expect("valid holiday date");

    // New Year's Day: Sunday rolls to Monday; a Saturday Jan 1 is not
    // observed by NYSE.
    let new_year = ymd(1, 1);
    let new_year_observed = match new_year.weekday() {
        Weekday::Sun => Some(new_year + Duration::days(1)),
        Weekday::Sat => None,
        _ => Some(new_year),
    };
    if new_year_observed == Some(date) {
        return true;
    }

    let mut holidays = vec![
        nth_weekday(year, 1, Weekday::Mon, 3),  // MLK Day
        nth_weekday(year, 2, Weekday::Mon, 3),  // Presidents Day
        good_friday(year),
        last_weekday(year, 5, Weekday::Mon),    // Memorial Day
        observed_us(ymd(7, 4)),                 // Independence Day
        nth_weekday(year, 9, Weekday::Mon, 1),  // Labor Day
        nth_weekday(year, 11, Weekday::Thu, 4), // Thanksgiving
        observed_us(ymd(12, 25)),               // Christmas
    ];
    if year >= 2022 {
        holidays.push(observed_us(ymd(6, 19))); // Juneteenth
    }

    holidays.contains(&date)
}

fn is_ca_holiday(date: NaiveDate) -> bool {
    let year = date.year();
    let ymd = |m, d| NaiveDate::from_ymd_opt(year, m, d).expect("valid holiday date");

    // Victoria Day: the Monday preceding May 25.
    let may_24 = ymd(5, 24);
    let victoria = may_24
        - Duration::days(
            (7 + may_24.weekday().num_days_from_monday() - Weekday::Mon.num_days_from_monday())
                as i64
                % 7,
        );

    let christmas = observed_monday(ymd(12, 25));
    // Boxing Day: first weekday after observed Christmas.
    let mut boxing = ymd(12, 26);
    while is_weekend(boxing) || boxing == christmas {
        boxing += Duration::days(1);
    }

    let holidays = [
        observed_monday(ymd(1, 1)),             // New Year's Day
        nth_weekday(year, 2, Weekday::Mon, 3),  // Family Day
        good_friday(year),
        victoria,
        observed_monday(ymd(7, 1)),             // Canada Day
        nth_weekday(year, 8, Weekday::Mon, 1),  // Civic Holiday
        nth_weekday(year, 9, Weekday::Mon, 1),  // Labour Day
        nth_weekday(year, 10, Weekday::Mon, 2), // Canadian Thanksgiving
        christmas,
        boxing,
    ];

    holidays.contains(&date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekends_closed_both_markets() {
        let calendar = MarketCalendar::new();
        let saturday = date(2025, 1, 4);
        assert!(!calendar.is_open(Market::Us, saturday));
        assert!(!calendar.is_open(Market::Ca, saturday));
    }

    #[test]
    fn test_us_thanksgiving_canada_trades() {
        let calendar = MarketCalendar::new();
        // 2024-11-28 is the fourth Thursday of November.
        let us_thanksgiving = date(2024, 11, 28);
        assert!(!calendar.is_open(Market::Us, us_thanksgiving));
        assert!(calendar.is_open(Market::Ca, us_thanksgiving));
    }

    #[test]
    fn test_canadian_thanksgiving_us_trades() {
        let calendar = MarketCalendar::new();
        // 2024-10-14 is the second Monday of October (also US Columbus Day,
        // which NYSE does not observe).
        let ca_thanksgiving = date(2024, 10, 14);
        assert!(calendar.is_open(Market::Us, ca_thanksgiving));
        assert!(!calendar.is_open(Market::Ca, ca_thanksgiving));
    }

    #[test]
    fn test_boxing_day_canada_only() {
        let calendar = MarketCalendar::new();
        // 2024-12-26 is a Thursday.
        let boxing = date(2024, 12, 26);
        assert!(calendar.is_open(Market::Us, boxing));
        assert!(!calendar.is_open(Market::Ca, boxing));
    }

    #[test]
    fn test_good_friday_closed_both() {
        let calendar = MarketCalendar::new();
        // Easter 2025 is April 20, so Good Friday is April 18.
        assert_eq!(easter_sunday(2025), date(2025, 4, 20));
        let gf = date(2025, 4, 18);
        assert!(!calendar.is_open(Market::Us, gf));
        assert!(!calendar.is_open(Market::Ca, gf));
    }

    #[test]
    fn test_juneteenth_only_from_2022() {
        let calendar = MarketCalendar::new();
        // 2025-06-19 is a Thursday.
        assert!(!calendar.is_open(Market::Us, date(2025, 6, 19)));
        // 2019-06-19 is a Wednesday, before the holiday existed.
        assert!(calendar.is_open(Market::Us, date(2019, 6, 19)));
        // Canada trades through Juneteenth.
        assert!(calendar.is_open(Market::Ca, date(2025, 6, 19)));
    }

    #[test]
    fn test_family_day_canada_only() {
        let calendar = MarketCalendar::new();
        // 2025-02-17 is the third Monday of February: Family Day in Canada,
        // Presidents Day in the US. Both closed, but for independent reasons.
        let third_monday = date(2025, 2, 17);
        assert!(!calendar.is_open(Market::Ca, third_monday));
        assert!(!calendar.is_open(Market::Us, third_monday));
        // Civic Holiday (first Monday of August) is Canada-only.
        let civic = date(2025, 8, 4);
        assert!(!calendar.is_open(Market::Ca, civic));
        assert!(calendar.is_open(Market::Us, civic));
    }

    #[test]
    fn test_independence_day_observed_friday() {
        let calendar = MarketCalendar::new();
        // 2026-07-04 is a Saturday; NYSE observes Friday 2026-07-03.
        assert!(!calendar.is_open(Market::Us, date(2026, 7, 3)));
        assert!(calendar.is_open(Market::Ca, date(2026, 7, 3)));
    }

    #[test]
    fn test_last_trading_day_skips_weekend() {
        let calendar = MarketCalendar::new();
        // Sunday 2025-01-05 resolves back to Friday 2025-01-03.
        assert_eq!(
            calendar.last_trading_day(Market::Us, date(2025, 1, 5)),
            date(2025, 1, 3)
        );
    }

    #[test]
    fn test_last_any_trading_day_on_us_holiday() {
        let calendar = MarketCalendar::new();
        // US Thanksgiving 2024: Canada is open, so the day itself qualifies.
        assert_eq!(
            calendar.last_any_trading_day(date(2024, 11, 28)),
            date(2024, 11, 28)
        );
    }
}

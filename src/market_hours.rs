// =============================================================================
// Market-hours predicates — KR and US sessions on a single KST clock
// =============================================================================
//
// All gating decisions run on Asia/Seoul wall time. The US session is
// expressed as a KST window up front:
//
//   KR: Mon–Fri, 09:00:00 ≤ t ≤ 15:30:00 KST
//   US: from 23:30 KST of a weekday, through 06:00 KST of the following day.
//       Early Monday KST is Sunday in New York and therefore closed.
// =============================================================================

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Asia::Seoul;
use chrono_tz::Tz;

const KR_OPEN_SECS: u32 = 9 * 3600; // 09:00:00
const KR_CLOSE_SECS: u32 = 15 * 3600 + 30 * 60; // 15:30:00
const US_OPEN_SECS: u32 = 23 * 3600 + 30 * 60; // 23:30:00 KST
const US_CLOSE_SECS: u32 = 6 * 3600; // 06:00:00 KST

/// Current wall-clock time in Seoul.
pub fn now_kst() -> DateTime<Tz> {
    Utc::now().with_timezone(&Seoul)
}

fn is_weekday(day: Weekday) -> bool {
    !matches!(day, Weekday::Sat | Weekday::Sun)
}

/// KR session at the given KST instant.
pub fn is_kr_market_open_at(now: DateTime<Tz>) -> bool {
    if !is_weekday(now.weekday()) {
        return false;
    }
    let secs = now.num_seconds_from_midnight();
    (KR_OPEN_SECS..=KR_CLOSE_SECS).contains(&secs)
}

/// US session at the given KST instant.
pub fn is_us_market_open_at(now: DateTime<Tz>) -> bool {
    let secs = now.num_seconds_from_midnight();
    if secs >= US_OPEN_SECS {
        // Late evening: the session that opened tonight belongs to today's
        // weekday in New York.
        return is_weekday(now.weekday());
    }
    if secs <= US_CLOSE_SECS {
        // Early morning: the session opened yesterday evening. Monday morning
        // KST is Sunday in New York, so exclude Monday along with Sunday.
        return !matches!(now.weekday(), Weekday::Mon | Weekday::Sun);
    }
    false
}

/// KR session right now.
pub fn is_kr_market_open() -> bool {
    is_kr_market_open_at(now_kst())
}

/// US session right now (in KST terms).
pub fn is_us_market_open() -> bool {
    is_us_market_open_at(now_kst())
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // 2024-01-01 was a Monday; 01-03 Wednesday, 01-04 Thursday, 01-06 Saturday.
    fn kst(day: u32, h: u32, m: u32, s: u32) -> DateTime<Tz> {
        Seoul.with_ymd_and_hms(2024, 1, day, h, m, s).unwrap()
    }

    #[test]
    fn kr_open_window_boundaries() {
        assert!(is_kr_market_open_at(kst(3, 9, 0, 0)));
        assert!(is_kr_market_open_at(kst(3, 15, 30, 0)));
        assert!(!is_kr_market_open_at(kst(3, 8, 59, 59)));
        assert!(!is_kr_market_open_at(kst(3, 15, 30, 1)));
    }

    #[test]
    fn kr_closed_all_weekend() {
        assert!(!is_kr_market_open_at(kst(6, 10, 0, 0)));
        assert!(!is_kr_market_open_at(kst(7, 10, 0, 0)));
    }

    #[test]
    fn us_open_late_evening_weekday() {
        assert!(is_us_market_open_at(kst(3, 23, 45, 0)));
        assert!(is_us_market_open_at(kst(3, 23, 30, 0)));
        assert!(!is_us_market_open_at(kst(3, 23, 29, 59)));
    }

    #[test]
    fn us_open_early_morning_after_weekday() {
        // Thursday 03:00 KST is Wednesday afternoon in New York.
        assert!(is_us_market_open_at(kst(4, 3, 0, 0)));
        assert!(is_us_market_open_at(kst(4, 6, 0, 0)));
        assert!(!is_us_market_open_at(kst(4, 6, 0, 1)));
    }

    #[test]
    fn us_closed_monday_morning() {
        // Monday 03:00 KST is Sunday in New York.
        assert!(!is_us_market_open_at(kst(1, 3, 0, 0)));
    }

    #[test]
    fn us_closed_saturday_evening() {
        assert!(!is_us_market_open_at(kst(6, 23, 45, 0)));
    }

    #[test]
    fn us_closed_midday() {
        assert!(!is_us_market_open_at(kst(3, 12, 0, 0)));
    }
}

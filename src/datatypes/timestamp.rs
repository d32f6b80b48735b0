// ABOUTME: Protocol timestamp renderings used across the three gateway dialects
// ABOUTME: MMDDHHMMSS integers, SMPP-style validity stamps and report/receive time strings

use chrono::{DateTime, Datelike, Local, Timelike};
use std::time::Duration;

/// `MMDDHHMMSS` packed as a decimal integer (connect/login timestamps and
/// the middle word of an SGIP sequence).
pub fn mmddhhmmss(at: &DateTime<Local>) -> u32 {
    at.month() * 100_000_000
        + at.day() * 1_000_000
        + at.hour() * 10_000
        + at.minute() * 100
        + at.second()
}

/// `MMDDHHMM` packed as a decimal integer.
pub fn mmddhhmm(at: &DateTime<Local>) -> u32 {
    at.month() * 1_000_000 + at.day() * 10_000 + at.hour() * 100 + at.minute()
}

/// Validity / scheduled-delivery time: `yyMMddHHmmss` followed by the fixed
/// Beijing offset marker `032+`.
pub fn validity_stamp(at: &DateTime<Local>) -> String {
    format!("{}032+", at.format("%y%m%d%H%M%S"))
}

/// Submit/done time carried in status reports: `yyMMddHHmm`.
pub fn report_stamp(at: &DateTime<Local>) -> String {
    at.format("%y%m%d%H%M").to_string()
}

/// SMGP receive time: `yyyyMMddHHmmss`.
pub fn receive_stamp(at: &DateTime<Local>) -> String {
    at.format("%Y%m%d%H%M%S").to_string()
}

/// Shift `at` forward by a std duration, saturating at `at` on overflow.
pub fn after(at: &DateTime<Local>, offset: Duration) -> DateTime<Local> {
    chrono::Duration::from_std(offset)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(*at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed() -> DateTime<Local> {
        Local.with_ymd_and_hms(2023, 10, 21, 8, 5, 10).unwrap()
    }

    #[test]
    fn packs_decimal_stamps() {
        assert_eq!(mmddhhmmss(&fixed()), 1021080510);
        assert_eq!(mmddhhmm(&fixed()), 10210805);
    }

    #[test]
    fn renders_string_stamps() {
        assert_eq!(validity_stamp(&fixed()), "231021080510032+");
        assert_eq!(report_stamp(&fixed()), "2310210805");
        assert_eq!(receive_stamp(&fixed()), "20231021080510");
    }

    #[test]
    fn shifts_forward() {
        let later = after(&fixed(), Duration::from_secs(60));
        assert_eq!(report_stamp(&later), "2310210806");
    }
}

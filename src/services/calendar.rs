//! Date and time handling shared by pricing, availability and the booking
//! pipeline. All "now" decisions go through [`Clock`].

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};

pub const OPENING_HOUR: u32 = 9;
pub const CLOSING_HOUR: u32 = 21;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant. Used by tests.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// The calendar date of `now` as seen from the business's offset.
pub fn today(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Accepts `YYYY-MM-DD` or a full timestamp, keeping only the date part.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    raw.get(..10)
        .filter(|_| raw.as_bytes().get(10) == Some(&b'T'))
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

/// Parses an ISO 8601 timestamp. An explicit offset is kept as written so the
/// wall-clock hour matches what the caller sent; a timestamp without one is
/// read in the business offset.
pub fn parse_instant(raw: &str, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| offset.from_local_datetime(&naive).single())
}

/// Start of the visit: the booked start time when there is one, otherwise
/// midnight of the booking date in the business offset.
pub fn visit_start(
    date: NaiveDate,
    start: Option<DateTime<FixedOffset>>,
    offset: FixedOffset,
) -> Option<DateTime<FixedOffset>> {
    match start {
        Some(s) => Some(s),
        None => offset
            .from_local_datetime(&date.and_time(NaiveTime::MIN))
            .single(),
    }
}

/// Half-open interval test: touching endpoints do not overlap.
pub fn overlaps<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && b_start < a_end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wib() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    #[test]
    fn test_today_follows_business_offset() {
        // 18:00 UTC is already the next day in UTC+7.
        let now = Utc.with_ymd_and_hms(2030, 1, 10, 18, 0, 0).unwrap();
        assert_eq!(today(now, wib()), NaiveDate::from_ymd_opt(2030, 1, 11).unwrap());
        assert_eq!(
            today(now, FixedOffset::east_opt(0).unwrap()),
            NaiveDate::from_ymd_opt(2030, 1, 10).unwrap()
        );
    }

    #[test]
    fn test_parse_date_accepts_date_and_timestamp() {
        let expected = NaiveDate::from_ymd_opt(2030, 1, 15).unwrap();
        assert_eq!(parse_date("2030-01-15"), Some(expected));
        assert_eq!(parse_date("2030-01-15T00:00:00Z"), Some(expected));
        assert_eq!(parse_date("2030-01-15T08:30:00"), Some(expected));
        assert_eq!(parse_date("15/01/2030"), None);
        assert_eq!(parse_date("2030-02-30"), None);
    }

    #[test]
    fn test_parse_instant_keeps_written_offset() {
        let dt = parse_instant("2030-01-15T09:00:00Z", wib()).unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 0);
        assert_eq!(dt.format("%H:%M").to_string(), "09:00");

        let naive = parse_instant("2030-01-15T09:30", wib()).unwrap();
        assert_eq!(naive.offset().local_minus_utc(), 7 * 3600);
        assert_eq!(naive.format("%H:%M").to_string(), "09:30");

        assert!(parse_instant("09:00", wib()).is_none());
    }

    #[test]
    fn test_visit_start_defaults_to_midnight() {
        let date = NaiveDate::from_ymd_opt(2030, 1, 15).unwrap();
        let start = visit_start(date, None, wib()).unwrap();
        assert_eq!(start.to_rfc3339(), "2030-01-15T00:00:00+07:00");
    }

    #[test]
    fn test_overlap_is_half_open() {
        assert!(overlaps(9, 11, 10, 12));
        assert!(overlaps(9, 12, 10, 11));
        assert!(!overlaps(9, 11, 11, 13));
        assert!(!overlaps(11, 13, 9, 11));
    }
}

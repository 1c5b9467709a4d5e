//! Read-only calendar of bookings for the admin dashboard.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Months, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{BookingStatus, CalendarBooking};

use super::booking::{non_empty, validation};
use super::calendar;

/// Six weeks, the most a month grid can show.
const MAX_RANGE_DAYS: i64 = 42;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarQuery {
    pub year: Option<String>,
    pub month: Option<String>,
    /// `month` (default) or `week`. A week needs both `start` and `end`.
    pub range: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub facility_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub booking_code: String,
    pub facility_id: String,
    pub facility_name: String,
    pub date: NaiveDate,
    pub start_time: Option<DateTime<FixedOffset>>,
    pub end_time: Option<DateTime<FixedOffset>>,
    pub status: BookingStatus,
    pub color: &'static str,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayEntry {
    pub booking_id: String,
    pub time_label: String,
    pub facility_name: String,
    pub customer_name: String,
    pub status: &'static str,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCount {
    pub total: i64,
    pub by_status: BTreeMap<&'static str, i64>,
    pub by_facility: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarView {
    pub range: DateRange,
    pub events: Vec<CalendarEvent>,
    pub today: Vec<TodayEntry>,
    pub counts_by_date: BTreeMap<NaiveDate, DayCount>,
}

fn status_color(status: BookingStatus) -> &'static str {
    match status {
        BookingStatus::Confirmed => "green",
        BookingStatus::Cancelled => "red",
        BookingStatus::Completed => "blue",
        BookingStatus::New | BookingStatus::Approved => "orange",
    }
}

fn status_label(status: BookingStatus) -> &'static str {
    match status {
        BookingStatus::Confirmed => "Confirmed",
        BookingStatus::Cancelled => "Cancelled",
        BookingStatus::Completed => "Completed",
        BookingStatus::New | BookingStatus::Approved => "Pending",
    }
}

/// Wall-clock start as written on the booking, or "all day" for daily and
/// ticket bookings.
fn time_label(start: Option<DateTime<FixedOffset>>) -> String {
    start.map_or_else(|| "all day".to_string(), |s| s.format("%H:%M").to_string())
}

pub fn resolve_range(query: &CalendarQuery) -> Result<DateRange, AppError> {
    let week = non_empty(&query.range) == Some("week");
    if let (true, Some(start), Some(end)) = (week, non_empty(&query.start), non_empty(&query.end)) {
        let start = calendar::parse_date(start).ok_or_else(|| validation("invalid start date"))?;
        let end = calendar::parse_date(end).ok_or_else(|| validation("invalid end date"))?;
        if end < start {
            return Err(validation("end must not be before start"));
        }
        if (end - start).num_days() >= MAX_RANGE_DAYS {
            return Err(validation(format!(
                "calendar ranges cannot exceed {MAX_RANGE_DAYS} days"
            )));
        }
        return Ok(DateRange { start, end });
    }

    let year = non_empty(&query.year).and_then(|y| y.parse::<i32>().ok());
    let month = non_empty(&query.month).and_then(|m| m.parse::<u32>().ok());
    let first = year
        .zip(month)
        .and_then(|(y, m)| NaiveDate::from_ymd_opt(y, m, 1))
        .ok_or_else(|| validation("year and month are required and must be valid"))?;
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or_else(|| validation("year and month are required and must be valid"))?;

    Ok(DateRange {
        start: first,
        end: last,
    })
}

fn to_event(b: &CalendarBooking) -> CalendarEvent {
    CalendarEvent {
        id: b.id.clone(),
        booking_code: b.booking_code.clone(),
        facility_id: b.facility_id.clone(),
        facility_name: b.facility_name.clone(),
        date: b.booking_date,
        start_time: b.start_time,
        end_time: b.end_time,
        status: b.status,
        color: status_color(b.status),
        label: format!("{} - {}", time_label(b.start_time), b.facility_name),
    }
}

pub fn load_calendar(
    conn: &Connection,
    now: DateTime<Utc>,
    offset: FixedOffset,
    query: &CalendarQuery,
) -> Result<CalendarView, AppError> {
    let range = resolve_range(query)?;
    let facility_id = non_empty(&query.facility_id);

    let bookings = queries::list_bookings_between(conn, range.start, range.end, facility_id)?;

    let mut counts_by_date: BTreeMap<NaiveDate, DayCount> = BTreeMap::new();
    for b in &bookings {
        let day = counts_by_date.entry(b.booking_date).or_default();
        day.total += 1;
        *day.by_status.entry(b.status.as_str()).or_default() += 1;
        *day.by_facility.entry(b.facility_name.clone()).or_default() += 1;
    }
    let events = bookings.iter().map(to_event).collect();

    let today = calendar::today(now, offset);
    let today = queries::list_bookings_between(conn, today, today, facility_id)?
        .into_iter()
        .map(|b| TodayEntry {
            time_label: time_label(b.start_time),
            status: status_label(b.status),
            booking_id: b.id,
            facility_name: b.facility_name,
            customer_name: b.customer_name,
        })
        .collect();

    Ok(CalendarView {
        range,
        events,
        today,
        counts_by_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> CalendarQuery {
        let mut q = CalendarQuery::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "year" => q.year = value,
                "month" => q.month = value,
                "range" => q.range = value,
                "start" => q.start = value,
                "end" => q.end = value,
                _ => q.facility_id = value,
            }
        }
        q
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_range_covers_whole_month() {
        let range = resolve_range(&query(&[("year", "2030"), ("month", "2")])).unwrap();
        assert_eq!(range.start, date(2030, 2, 1));
        assert_eq!(range.end, date(2030, 2, 28));

        let range = resolve_range(&query(&[("year", "2030"), ("month", "12")])).unwrap();
        assert_eq!(range.end, date(2030, 12, 31));
    }

    #[test]
    fn test_month_requires_valid_year_and_month() {
        for pairs in [
            vec![],
            vec![("year", "2030")],
            vec![("year", "2030"), ("month", "13")],
            vec![("year", "soon"), ("month", "1")],
        ] {
            assert!(resolve_range(&query(&pairs)).is_err(), "{pairs:?}");
        }
    }

    #[test]
    fn test_week_range_uses_start_and_end() {
        let range = resolve_range(&query(&[
            ("range", "week"),
            ("start", "2030-01-13"),
            ("end", "2030-01-19"),
        ]))
        .unwrap();
        assert_eq!(range, DateRange { start: date(2030, 1, 13), end: date(2030, 1, 19) });

        assert!(resolve_range(&query(&[
            ("range", "week"),
            ("start", "2030-01-19"),
            ("end", "2030-01-13"),
        ]))
        .is_err());
        assert!(resolve_range(&query(&[
            ("range", "week"),
            ("start", "2030-01-01"),
            ("end", "2030-03-01"),
        ]))
        .is_err());
    }

    #[test]
    fn test_week_without_bounds_falls_back_to_month() {
        let range = resolve_range(&query(&[("range", "week"), ("year", "2030"), ("month", "1")])).unwrap();
        assert_eq!(range.start, date(2030, 1, 1));
        assert_eq!(range.end, date(2030, 1, 31));
    }

    #[test]
    fn test_colors_and_labels_follow_status() {
        assert_eq!(status_color(BookingStatus::New), "orange");
        assert_eq!(status_color(BookingStatus::Approved), "orange");
        assert_eq!(status_color(BookingStatus::Confirmed), "green");
        assert_eq!(status_color(BookingStatus::Cancelled), "red");
        assert_eq!(status_label(BookingStatus::Approved), "Pending");
        assert_eq!(time_label(None), "all day");
    }
}

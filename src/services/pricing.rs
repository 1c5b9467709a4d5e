//! Turns a facility's pricing model and a requested schedule into a unit
//! count and a total amount.

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;

use crate::errors::AppError;
use crate::models::PriceListEntry;

use super::calendar::{CLOSING_HOUR, OPENING_HOUR};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("startTime and endTime are required for PER_HOUR facilities")]
    MissingTimes,

    #[error("day is required for PER_DAY facilities")]
    MissingDay,

    #[error("day must be an integer >= 1")]
    InvalidDay,

    #[error("participants must be an integer >= 1")]
    InvalidParticipants,

    #[error("invalid startTime, use ISO 8601 (e.g. 2030-01-15T09:00:00+07:00)")]
    InvalidStartTime,

    #[error("invalid endTime, use ISO 8601 (e.g. 2030-01-15T21:00:00+07:00)")]
    InvalidEndTime,

    #[error("start time must be 09:00 or later (got {0})")]
    StartBeforeOpening(String),

    #[error("end time must be 21:00 or earlier (got {0})")]
    EndAfterClosing(String),

    #[error("end time must be after start time")]
    EndNotAfterStart,

    #[error("startTime and endTime must fall on the booking date")]
    OffBookingDate,

    #[error("minimum booking duration is {min} minutes (got {actual} minutes)")]
    BelowMinDuration { min: i64, actual: i64 },
}

impl From<PricingError> for AppError {
    fn from(e: PricingError) -> Self {
        AppError::Validation(e.to_string())
    }
}

/// Tolerance for comparing money amounts.
pub fn money_epsilon() -> Decimal {
    Decimal::new(1, 2)
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// The price row in force at `now`: latest `effective_from` not in the future.
pub fn select_current_price(
    entries: &[PriceListEntry],
    now: DateTime<Utc>,
) -> Option<&PriceListEntry> {
    entries
        .iter()
        .filter(|e| e.effective_from <= now)
        .max_by_key(|e| e.effective_from)
}

/// Reads a JSON value as a strictly positive integer. Accepts integral
/// numbers (`2`, `2.0`) and numeric strings (`"2"`).
pub fn positive_integer(value: &Value) -> Option<i64> {
    let n = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i,
            None => {
                let f = n.as_f64()?;
                if f.fract() != 0.0 || !f.is_finite() {
                    return None;
                }
                f as i64
            }
        },
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    (n >= 1).then_some(n)
}

/// Reads a JSON number or numeric string as a decimal.
pub fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse::<Decimal>().ok().or_else(|| {
            n.as_f64().and_then(|f| Decimal::try_from(f).ok())
        }),
        Value::String(s) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    }
}

/// Operating-hour and minimum-duration checks for an hourly booking, on the
/// wall-clock times as written. Returns the duration in minutes.
pub fn validate_hourly_window(
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    min_duration: Option<i64>,
) -> Result<i64, PricingError> {
    let (start_hour, start_minute) = (start.hour(), start.minute());
    let (end_hour, end_minute) = (end.hour(), end.minute());

    if start_hour < OPENING_HOUR {
        return Err(PricingError::StartBeforeOpening(start.format("%H:%M").to_string()));
    }
    if end_hour > CLOSING_HOUR || (end_hour == CLOSING_HOUR && end_minute > 0) {
        return Err(PricingError::EndAfterClosing(end.format("%H:%M").to_string()));
    }
    if start.date_naive() != end.date_naive() {
        return Err(PricingError::OffBookingDate);
    }

    let start_total = i64::from(start_hour * 60 + start_minute);
    let end_total = i64::from(end_hour * 60 + end_minute);
    if end_total <= start_total || end <= start {
        return Err(PricingError::EndNotAfterStart);
    }

    let duration = end_total - start_total;
    if let Some(min) = min_duration.filter(|m| *m > 0) {
        if duration < min {
            return Err(PricingError::BelowMinDuration { min, actual: duration });
        }
    }

    Ok(duration)
}

/// What the customer is paying for.
#[derive(Debug, Clone, Copy)]
pub enum Units {
    Hours {
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    },
    Days(i64),
    Tickets { participants: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub unit_count: i64,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    pub formula: String,
}

pub fn quote(unit_price: Decimal, units: &Units) -> Result<Quote, PricingError> {
    let unit_price = round_money(unit_price);

    let (unit_count, multiplier, formula) = match *units {
        Units::Hours { start, end } => {
            let secs = (end - start).num_seconds();
            if secs <= 0 {
                return Err(PricingError::EndNotAfterStart);
            }
            // Any started hour is billed in full.
            let hours = (secs + 3599) / 3600;
            (hours, hours, format!("unitPrice ({unit_price}) x hours ({hours})"))
        }
        Units::Days(days) => {
            if days < 1 {
                return Err(PricingError::InvalidDay);
            }
            (days, days, format!("unitPrice ({unit_price}) x days ({days})"))
        }
        Units::Tickets { participants } => {
            if participants < 1 {
                return Err(PricingError::InvalidParticipants);
            }
            (
                1,
                participants,
                format!("unitPrice ({unit_price}) x participants ({participants})"),
            )
        }
    };

    Ok(Quote {
        unit_count,
        unit_price,
        total_amount: round_money(unit_price * Decimal::from(multiplier)),
        formula,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn at(h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(7 * 3600)
            .unwrap()
            .with_ymd_and_hms(2030, 1, 15, h, m, 0)
            .unwrap()
    }

    fn price(id: &str, from: &str) -> PriceListEntry {
        PriceListEntry {
            id: id.to_string(),
            facility_id: "f-1".to_string(),
            unit_price: dec!(1000),
            effective_from: DateTime::parse_from_rfc3339(from).unwrap().with_timezone(&Utc),
            effective_to: None,
        }
    }

    #[test]
    fn test_hourly_rounds_up_started_hours() {
        let q = quote(dec!(50000), &Units::Hours { start: at(9, 0), end: at(11, 0) }).unwrap();
        assert_eq!(q.unit_count, 2);
        assert_eq!(q.total_amount, dec!(100000));

        let q = quote(dec!(50000), &Units::Hours { start: at(9, 0), end: at(10, 1) }).unwrap();
        assert_eq!(q.unit_count, 2);

        let q = quote(dec!(50000), &Units::Hours { start: at(9, 0), end: at(9, 30) }).unwrap();
        assert_eq!(q.unit_count, 1);
        assert_eq!(q.total_amount, dec!(50000));
    }

    #[test]
    fn test_ticket_total_scales_with_participants() {
        let q = quote(dec!(15000), &Units::Tickets { participants: 4 }).unwrap();
        assert_eq!(q.unit_count, 1);
        assert_eq!(q.total_amount, dec!(60000));
        assert!(q.formula.contains("participants (4)"));
    }

    #[test]
    fn test_daily_total_scales_with_days() {
        let q = quote(dec!(250000.50), &Units::Days(3)).unwrap();
        assert_eq!(q.unit_count, 3);
        assert_eq!(q.total_amount, dec!(750001.50));
        assert_eq!(quote(dec!(1), &Units::Days(0)), Err(PricingError::InvalidDay));
    }

    #[test]
    fn test_round_money_half_away_from_zero() {
        assert_eq!(round_money(dec!(10.005)), dec!(10.01));
        assert_eq!(round_money(dec!(10.004)), dec!(10.00));
        assert_eq!(round_money(dec!(-10.005)), dec!(-10.01));
    }

    #[test]
    fn test_operating_hours() {
        assert_eq!(validate_hourly_window(at(9, 0), at(21, 0), None), Ok(720));
        assert_eq!(
            validate_hourly_window(at(8, 59), at(10, 0), None),
            Err(PricingError::StartBeforeOpening("08:59".into()))
        );
        assert_eq!(
            validate_hourly_window(at(19, 0), at(21, 1), None),
            Err(PricingError::EndAfterClosing("21:01".into()))
        );
        assert_eq!(
            validate_hourly_window(at(11, 0), at(10, 0), None),
            Err(PricingError::EndNotAfterStart)
        );
        assert_eq!(
            validate_hourly_window(at(10, 0), at(10, 0), None),
            Err(PricingError::EndNotAfterStart)
        );
    }

    #[test]
    fn test_min_duration_in_minutes() {
        assert_eq!(
            validate_hourly_window(at(9, 0), at(10, 0), Some(90)),
            Err(PricingError::BelowMinDuration { min: 90, actual: 60 })
        );
        assert_eq!(validate_hourly_window(at(9, 0), at(10, 30), Some(90)), Ok(90));
    }

    #[test]
    fn test_current_price_ignores_future_rows() {
        let now = Utc.with_ymd_and_hms(2030, 1, 10, 0, 0, 0).unwrap();
        let rows = vec![
            price("old", "2029-01-01T00:00:00Z"),
            price("current", "2029-12-01T00:00:00Z"),
            price("future", "2030-06-01T00:00:00Z"),
        ];
        assert_eq!(select_current_price(&rows, now).unwrap().id, "current");
        assert!(select_current_price(&rows[2..], now).is_none());
    }

    #[test]
    fn test_positive_integer_parsing() {
        assert_eq!(positive_integer(&json!(3)), Some(3));
        assert_eq!(positive_integer(&json!(3.0)), Some(3));
        assert_eq!(positive_integer(&json!("2")), Some(2));
        assert_eq!(positive_integer(&json!(0)), None);
        assert_eq!(positive_integer(&json!(-1)), None);
        assert_eq!(positive_integer(&json!(1.5)), None);
        assert_eq!(positive_integer(&json!("abc")), None);
        assert_eq!(positive_integer(&json!(null)), None);
    }

    #[test]
    fn test_decimal_from_json() {
        assert_eq!(decimal_from_json(&json!(50000)), Some(dec!(50000)));
        assert_eq!(decimal_from_json(&json!(12.5)), Some(dec!(12.5)));
        assert_eq!(decimal_from_json(&json!("99.99")), Some(dec!(99.99)));
        assert_eq!(decimal_from_json(&json!(true)), None);
    }
}

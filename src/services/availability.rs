use chrono::{DateTime, FixedOffset, NaiveDate};
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{ActiveBooking, PricingType};

use super::calendar::overlaps;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AvailabilityError {
    #[error("you already have a booking for this facility on this date")]
    AlreadyBookedOnDate { booking_id: String },

    #[error("you already have a booking for this facility at this time")]
    AlreadyBookedSlot { booking_id: String },

    #[error("this time slot is already booked by another customer")]
    SlotTaken { booking_id: String },
}

impl From<AvailabilityError> for AppError {
    fn from(e: AvailabilityError) -> Self {
        AppError::Conflict(e.to_string())
    }
}

/// The slot a booking wants to hold.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub customer_nik: &'a str,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
}

/// Classifies the first active booking the candidate collides with.
///
/// Daily and ticketed facilities allow one booking per customer per date.
/// Hourly facilities block on any overlapping interval, and the error says
/// whether the overlap is the caller's own booking or someone else's.
pub fn find_conflict(
    pricing_type: PricingType,
    candidate: &Candidate<'_>,
    existing: &[ActiveBooking],
) -> Result<(), AvailabilityError> {
    match pricing_type {
        PricingType::PerDay | PricingType::PerTicket => {
            if let Some(b) = existing.iter().find(|b| b.customer_nik == candidate.customer_nik) {
                return Err(AvailabilityError::AlreadyBookedOnDate {
                    booking_id: b.id.clone(),
                });
            }
        }
        PricingType::PerHour => {
            let (Some(start), Some(end)) = (candidate.start, candidate.end) else {
                return Ok(());
            };
            for b in existing {
                let (Some(b_start), Some(b_end)) = (b.start_time, b.end_time) else {
                    continue;
                };
                if !overlaps(start, end, b_start, b_end) {
                    continue;
                }
                if b.customer_nik == candidate.customer_nik {
                    return Err(AvailabilityError::AlreadyBookedSlot {
                        booking_id: b.id.clone(),
                    });
                }
                return Err(AvailabilityError::SlotTaken {
                    booking_id: b.id.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Scans the facility's active bookings on `date` and rejects the candidate
/// on conflict. Run inside the transaction that will insert or move the
/// booking.
pub fn ensure_available(
    conn: &Connection,
    facility_id: &str,
    pricing_type: PricingType,
    date: NaiveDate,
    candidate: &Candidate<'_>,
    exclude_booking_id: Option<&str>,
) -> Result<(), AppError> {
    let existing = queries::list_active_bookings_on(conn, facility_id, date, exclude_booking_id)?;
    find_conflict(pricing_type, candidate, &existing).map_err(|e| {
        tracing::info!(facility_id = %facility_id, date = %date, reason = ?e, "booking conflict");
        AppError::from(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(7 * 3600)
            .unwrap()
            .with_ymd_and_hms(2030, 1, 15, h, 0, 0)
            .unwrap()
    }

    fn active(id: &str, nik: &str, slot: Option<(u32, u32)>) -> ActiveBooking {
        ActiveBooking {
            id: id.to_string(),
            customer_nik: nik.to_string(),
            start_time: slot.map(|(s, _)| at(s)),
            end_time: slot.map(|(_, e)| at(e)),
        }
    }

    fn hourly(nik: &str, start: u32, end: u32) -> Candidate<'_> {
        Candidate {
            customer_nik: nik,
            start: Some(at(start)),
            end: Some(at(end)),
        }
    }

    #[test]
    fn test_same_customer_overlap_is_already_booked() {
        let existing = vec![active("b-1", "111", Some((9, 11)))];
        let err = find_conflict(PricingType::PerHour, &hourly("111", 10, 12), &existing).unwrap_err();
        assert_eq!(err, AvailabilityError::AlreadyBookedSlot { booking_id: "b-1".into() });
    }

    #[test]
    fn test_other_customer_overlap_is_slot_taken() {
        let existing = vec![active("b-1", "111", Some((9, 11)))];
        let err = find_conflict(PricingType::PerHour, &hourly("222", 10, 12), &existing).unwrap_err();
        assert_eq!(err, AvailabilityError::SlotTaken { booking_id: "b-1".into() });
        assert_ne!(
            err.to_string(),
            AvailabilityError::AlreadyBookedSlot { booking_id: "b-1".into() }.to_string()
        );
    }

    #[test]
    fn test_adjacent_hourly_slots_do_not_conflict() {
        let existing = vec![active("b-1", "111", Some((9, 11)))];
        assert!(find_conflict(PricingType::PerHour, &hourly("222", 11, 13), &existing).is_ok());
        assert!(find_conflict(PricingType::PerHour, &hourly("222", 7, 9), &existing).is_ok());
    }

    #[test]
    fn test_daily_conflict_keyed_by_customer_only() {
        let existing = vec![active("b-1", "111", None)];
        let mine = Candidate { customer_nik: "111", start: None, end: None };
        let theirs = Candidate { customer_nik: "222", start: None, end: None };

        for ty in [PricingType::PerDay, PricingType::PerTicket] {
            assert_eq!(
                find_conflict(ty, &mine, &existing),
                Err(AvailabilityError::AlreadyBookedOnDate { booking_id: "b-1".into() })
            );
            assert!(find_conflict(ty, &theirs, &existing).is_ok());
        }
    }
}

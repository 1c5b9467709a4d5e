use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::facility::{PricingType, RuleSnapshot};
use super::UnknownVariant;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    New,
    Approved,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Statuses that hold a slot on the facility calendar.
    pub const ACTIVE: [BookingStatus; 3] = [
        BookingStatus::New,
        BookingStatus::Approved,
        BookingStatus::Confirmed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::New => "NEW",
            BookingStatus::Approved => "APPROVED",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// The single transition table every mutation checks against.
    pub fn can_transition(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (New, Approved)
                | (New, Confirmed)
                | (New, Cancelled)
                | (Approved, Confirmed)
                | (Approved, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
        )
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(BookingStatus::New),
            "APPROVED" => Ok(BookingStatus::Approved),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "COMPLETED" => Ok(BookingStatus::Completed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(UnknownVariant::new("booking status", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub booking_code: String,
    pub customer_id: String,
    pub facility_id: String,
    pub booking_date: NaiveDate,
    pub start_time: Option<DateTime<FixedOffset>>,
    pub end_time: Option<DateTime<FixedOffset>>,
    pub participants: i64,
    pub purpose: Option<String>,
    pub status: BookingStatus,
    pub total_amount: Decimal,
    pub currency: String,
    pub source: String,
    pub admin_note: Option<String>,
    pub verification_method: String,
    pub verified_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingItem {
    pub id: String,
    pub booking_id: String,
    pub date: NaiveDate,
    pub start_time: Option<DateTime<FixedOffset>>,
    pub end_time: Option<DateTime<FixedOffset>>,
    pub unit_type: PricingType,
    pub unit_count: i64,
    pub price: Decimal,
    pub meta: serde_json::Value,
}

/// Pricing context captured on the first line item at creation time, so the
/// amount can be reproduced even after price lists or rules change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemSnapshot {
    pub facility_name: String,
    pub pricing_type: PricingType,
    pub applied_unit_price: Decimal,
    pub unit_count: i64,
    pub participants: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_booked: Option<i64>,
    pub base_price: Decimal,
    pub calculation: Calculation,
    pub price_list_id: Option<String>,
    pub price_list_effective_from: Option<DateTime<Utc>>,
    pub price_list_effective_to: Option<DateTime<Utc>>,
    pub rules: RuleSnapshot,
    pub snapshot_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Calculation {
    pub formula: String,
    pub total_amount: Decimal,
}

/// A booking still holding a slot, as seen by the availability scan.
#[derive(Debug, Clone)]
pub struct ActiveBooking {
    pub id: String,
    pub customer_nik: String,
    pub start_time: Option<DateTime<FixedOffset>>,
    pub end_time: Option<DateTime<FixedOffset>>,
}

/// A booking as placed on the admin calendar, joined with the names the
/// calendar shows.
#[derive(Debug, Clone)]
pub struct CalendarBooking {
    pub id: String,
    pub booking_code: String,
    pub facility_id: String,
    pub facility_name: String,
    pub customer_name: String,
    pub booking_date: NaiveDate,
    pub start_time: Option<DateTime<FixedOffset>>,
    pub end_time: Option<DateTime<FixedOffset>>,
    pub status: BookingStatus,
}

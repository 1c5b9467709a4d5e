use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PricingType {
    PerHour,
    PerDay,
    PerTicket,
}

impl PricingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingType::PerHour => "PER_HOUR",
            PricingType::PerDay => "PER_DAY",
            PricingType::PerTicket => "PER_TICKET",
        }
    }
}

impl FromStr for PricingType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PER_HOUR" => Ok(PricingType::PerHour),
            "PER_DAY" => Ok(PricingType::PerDay),
            "PER_TICKET" => Ok(PricingType::PerTicket),
            other => Err(UnknownVariant::new("pricing type", other)),
        }
    }
}

/// Per-facility limits applied when a booking is created or rescheduled.
/// A `None` field means the rule is not enforced.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookingRules {
    pub booking_window_days: Option<i64>,
    pub advance_notice_hours: Option<i64>,
    pub max_participants: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Facility {
    pub id: String,
    pub name: String,
    pub pricing_type: PricingType,
    pub base_price: Decimal,
    /// Minimum booking length in minutes. Only enforced for `PER_HOUR`.
    pub min_duration: Option<i64>,
    pub rules: Option<BookingRules>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Facility {
    pub fn booking_window_days(&self) -> Option<i64> {
        self.rules.as_ref().and_then(|r| r.booking_window_days)
    }

    pub fn advance_notice_hours(&self) -> Option<i64> {
        self.rules.as_ref().and_then(|r| r.advance_notice_hours)
    }

    pub fn max_participants(&self) -> Option<i64> {
        self.rules.as_ref().and_then(|r| r.max_participants)
    }

    pub fn rule_snapshot(&self) -> RuleSnapshot {
        RuleSnapshot {
            booking_window_days: self.booking_window_days(),
            advance_notice_hours: self.advance_notice_hours(),
            min_duration: self.min_duration,
            max_participants: self.max_participants(),
        }
    }
}

/// The rule set in force at the moment a booking was priced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuleSnapshot {
    pub booking_window_days: Option<i64>,
    pub advance_notice_hours: Option<i64>,
    pub min_duration: Option<i64>,
    pub max_participants: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceListEntry {
    pub id: String,
    pub facility_id: String,
    pub unit_price: Decimal,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_type_round_trips_through_storage_name() {
        for ty in [PricingType::PerHour, PricingType::PerDay, PricingType::PerTicket] {
            assert_eq!(ty.as_str().parse::<PricingType>().unwrap(), ty);
        }
        assert!("HOURLY".parse::<PricingType>().is_err());
    }

    #[test]
    fn test_pricing_type_serializes_screaming_snake() {
        let json = serde_json::to_string(&PricingType::PerTicket).unwrap();
        assert_eq!(json, "\"PER_TICKET\"");
    }
}

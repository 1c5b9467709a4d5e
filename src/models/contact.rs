use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContactChannel {
    Whatsapp,
}

impl ContactChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactChannel::Whatsapp => "WHATSAPP",
        }
    }
}

impl FromStr for ContactChannel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WHATSAPP" => Ok(ContactChannel::Whatsapp),
            other => Err(UnknownVariant::new("contact channel", other)),
        }
    }
}

/// `Out` when staff reached the customer, `In` when the customer wrote first.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContactDirection {
    In,
    Out,
}

impl ContactDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactDirection::In => "IN",
            ContactDirection::Out => "OUT",
        }
    }
}

impl FromStr for ContactDirection {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(ContactDirection::In),
            "OUT" => Ok(ContactDirection::Out),
            other => Err(UnknownVariant::new("contact direction", other)),
        }
    }
}

/// One conversation staff had with a customer about a booking.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactLog {
    pub id: String,
    pub booking_id: String,
    pub customer_id: String,
    pub admin_id: String,
    pub channel: ContactChannel,
    pub direction: ContactDirection,
    pub message_summary: String,
    pub created_at: DateTime<Utc>,
}

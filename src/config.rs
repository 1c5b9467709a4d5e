use std::env;

use chrono::{FixedOffset, Offset, Utc};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub auth_secret: String,
    /// Offset of the business's local time. Decides what "today" means.
    pub business_offset: FixedOffset,
    pub currency: String,
    pub mail_api_url: String,
    pub mail_api_key: String,
    pub mail_from: String,
    pub notify_queue_capacity: usize,
}

pub const DEFAULT_AUTH_SECRET: &str = "changeme";

impl AppConfig {
    pub fn from_env() -> Self {
        let business_offset = env::var("BUSINESS_UTC_OFFSET")
            .ok()
            .and_then(|v| parse_utc_offset(&v))
            .unwrap_or_else(default_offset);

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "bookingdesk.db".to_string()),
            auth_secret: env::var("AUTH_SECRET")
                .unwrap_or_else(|_| DEFAULT_AUTH_SECRET.to_string()),
            business_offset,
            currency: env::var("CURRENCY").unwrap_or_else(|_| "IDR".to_string()),
            mail_api_url: env::var("MAIL_API_URL").unwrap_or_default(),
            mail_api_key: env::var("MAIL_API_KEY").unwrap_or_default(),
            mail_from: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "no-reply@bookingdesk.local".to_string()),
            notify_queue_capacity: env::var("NOTIFY_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(256),
        }
    }

    /// Defaults suitable for tests: in-memory database, log-only mail.
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            database_url: ":memory:".to_string(),
            auth_secret: "test-secret".to_string(),
            business_offset: default_offset(),
            currency: "IDR".to_string(),
            mail_api_url: String::new(),
            mail_api_key: String::new(),
            mail_from: "no-reply@bookingdesk.local".to_string(),
            notify_queue_capacity: 16,
        }
    }
}

fn default_offset() -> FixedOffset {
    FixedOffset::east_opt(7 * 3600).unwrap_or_else(|| Utc.fix())
}

/// Parses `+07:00`, `-0530`, `+7` or `Z` into a fixed offset.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return Some(Utc.fix());
    }

    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };

    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None if rest.len() == 4 => (rest[..2].parse().ok()?, rest[2..].parse().ok()?),
        None => (rest.parse().ok()?, 0),
    };

    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

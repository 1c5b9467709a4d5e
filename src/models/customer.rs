use chrono::{DateTime, Utc};
use serde::Serialize;

/// A customer is keyed by national ID (`nik`). The ID and phone are fixed at
/// first booking; name, email and address are refreshed on every booking.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub nik: String,
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

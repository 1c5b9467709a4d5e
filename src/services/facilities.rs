use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::audit::{FacilityState, PriceListState};
use crate::models::{AuditContext, AuditEvent, BookingRules, Facility, PriceListEntry, PricingType};

use super::audit;
use super::booking::{non_empty, validation};
use super::calendar;
use super::pricing::{decimal_from_json, round_money};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEntryRequest {
    pub unit_price: Option<Value>,
    pub effective_from: Option<String>,
    pub effective_to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFacilityRequest {
    pub name: Option<String>,
    pub pricing_type: Option<String>,
    pub base_price: Option<Value>,
    pub min_duration: Option<i64>,
    pub booking_rules: Option<BookingRules>,
    #[serde(default, alias = "prices")]
    pub price_lists: Vec<PriceEntryRequest>,
}

/// Ten years.
const MAX_WINDOW_DAYS: i64 = 3650;
/// One year.
const MAX_NOTICE_HOURS: i64 = 8760;
const MAX_PARTICIPANTS: i64 = 100_000;

fn check_rules(rules: &BookingRules) -> Result<(), AppError> {
    let fields = [
        ("bookingWindowDays", rules.booking_window_days, MAX_WINDOW_DAYS),
        ("advanceNoticeHours", rules.advance_notice_hours, MAX_NOTICE_HOURS),
        ("maxParticipants", rules.max_participants, MAX_PARTICIPANTS),
    ];
    for (name, value, max) in fields {
        match value {
            Some(v) if v <= 0 => {
                return Err(validation(format!("{name} must be greater than 0")));
            }
            Some(v) if v > max => {
                return Err(validation(format!("{name} must be at most {max}")));
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_price_entry(
    facility_id: &str,
    req: &PriceEntryRequest,
    now: DateTime<Utc>,
    offset: chrono::FixedOffset,
) -> Result<PriceListEntry, AppError> {
    let unit_price = req
        .unit_price
        .as_ref()
        .and_then(decimal_from_json)
        .filter(|p| *p >= Decimal::ZERO)
        .ok_or_else(|| validation("unitPrice must be a number >= 0"))?;

    let parse = |raw: &str, field: &str| {
        calendar::parse_instant(raw, offset)
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| validation(format!("invalid {field}")))
    };

    let effective_from = match non_empty(&req.effective_from) {
        Some(raw) => parse(raw, "effectiveFrom")?,
        None => now,
    };
    let effective_to = non_empty(&req.effective_to)
        .map(|raw| parse(raw, "effectiveTo"))
        .transpose()?;
    if effective_to.is_some_and(|to| to <= effective_from) {
        return Err(validation("effectiveTo must be after effectiveFrom"));
    }

    Ok(PriceListEntry {
        id: Uuid::new_v4().to_string(),
        facility_id: facility_id.to_string(),
        unit_price: round_money(unit_price),
        effective_from,
        effective_to,
    })
}

fn price_state(entry: &PriceListEntry) -> PriceListState {
    PriceListState {
        price_list_id: entry.id.clone(),
        facility_id: entry.facility_id.clone(),
        unit_price: entry.unit_price,
        effective_from: entry.effective_from,
        effective_to: entry.effective_to,
    }
}

pub fn create_facility(
    conn: &mut Connection,
    offset: chrono::FixedOffset,
    now: DateTime<Utc>,
    ctx: &AuditContext,
    req: &NewFacilityRequest,
) -> Result<(Facility, Vec<PriceListEntry>), AppError> {
    let name = non_empty(&req.name).ok_or_else(|| validation("name is required"))?;
    let pricing_type = non_empty(&req.pricing_type)
        .ok_or_else(|| validation("pricingType is required"))?
        .parse::<PricingType>()
        .map_err(|_| validation("pricingType must be PER_HOUR, PER_DAY or PER_TICKET"))?;
    let base_price = req
        .base_price
        .as_ref()
        .and_then(decimal_from_json)
        .filter(|p| *p >= Decimal::ZERO)
        .ok_or_else(|| validation("basePrice must be a number >= 0"))?;
    if req.min_duration.is_some_and(|m| m <= 0) {
        return Err(validation("minDuration must be greater than 0"));
    }
    if let Some(rules) = &req.booking_rules {
        check_rules(rules)?;
    }

    let facility = Facility {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        pricing_type,
        base_price: round_money(base_price),
        min_duration: req.min_duration,
        rules: req.booking_rules.clone(),
        is_deleted: false,
        created_at: now,
        updated_at: now,
    };

    let prices = req
        .price_lists
        .iter()
        .map(|p| parse_price_entry(&facility.id, p, now, offset))
        .collect::<Result<Vec<_>, _>>()?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    queries::insert_facility(&tx, &facility)?;
    if let Some(rules) = &facility.rules {
        queries::upsert_booking_rules(&tx, &facility.id, rules)?;
    }
    for entry in &prices {
        queries::insert_price_entry(&tx, entry, &now)?;
    }

    audit::record(
        &tx,
        ctx,
        None,
        &AuditEvent::FacilityCreate {
            after: FacilityState::from(&facility),
        },
        now,
    )?;

    tx.commit()?;

    tracing::info!(
        facility_id = %facility.id,
        pricing_type = facility.pricing_type.as_str(),
        prices = prices.len(),
        "facility created"
    );

    Ok((facility, prices))
}

pub fn add_price_entry(
    conn: &mut Connection,
    offset: chrono::FixedOffset,
    now: DateTime<Utc>,
    ctx: &AuditContext,
    facility_id: &str,
    req: &PriceEntryRequest,
) -> Result<PriceListEntry, AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let facility = queries::get_facility(&tx, facility_id)?
        .filter(|f| !f.is_deleted)
        .ok_or_else(|| AppError::NotFound("facility not found".into()))?;

    let entry = parse_price_entry(&facility.id, req, now, offset)?;
    queries::insert_price_entry(&tx, &entry, &now)?;

    audit::record(
        &tx,
        ctx,
        None,
        &AuditEvent::PriceListCreate {
            after: price_state(&entry),
        },
        now,
    )?;

    tx.commit()?;

    tracing::info!(facility_id = %facility.id, price_list_id = %entry.id, unit_price = %entry.unit_price, "price list entry added");

    Ok(entry)
}

/// Soft delete. Existing bookings keep pointing at the facility; new ones are
/// refused with 404.
pub fn delete_facility(
    conn: &mut Connection,
    now: DateTime<Utc>,
    ctx: &AuditContext,
    facility_id: &str,
) -> Result<Facility, AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let before = queries::get_facility(&tx, facility_id)?
        .filter(|f| !f.is_deleted)
        .ok_or_else(|| AppError::NotFound("facility not found".into()))?;

    queries::soft_delete_facility(&tx, facility_id, &now)?;
    let after = Facility {
        is_deleted: true,
        updated_at: now,
        ..before.clone()
    };

    audit::record(
        &tx,
        ctx,
        None,
        &AuditEvent::FacilityDelete {
            before: FacilityState::from(&before),
            after: FacilityState::from(&after),
        },
        now,
    )?;

    tx.commit()?;

    tracing::info!(facility_id = %after.id, "facility deleted");

    Ok(after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::ActorType;
    use chrono::{FixedOffset, TimeZone};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 10, 1, 0, 0).unwrap()
    }

    fn wib() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    fn admin() -> AuditContext {
        AuditContext {
            actor_type: ActorType::Admin,
            actor_id: Some("adm-1".to_string()),
            actor_name: None,
            ip: None,
            user_agent: None,
        }
    }

    fn hall() -> NewFacilityRequest {
        NewFacilityRequest {
            name: Some("Main Hall".into()),
            pricing_type: Some("PER_HOUR".into()),
            base_price: Some(json!(40000)),
            min_duration: Some(60),
            booking_rules: Some(BookingRules {
                booking_window_days: Some(30),
                advance_notice_hours: Some(2),
                max_participants: None,
            }),
            price_lists: vec![PriceEntryRequest {
                unit_price: Some(json!(50000)),
                effective_from: Some("2030-01-01T00:00:00Z".into()),
                effective_to: None,
            }],
        }
    }

    #[test]
    fn test_create_facility_persists_rules_and_prices() {
        let mut conn = db::init_db(":memory:").unwrap();
        let (facility, prices) = create_facility(&mut conn, wib(), now(), &admin(), &hall()).unwrap();

        let stored = queries::get_facility(&conn, &facility.id).unwrap().unwrap();
        assert_eq!(stored.booking_window_days(), Some(30));
        assert_eq!(stored.min_duration, Some(60));
        assert_eq!(prices.len(), 1);
        let listed = queries::list_price_entries(&conn, &facility.id).unwrap();
        assert_eq!(listed[0].unit_price, dec!(50000));
        assert_eq!(queries::count_audit_logs(&conn).unwrap(), 1);
    }

    #[test]
    fn test_create_facility_validation() {
        let mut conn = db::init_db(":memory:").unwrap();
        let cases: [fn(&mut NewFacilityRequest); 8] = [
            |r| r.name = None,
            |r| r.pricing_type = Some("HOURLY".into()),
            |r| r.base_price = Some(json!(-1)),
            |r| r.min_duration = Some(0),
            |r| r.booking_rules = Some(BookingRules { max_participants: Some(0), ..Default::default() }),
            |r| r.booking_rules = Some(BookingRules { booking_window_days: Some(1_000_000_000), ..Default::default() }),
            |r| r.booking_rules = Some(BookingRules { advance_notice_hours: Some(9_000_000_000_000_000), ..Default::default() }),
            |r| r.price_lists[0].unit_price = Some(json!("free")),
        ];
        for mutate in cases {
            let mut req = hall();
            mutate(&mut req);
            let err = create_facility(&mut conn, wib(), now(), &admin(), &req).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{err}");
        }
        assert_eq!(queries::count_audit_logs(&conn).unwrap(), 0);
    }

    #[test]
    fn test_delete_is_soft_and_audited() {
        let mut conn = db::init_db(":memory:").unwrap();
        let (facility, _) = create_facility(&mut conn, wib(), now(), &admin(), &hall()).unwrap();

        let deleted = delete_facility(&mut conn, now(), &admin(), &facility.id).unwrap();
        assert!(deleted.is_deleted);
        assert!(queries::get_facility(&conn, &facility.id).unwrap().unwrap().is_deleted);

        let again = delete_facility(&mut conn, now(), &admin(), &facility.id).unwrap_err();
        assert!(matches!(again, AppError::NotFound(_)));

        let price = PriceEntryRequest {
            unit_price: Some(json!(1)),
            ..Default::default()
        };
        let err = add_price_entry(&mut conn, wib(), now(), &admin(), &facility.id, &price).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_price_entry_window_must_be_ordered() {
        let mut conn = db::init_db(":memory:").unwrap();
        let (facility, _) = create_facility(&mut conn, wib(), now(), &admin(), &hall()).unwrap();
        let bad = PriceEntryRequest {
            unit_price: Some(json!(60000)),
            effective_from: Some("2030-02-01T00:00:00Z".into()),
            effective_to: Some("2030-01-01T00:00:00Z".into()),
        };
        assert!(add_price_entry(&mut conn, wib(), now(), &admin(), &facility.id, &bad).is_err());
    }
}

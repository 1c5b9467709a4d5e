//! Booking creation, rescheduling and detail reads.
//!
//! Every write path opens one immediate transaction before its first read, so
//! the availability scan and the insert or update it guards see the same
//! snapshot and no other writer can slip in between.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use rusqlite::{Connection, TransactionBehavior};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::audit::{
    BookingCreatedState, ItemScheduleState, PaymentState, RescheduledState, ScheduleState, Timing,
};
use crate::models::booking::Calculation;
use crate::models::{
    AuditContext, AuditEvent, Booking, BookingItem, BookingStatus, ContactLog, Customer, Facility,
    ItemSnapshot, Payment, PaymentStatus, PaymentTransaction, PriceListEntry, PricingType,
};

use super::audit;
use super::availability::{self, Candidate};
use super::calendar;
use super::notify::{BookingEvent, BookingNotice};
use super::pricing::{self, PricingError, Units};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInput {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub nik: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBookingRequest {
    pub customer: Option<CustomerInput>,
    pub facility_id: Option<String>,
    pub booking_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub participants: Option<Value>,
    pub day: Option<Value>,
    pub purpose: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleRequest {
    pub booking_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// New day count for daily facilities. Defaults to the current count.
    pub day: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBooking {
    pub booking: Booking,
    pub payment: Payment,
}

/// Result of any admin mutation: the booking as committed, its payment, and
/// the ledger entry the mutation appended, if any.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingOutcome {
    pub booking: Booking,
    pub payment: Option<Payment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<PaymentTransaction>,
}

pub(crate) fn validation(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// `BK`, the last six digits of the epoch millis, then four random hex chars.
pub fn generate_booking_code(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().rem_euclid(1_000_000);
    let random = Uuid::new_v4().simple().to_string();
    format!("BK{millis:06}{}", random[..4].to_uppercase())
}

// ── Shared schedule checks ──

fn check_date(
    facility: &Facility,
    date: NaiveDate,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<(), AppError> {
    let today = calendar::today(now, offset);
    if date < today {
        return Err(validation("bookingDate cannot be in the past"));
    }

    if let Some(days) = facility.booking_window_days() {
        // A window past the calendar's range imposes no limit.
        let latest = Duration::try_days(days).and_then(|d| today.checked_add_signed(d));
        if let Some(latest) = latest.filter(|latest| date > *latest) {
            return Err(validation(format!(
                "bookings can only be made up to {days} days ahead (latest date: {latest})"
            )));
        }
    }

    Ok(())
}

fn parse_times(
    start: Option<&str>,
    end: Option<&str>,
    offset: FixedOffset,
) -> Result<(Option<DateTime<FixedOffset>>, Option<DateTime<FixedOffset>>), PricingError> {
    let start = start
        .map(|s| calendar::parse_instant(s, offset).ok_or(PricingError::InvalidStartTime))
        .transpose()?;
    let end = end
        .map(|s| calendar::parse_instant(s, offset).ok_or(PricingError::InvalidEndTime))
        .transpose()?;
    Ok((start, end))
}

fn check_hours(
    facility: &Facility,
    date: NaiveDate,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
) -> Result<(), PricingError> {
    pricing::validate_hourly_window(start, end, facility.min_duration)?;
    if start.date_naive() != date {
        return Err(PricingError::OffBookingDate);
    }
    Ok(())
}

fn check_notice(
    facility: &Facility,
    date: NaiveDate,
    start: Option<DateTime<FixedOffset>>,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<(), AppError> {
    let Some(hours) = facility.advance_notice_hours() else {
        return Ok(());
    };
    let visit = calendar::visit_start(date, start, offset)
        .ok_or_else(|| validation("invalid bookingDate"))?;
    let lead = visit.with_timezone(&Utc) - now;
    match Duration::try_hours(hours) {
        Some(required) if lead >= required => Ok(()),
        _ => Err(validation(format!(
            "bookings must be made at least {hours} hours before the visit"
        ))),
    }
}

struct ResolvedPrice {
    unit_price: Decimal,
    entry: Option<PriceListEntry>,
}

fn resolve_price(
    conn: &Connection,
    facility: &Facility,
    now: DateTime<Utc>,
) -> Result<ResolvedPrice, AppError> {
    let entries = queries::list_price_entries(conn, &facility.id)?;
    let entry = pricing::select_current_price(&entries, now).cloned();
    Ok(ResolvedPrice {
        unit_price: entry.as_ref().map_or(facility.base_price, |e| e.unit_price),
        entry,
    })
}

fn notice(booking: &Booking, facility: &Facility, customer_name: &str, email: Option<&str>) -> BookingNotice {
    BookingNotice {
        booking_id: booking.id.clone(),
        booking_code: booking.booking_code.clone(),
        customer_name: customer_name.to_string(),
        customer_email: email.map(str::to_string),
        facility_name: facility.name.clone(),
        booking_date: booking.booking_date,
        start_time: booking.start_time,
        end_time: booking.end_time,
        total_amount: booking.total_amount,
        currency: booking.currency.clone(),
        status: booking.status.as_str(),
    }
}

// ── Create ──

pub fn create_booking(
    conn: &mut Connection,
    config: &AppConfig,
    now: DateTime<Utc>,
    ctx: &AuditContext,
    req: &NewBookingRequest,
) -> Result<(CreatedBooking, BookingEvent), AppError> {
    let customer = req.customer.as_ref();
    let (Some(full_name), Some(phone), Some(nik)) = (
        customer.and_then(|c| non_empty(&c.full_name)),
        customer.and_then(|c| non_empty(&c.phone)),
        customer.and_then(|c| non_empty(&c.nik)),
    ) else {
        return Err(validation("customer fullName, phone and nik are required"));
    };
    let email = customer.and_then(|c| non_empty(&c.email));
    let address = customer.and_then(|c| non_empty(&c.address));

    let facility_id = non_empty(&req.facility_id).ok_or_else(|| validation("facilityId is required"))?;
    let raw_date = non_empty(&req.booking_date).ok_or_else(|| validation("bookingDate is required"))?;

    let participants = match &req.participants {
        None => 1,
        Some(v) => pricing::positive_integer(v).ok_or(PricingError::InvalidParticipants)?,
    };

    let offset = config.business_offset;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let facility = queries::get_facility(&tx, facility_id)?
        .filter(|f| !f.is_deleted)
        .ok_or_else(|| AppError::NotFound("facility not found".into()))?;

    let days = match facility.pricing_type {
        PricingType::PerDay => {
            let raw = req.day.as_ref().ok_or(PricingError::MissingDay)?;
            Some(pricing::positive_integer(raw).ok_or(PricingError::InvalidDay)?)
        }
        PricingType::PerHour => {
            if non_empty(&req.start_time).is_none() || non_empty(&req.end_time).is_none() {
                return Err(PricingError::MissingTimes.into());
            }
            None
        }
        PricingType::PerTicket => None,
    };

    let date = calendar::parse_date(raw_date).ok_or_else(|| validation("invalid bookingDate"))?;
    check_date(&facility, date, now, offset)?;

    let times = if facility.pricing_type == PricingType::PerHour {
        match parse_times(non_empty(&req.start_time), non_empty(&req.end_time), offset)? {
            (Some(start), Some(end)) => {
                check_hours(&facility, date, start, end)?;
                Some((start, end))
            }
            _ => return Err(PricingError::MissingTimes.into()),
        }
    } else {
        None
    };
    let (start_time, end_time) = times.unzip();

    check_notice(&facility, date, start_time, now, offset)?;

    if let Some(max) = facility.max_participants() {
        if participants > max {
            return Err(validation(format!(
                "participants exceed the capacity of {max} per booking"
            )));
        }
    }

    let price = resolve_price(&tx, &facility, now)?;
    let units = match (times, days) {
        (Some((start, end)), _) => Units::Hours { start, end },
        (None, Some(days)) => Units::Days(days),
        (None, None) => Units::Tickets { participants },
    };
    let quote = pricing::quote(price.unit_price, &units)?;

    availability::ensure_available(
        &tx,
        &facility.id,
        facility.pricing_type,
        date,
        &Candidate {
            customer_nik: nik,
            start: start_time,
            end: end_time,
        },
        None,
    )?;

    let customer_id = queries::upsert_customer(
        &tx,
        &Customer {
            id: Uuid::new_v4().to_string(),
            nik: nik.to_string(),
            full_name: full_name.to_string(),
            phone: phone.to_string(),
            email: email.map(str::to_string),
            address: address.map(str::to_string),
            created_at: now,
        },
    )?;

    let booking = Booking {
        id: Uuid::new_v4().to_string(),
        booking_code: generate_booking_code(now),
        customer_id,
        facility_id: facility.id.clone(),
        booking_date: date,
        start_time,
        end_time,
        participants,
        purpose: non_empty(&req.purpose).map(str::to_string),
        status: BookingStatus::New,
        total_amount: quote.total_amount,
        currency: config.currency.clone(),
        source: non_empty(&req.source).unwrap_or("WEB").to_string(),
        admin_note: None,
        verification_method: "NONE".to_string(),
        verified_at: None,
        is_deleted: false,
        created_at: now,
        updated_at: now,
    };
    queries::insert_booking(&tx, &booking)?;

    let snapshot = ItemSnapshot {
        facility_name: facility.name.clone(),
        pricing_type: facility.pricing_type,
        applied_unit_price: quote.unit_price,
        unit_count: quote.unit_count,
        participants,
        days_booked: days,
        base_price: facility.base_price,
        calculation: Calculation {
            formula: quote.formula.clone(),
            total_amount: quote.total_amount,
        },
        price_list_id: price.entry.as_ref().map(|e| e.id.clone()),
        price_list_effective_from: price.entry.as_ref().map(|e| e.effective_from),
        price_list_effective_to: price.entry.as_ref().and_then(|e| e.effective_to),
        rules: facility.rule_snapshot(),
        snapshot_at: now,
    };

    let item = BookingItem {
        id: Uuid::new_v4().to_string(),
        booking_id: booking.id.clone(),
        date,
        start_time,
        end_time,
        unit_type: facility.pricing_type,
        unit_count: quote.unit_count,
        price: quote.unit_price,
        meta: serde_json::to_value(&snapshot)?,
    };
    queries::insert_booking_item(&tx, &item, &now)?;

    let payment = Payment {
        id: Uuid::new_v4().to_string(),
        booking_id: booking.id.clone(),
        status: PaymentStatus::Pending,
        total_due: quote.total_amount,
        total_paid: Decimal::ZERO,
        last_transaction_at: None,
    };
    queries::insert_payment(&tx, &payment, &now)?;

    let created = AuditEvent::BookingCreate {
        after: Box::new(BookingCreatedState {
            booking_id: booking.id.clone(),
            booking_code: booking.booking_code.clone(),
            facility_id: facility.id.clone(),
            customer_id: booking.customer_id.clone(),
            status: booking.status,
            pricing_type: facility.pricing_type,
            total_amount: booking.total_amount,
            currency: booking.currency.clone(),
            item: snapshot,
            participants,
            purpose: booking.purpose.clone(),
            source: booking.source.clone(),
            timing: Timing::of(&booking),
        }),
    };
    audit::record(&tx, ctx, Some(&booking.id), &created, now)?;
    audit::record(
        &tx,
        &ctx.as_system(),
        Some(&booking.id),
        &AuditEvent::PaymentInit {
            after: PaymentState::from(&payment),
        },
        now,
    )?;

    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        booking_code = %booking.booking_code,
        facility_id = %facility.id,
        total_amount = %booking.total_amount,
        "booking created"
    );

    let event = BookingEvent::Created(notice(&booking, &facility, full_name, email));
    Ok((CreatedBooking { booking, payment }, event))
}

// ── Reschedule ──

pub fn reschedule_booking(
    conn: &mut Connection,
    config: &AppConfig,
    now: DateTime<Utc>,
    ctx: &AuditContext,
    booking_id: &str,
    req: &RescheduleRequest,
) -> Result<(BookingOutcome, BookingEvent), AppError> {
    let offset = config.business_offset;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let current = queries::get_booking(&tx, booking_id)?
        .ok_or_else(|| AppError::NotFound("booking not found".into()))?;
    if current.status.is_terminal() {
        return Err(validation(format!(
            "cannot reschedule a {} booking",
            current.status.as_str()
        )));
    }

    let raw_date = non_empty(&req.booking_date).ok_or_else(|| validation("bookingDate is required"))?;
    let date = calendar::parse_date(raw_date).ok_or_else(|| validation("invalid bookingDate"))?;
    let (start, end) = parse_times(non_empty(&req.start_time), non_empty(&req.end_time), offset)?;
    if let (Some(s), Some(e)) = (start, end) {
        if e <= s {
            return Err(PricingError::EndNotAfterStart.into());
        }
    }
    let day_override = req
        .day
        .as_ref()
        .map(|v| pricing::positive_integer(v).ok_or(PricingError::InvalidDay))
        .transpose()?;

    let facility = queries::get_facility(&tx, &current.facility_id)?
        .ok_or_else(|| AppError::NotFound("facility not found".into()))?;

    check_date(&facility, date, now, offset)?;

    let times = match facility.pricing_type {
        PricingType::PerHour => {
            let (Some(s), Some(e)) = (start, end) else {
                return Err(PricingError::MissingTimes.into());
            };
            check_hours(&facility, date, s, e)?;
            Some((s, e))
        }
        // Only hourly bookings carry a time window.
        PricingType::PerDay | PricingType::PerTicket => None,
    };
    let (start_time, end_time) = times.unzip();

    check_notice(&facility, date, start_time, now, offset)?;

    let customer = queries::get_customer(&tx, &current.customer_id)?
        .ok_or_else(|| AppError::Internal(format!("booking {} has no customer", current.id)))?;

    availability::ensure_available(
        &tx,
        &facility.id,
        facility.pricing_type,
        date,
        &Candidate {
            customer_nik: &customer.nik,
            start: start_time,
            end: end_time,
        },
        Some(&current.id),
    )?;

    let items = queries::list_booking_items(&tx, &current.id)?;
    let first_item = items.first();

    let price = resolve_price(&tx, &facility, now)?;
    let units = match (times, facility.pricing_type) {
        (Some((start, end)), _) => Units::Hours { start, end },
        (None, PricingType::PerDay) => Units::Days(
            day_override
                .or(first_item.map(|i| i.unit_count))
                .unwrap_or(1),
        ),
        (None, _) => Units::Tickets {
            participants: current.participants,
        },
    };
    let quote = pricing::quote(price.unit_price, &units)?;

    let mut payment = queries::get_payment_for_booking(&tx, &current.id)?;
    if let Some(p) = &payment {
        if quote.total_amount < p.total_paid - pricing::money_epsilon() {
            return Err(validation(format!(
                "new total {} is below the amount already paid ({})",
                quote.total_amount, p.total_paid
            )));
        }
    }

    let before = ScheduleState {
        booking_id: current.id.clone(),
        booking_code: current.booking_code.clone(),
        timing: Timing::of(&current),
        total_amount: current.total_amount,
        first_item: first_item.map(|i| ItemScheduleState {
            item_id: i.id.clone(),
            date: i.date,
            start_time: i.start_time,
            end_time: i.end_time,
            unit_count: i.unit_count,
            price: i.price,
        }),
    };

    queries::update_booking_schedule(
        &tx,
        &current.id,
        date,
        start_time,
        end_time,
        quote.total_amount,
        &now,
    )?;

    let updated_item = match first_item {
        Some(item) => {
            queries::update_item_schedule(
                &tx,
                &item.id,
                date,
                start_time,
                end_time,
                quote.unit_count,
                quote.unit_price,
            )?;
            Some(ItemScheduleState {
                item_id: item.id.clone(),
                date,
                start_time,
                end_time,
                unit_count: quote.unit_count,
                price: quote.unit_price,
            })
        }
        None => None,
    };

    if let Some(p) = payment.as_mut() {
        p.total_due = quote.total_amount;
        queries::update_payment(&tx, p, &now)?;
    }

    let booking = Booking {
        booking_date: date,
        start_time,
        end_time,
        total_amount: quote.total_amount,
        updated_at: now,
        ..current
    };

    let event = AuditEvent::BookingReschedule {
        before,
        after: RescheduledState {
            schedule: ScheduleState {
                booking_id: booking.id.clone(),
                booking_code: booking.booking_code.clone(),
                timing: Timing::of(&booking),
                total_amount: booking.total_amount,
                first_item: updated_item,
            },
            facility_id: facility.id.clone(),
            pricing_type: facility.pricing_type,
            rules: facility.rule_snapshot(),
            rescheduled_at: now,
            rescheduled_by: ctx.actor_ref(),
        },
    };
    audit::record(&tx, ctx, Some(&booking.id), &event, now)?;

    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        booking_date = %booking.booking_date,
        total_amount = %booking.total_amount,
        "booking rescheduled"
    );

    let event = BookingEvent::Rescheduled(notice(
        &booking,
        &facility,
        &customer.full_name,
        customer.email.as_deref(),
    ));
    Ok((
        BookingOutcome {
            booking,
            payment,
            transaction: None,
        },
        event,
    ))
}

// ── Detail ──

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitySummary {
    pub id: String,
    pub name: String,
    pub pricing_type: PricingType,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetail {
    #[serde(flatten)]
    pub payment: Payment,
    pub transactions: Vec<PaymentTransaction>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub total_due: Decimal,
    pub total_paid: Decimal,
    pub remaining_amount: Decimal,
    pub is_paid: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetail {
    pub booking: Booking,
    pub customer: Option<Customer>,
    pub facility: Option<FacilitySummary>,
    pub items: Vec<BookingItem>,
    pub payment: Option<PaymentDetail>,
    pub payment_summary: PaymentSummary,
    pub contact_logs: Vec<ContactLog>,
}

pub fn load_detail(conn: &Connection, booking_id: &str) -> Result<BookingDetail, AppError> {
    let booking = queries::get_booking(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound("booking not found".into()))?;

    let customer = queries::get_customer(conn, &booking.customer_id)?;
    let facility = queries::get_facility(conn, &booking.facility_id)?.map(|f| FacilitySummary {
        id: f.id,
        name: f.name,
        pricing_type: f.pricing_type,
        is_deleted: f.is_deleted,
    });
    let items = queries::list_booking_items(conn, &booking.id)?;
    let contact_logs = queries::list_contact_logs(conn, &booking.id)?;

    let payment = match queries::get_payment_for_booking(conn, &booking.id)? {
        Some(payment) => Some(PaymentDetail {
            transactions: queries::list_payment_transactions(conn, &booking.id)?,
            payment,
        }),
        None => None,
    };

    let (total_due, total_paid, settled) = match &payment {
        Some(p) => (
            p.payment.total_due,
            p.payment.total_paid,
            p.payment.status == PaymentStatus::Paid,
        ),
        None => (booking.total_amount, Decimal::ZERO, false),
    };
    let remaining_amount = pricing::round_money(total_due - total_paid);

    Ok(BookingDetail {
        payment_summary: PaymentSummary {
            total_due,
            total_paid,
            remaining_amount,
            is_paid: settled || remaining_amount <= pricing::money_epsilon(),
        },
        booking,
        customer,
        facility,
        items,
        payment,
        contact_logs,
    })
}

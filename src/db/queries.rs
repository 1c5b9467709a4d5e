use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::models::{
    ActiveBooking, AuditLogEntry, Booking, BookingItem, BookingRules, BookingStatus,
    CalendarBooking, ContactLog, Customer, Facility, Payment, PaymentTransaction, PriceListEntry,
};

pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn fmt_ts(dt: &DateTime<Utc>) -> String {
    dt.format(TS_FORMAT).to_string()
}

fn fmt_date(d: &NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

fn fmt_instant(dt: &Option<DateTime<FixedOffset>>) -> Option<String> {
    dt.map(|t| t.to_rfc3339())
}

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn ts_col(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, TS_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| conversion_err(idx, e))
}

fn opt_ts_col(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => NaiveDateTime::parse_from_str(&raw, TS_FORMAT)
            .map(|naive| Some(naive.and_utc()))
            .map_err(|e| conversion_err(idx, e)),
        None => Ok(None),
    }
}

fn date_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_err(idx, e))
}

fn instant_col(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<FixedOffset>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(Some)
            .map_err(|e| conversion_err(idx, e)),
        None => Ok(None),
    }
}

fn decimal_col(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

fn enum_col<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_err(idx, e))
}

fn json_col(row: &Row, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| conversion_err(idx, e)),
        None => Ok(None),
    }
}

// ── Facilities ──

pub fn insert_facility(conn: &Connection, facility: &Facility) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO facilities (id, name, pricing_type, base_price, min_duration, is_deleted, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            facility.id,
            facility.name,
            facility.pricing_type.as_str(),
            facility.base_price.to_string(),
            facility.min_duration,
            facility.is_deleted,
            fmt_ts(&facility.created_at),
            fmt_ts(&facility.updated_at),
        ],
    )?;
    Ok(())
}

pub fn upsert_booking_rules(
    conn: &Connection,
    facility_id: &str,
    rules: &BookingRules,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO booking_rules (facility_id, booking_window_days, advance_notice_hours, max_participants)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(facility_id) DO UPDATE SET
           booking_window_days = excluded.booking_window_days,
           advance_notice_hours = excluded.advance_notice_hours,
           max_participants = excluded.max_participants",
        params![
            facility_id,
            rules.booking_window_days,
            rules.advance_notice_hours,
            rules.max_participants,
        ],
    )?;
    Ok(())
}

pub fn insert_price_entry(
    conn: &Connection,
    entry: &PriceListEntry,
    created_at: &DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO price_lists (id, facility_id, unit_price, effective_from, effective_to, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.id,
            entry.facility_id,
            entry.unit_price.to_string(),
            fmt_ts(&entry.effective_from),
            entry.effective_to.as_ref().map(fmt_ts),
            fmt_ts(created_at),
        ],
    )?;
    Ok(())
}

/// Looks a facility up by id, soft-deleted ones included. Callers decide
/// whether a deleted facility counts as missing.
pub fn get_facility(conn: &Connection, id: &str) -> rusqlite::Result<Option<Facility>> {
    conn.query_row(
        "SELECT f.id, f.name, f.pricing_type, f.base_price, f.min_duration, f.is_deleted,
                f.created_at, f.updated_at,
                r.facility_id, r.booking_window_days, r.advance_notice_hours, r.max_participants
         FROM facilities f
         LEFT JOIN booking_rules r ON r.facility_id = f.id
         WHERE f.id = ?1",
        params![id],
        |row| {
            let has_rules = row.get::<_, Option<String>>(8)?.is_some();
            let rules = if has_rules {
                Some(BookingRules {
                    booking_window_days: row.get(9)?,
                    advance_notice_hours: row.get(10)?,
                    max_participants: row.get(11)?,
                })
            } else {
                None
            };

            Ok(Facility {
                id: row.get(0)?,
                name: row.get(1)?,
                pricing_type: enum_col(row, 2)?,
                base_price: decimal_col(row, 3)?,
                min_duration: row.get(4)?,
                is_deleted: row.get(5)?,
                created_at: ts_col(row, 6)?,
                updated_at: ts_col(row, 7)?,
                rules,
            })
        },
    )
    .optional()
}

/// Price rows for a facility, newest `effective_from` first.
pub fn list_price_entries(
    conn: &Connection,
    facility_id: &str,
) -> rusqlite::Result<Vec<PriceListEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, facility_id, unit_price, effective_from, effective_to
         FROM price_lists WHERE facility_id = ?1
         ORDER BY effective_from DESC",
    )?;

    let rows = stmt.query_map(params![facility_id], |row| {
        Ok(PriceListEntry {
            id: row.get(0)?,
            facility_id: row.get(1)?,
            unit_price: decimal_col(row, 2)?,
            effective_from: ts_col(row, 3)?,
            effective_to: opt_ts_col(row, 4)?,
        })
    })?;

    rows.collect()
}

pub fn soft_delete_facility(
    conn: &Connection,
    id: &str,
    now: &DateTime<Utc>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE facilities SET is_deleted = 1, updated_at = ?2 WHERE id = ?1 AND is_deleted = 0",
        params![id, fmt_ts(now)],
    )
}

// ── Customers ──

/// Inserts the customer or refreshes name, email and address on an existing
/// national ID. Phone stays as first recorded. Returns the stored id.
pub fn upsert_customer(conn: &Connection, customer: &Customer) -> rusqlite::Result<String> {
    let now = fmt_ts(&customer.created_at);
    conn.query_row(
        "INSERT INTO customers (id, nik, full_name, phone, email, address, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
         ON CONFLICT(nik) DO UPDATE SET
           full_name = excluded.full_name,
           email = excluded.email,
           address = excluded.address,
           updated_at = excluded.updated_at
         RETURNING id",
        params![
            customer.id,
            customer.nik,
            customer.full_name,
            customer.phone,
            customer.email,
            customer.address,
            now,
        ],
        |row| row.get(0),
    )
}

pub fn get_customer(conn: &Connection, id: &str) -> rusqlite::Result<Option<Customer>> {
    conn.query_row(
        "SELECT id, nik, full_name, phone, email, address, created_at FROM customers WHERE id = ?1",
        params![id],
        |row| {
            Ok(Customer {
                id: row.get(0)?,
                nik: row.get(1)?,
                full_name: row.get(2)?,
                phone: row.get(3)?,
                email: row.get(4)?,
                address: row.get(5)?,
                created_at: ts_col(row, 6)?,
            })
        },
    )
    .optional()
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, booking_code, customer_id, facility_id, booking_date, start_time, end_time,
     participants, purpose, status, total_amount, currency, source, admin_note,
     verification_method, verified_at, is_deleted, created_at, updated_at";

fn booking_from_row(row: &Row) -> rusqlite::Result<Booking> {
    Ok(Booking {
        id: row.get(0)?,
        booking_code: row.get(1)?,
        customer_id: row.get(2)?,
        facility_id: row.get(3)?,
        booking_date: date_col(row, 4)?,
        start_time: instant_col(row, 5)?,
        end_time: instant_col(row, 6)?,
        participants: row.get(7)?,
        purpose: row.get(8)?,
        status: enum_col(row, 9)?,
        total_amount: decimal_col(row, 10)?,
        currency: row.get(11)?,
        source: row.get(12)?,
        admin_note: row.get(13)?,
        verification_method: row.get(14)?,
        verified_at: opt_ts_col(row, 15)?,
        is_deleted: row.get(16)?,
        created_at: ts_col(row, 17)?,
        updated_at: ts_col(row, 18)?,
    })
}

pub fn insert_booking(conn: &Connection, booking: &Booking) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
        ),
        params![
            booking.id,
            booking.booking_code,
            booking.customer_id,
            booking.facility_id,
            fmt_date(&booking.booking_date),
            fmt_instant(&booking.start_time),
            fmt_instant(&booking.end_time),
            booking.participants,
            booking.purpose,
            booking.status.as_str(),
            booking.total_amount.to_string(),
            booking.currency,
            booking.source,
            booking.admin_note,
            booking.verification_method,
            booking.verified_at.as_ref().map(fmt_ts),
            booking.is_deleted,
            fmt_ts(&booking.created_at),
            fmt_ts(&booking.updated_at),
        ],
    )?;
    Ok(())
}

/// A live booking by id. Soft-deleted bookings are treated as absent.
pub fn get_booking(conn: &Connection, id: &str) -> rusqlite::Result<Option<Booking>> {
    conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1 AND is_deleted = 0"),
        params![id],
        booking_from_row,
    )
    .optional()
}

/// Bookings on `date` that still hold a slot, with the owning customer's
/// national ID, for the availability scan.
pub fn list_active_bookings_on(
    conn: &Connection,
    facility_id: &str,
    date: NaiveDate,
    exclude_booking_id: Option<&str>,
) -> rusqlite::Result<Vec<ActiveBooking>> {
    let [a, b, c] = BookingStatus::ACTIVE.map(|s| s.as_str());
    let mut stmt = conn.prepare(
        "SELECT b.id, c.nik, b.start_time, b.end_time
         FROM bookings b
         JOIN customers c ON c.id = b.customer_id
         WHERE b.facility_id = ?1
           AND b.booking_date = ?2
           AND b.is_deleted = 0
           AND b.status IN (?3, ?4, ?5)
           AND (?6 IS NULL OR b.id != ?6)
         ORDER BY b.start_time ASC, b.created_at ASC",
    )?;

    let rows = stmt.query_map(
        params![facility_id, fmt_date(&date), a, b, c, exclude_booking_id],
        |row| {
            Ok(ActiveBooking {
                id: row.get(0)?,
                customer_nik: row.get(1)?,
                start_time: instant_col(row, 2)?,
                end_time: instant_col(row, 3)?,
            })
        },
    )?;

    rows.collect()
}

/// Live bookings dated `from..=to` in any status, ordered for display.
pub fn list_bookings_between(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
    facility_id: Option<&str>,
) -> rusqlite::Result<Vec<CalendarBooking>> {
    let mut stmt = conn.prepare(
        "SELECT b.id, b.booking_code, f.id, f.name, c.full_name, b.booking_date,
                b.start_time, b.end_time, b.status
         FROM bookings b
         JOIN facilities f ON f.id = b.facility_id
         JOIN customers c ON c.id = b.customer_id
         WHERE b.booking_date BETWEEN ?1 AND ?2
           AND b.is_deleted = 0
           AND (?3 IS NULL OR b.facility_id = ?3)
         ORDER BY b.booking_date ASC, b.start_time ASC, b.created_at ASC",
    )?;

    let rows = stmt.query_map(params![fmt_date(&from), fmt_date(&to), facility_id], |row| {
        Ok(CalendarBooking {
            id: row.get(0)?,
            booking_code: row.get(1)?,
            facility_id: row.get(2)?,
            facility_name: row.get(3)?,
            customer_name: row.get(4)?,
            booking_date: date_col(row, 5)?,
            start_time: instant_col(row, 6)?,
            end_time: instant_col(row, 7)?,
            status: enum_col(row, 8)?,
        })
    })?;

    rows.collect()
}

pub fn update_booking_schedule(
    conn: &Connection,
    id: &str,
    date: NaiveDate,
    start: Option<DateTime<FixedOffset>>,
    end: Option<DateTime<FixedOffset>>,
    total_amount: Decimal,
    now: &DateTime<Utc>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE bookings
         SET booking_date = ?2, start_time = ?3, end_time = ?4, total_amount = ?5, updated_at = ?6
         WHERE id = ?1",
        params![
            id,
            fmt_date(&date),
            fmt_instant(&start),
            fmt_instant(&end),
            total_amount.to_string(),
            fmt_ts(now),
        ],
    )
}

pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    status: BookingStatus,
    admin_note: Option<&str>,
    now: &DateTime<Utc>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE bookings SET status = ?2, admin_note = ?3, updated_at = ?4 WHERE id = ?1",
        params![id, status.as_str(), admin_note, fmt_ts(now)],
    )
}

// ── Booking items ──

pub fn insert_booking_item(
    conn: &Connection,
    item: &BookingItem,
    created_at: &DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO booking_items (id, booking_id, date, start_time, end_time, unit_type, unit_count, price, meta, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            item.id,
            item.booking_id,
            fmt_date(&item.date),
            fmt_instant(&item.start_time),
            fmt_instant(&item.end_time),
            item.unit_type.as_str(),
            item.unit_count,
            item.price.to_string(),
            item.meta.to_string(),
            fmt_ts(created_at),
        ],
    )?;
    Ok(())
}

/// Line items in booking order; the first one carries the pricing snapshot.
pub fn list_booking_items(
    conn: &Connection,
    booking_id: &str,
) -> rusqlite::Result<Vec<BookingItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, date, start_time, end_time, unit_type, unit_count, price, meta
         FROM booking_items WHERE booking_id = ?1
         ORDER BY date ASC, rowid ASC",
    )?;

    let rows = stmt.query_map(params![booking_id], |row| {
        Ok(BookingItem {
            id: row.get(0)?,
            booking_id: row.get(1)?,
            date: date_col(row, 2)?,
            start_time: instant_col(row, 3)?,
            end_time: instant_col(row, 4)?,
            unit_type: enum_col(row, 5)?,
            unit_count: row.get(6)?,
            price: decimal_col(row, 7)?,
            meta: json_col(row, 8)?.unwrap_or(serde_json::Value::Null),
        })
    })?;

    rows.collect()
}

pub fn update_item_schedule(
    conn: &Connection,
    item_id: &str,
    date: NaiveDate,
    start: Option<DateTime<FixedOffset>>,
    end: Option<DateTime<FixedOffset>>,
    unit_count: i64,
    price: Decimal,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE booking_items
         SET date = ?2, start_time = ?3, end_time = ?4, unit_count = ?5, price = ?6
         WHERE id = ?1",
        params![
            item_id,
            fmt_date(&date),
            fmt_instant(&start),
            fmt_instant(&end),
            unit_count,
            price.to_string(),
        ],
    )
}

// ── Payments ──

pub fn insert_payment(
    conn: &Connection,
    payment: &Payment,
    now: &DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO payments (id, booking_id, status, total_due, total_paid, last_transaction_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            payment.id,
            payment.booking_id,
            payment.status.as_str(),
            payment.total_due.to_string(),
            payment.total_paid.to_string(),
            payment.last_transaction_at.as_ref().map(fmt_ts),
            fmt_ts(now),
        ],
    )?;
    Ok(())
}

pub fn get_payment_for_booking(
    conn: &Connection,
    booking_id: &str,
) -> rusqlite::Result<Option<Payment>> {
    conn.query_row(
        "SELECT id, booking_id, status, total_due, total_paid, last_transaction_at
         FROM payments WHERE booking_id = ?1",
        params![booking_id],
        |row| {
            Ok(Payment {
                id: row.get(0)?,
                booking_id: row.get(1)?,
                status: enum_col(row, 2)?,
                total_due: decimal_col(row, 3)?,
                total_paid: decimal_col(row, 4)?,
                last_transaction_at: opt_ts_col(row, 5)?,
            })
        },
    )
    .optional()
}

/// Writes status, totals and last transaction time from `payment`.
pub fn update_payment(
    conn: &Connection,
    payment: &Payment,
    now: &DateTime<Utc>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE payments
         SET status = ?2, total_due = ?3, total_paid = ?4, last_transaction_at = ?5, updated_at = ?6
         WHERE id = ?1",
        params![
            payment.id,
            payment.status.as_str(),
            payment.total_due.to_string(),
            payment.total_paid.to_string(),
            payment.last_transaction_at.as_ref().map(fmt_ts),
            fmt_ts(now),
        ],
    )
}

// ── Payment transactions ──

pub fn insert_payment_transaction(
    conn: &Connection,
    tx: &PaymentTransaction,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO payment_transactions (id, booking_id, payment_id, amount, tx_type, method, status, paid_at, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            tx.id,
            tx.booking_id,
            tx.payment_id,
            tx.amount.to_string(),
            tx.tx_type.as_str(),
            tx.method.as_str(),
            tx.status,
            fmt_ts(&tx.paid_at),
            tx.notes,
            fmt_ts(&tx.created_at),
        ],
    )?;
    Ok(())
}

/// The ledger for a booking, newest entry first.
pub fn list_payment_transactions(
    conn: &Connection,
    booking_id: &str,
) -> rusqlite::Result<Vec<PaymentTransaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, payment_id, amount, tx_type, method, status, paid_at, notes, created_at
         FROM payment_transactions WHERE booking_id = ?1
         ORDER BY created_at DESC, rowid DESC",
    )?;

    let rows = stmt.query_map(params![booking_id], |row| {
        Ok(PaymentTransaction {
            id: row.get(0)?,
            booking_id: row.get(1)?,
            payment_id: row.get(2)?,
            amount: decimal_col(row, 3)?,
            tx_type: enum_col(row, 4)?,
            method: enum_col(row, 5)?,
            status: row.get(6)?,
            paid_at: ts_col(row, 7)?,
            notes: row.get(8)?,
            created_at: ts_col(row, 9)?,
        })
    })?;

    rows.collect()
}

// ── Contact log ──

pub fn insert_contact_log(conn: &Connection, log: &ContactLog) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO contact_logs (id, booking_id, customer_id, admin_id, channel, direction, message_summary, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            log.id,
            log.booking_id,
            log.customer_id,
            log.admin_id,
            log.channel.as_str(),
            log.direction.as_str(),
            log.message_summary,
            fmt_ts(&log.created_at),
        ],
    )?;
    Ok(())
}

/// Newest first.
pub fn list_contact_logs(conn: &Connection, booking_id: &str) -> rusqlite::Result<Vec<ContactLog>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, customer_id, admin_id, channel, direction, message_summary, created_at
         FROM contact_logs WHERE booking_id = ?1
         ORDER BY created_at DESC, rowid DESC",
    )?;

    let rows = stmt.query_map(params![booking_id], |row| {
        Ok(ContactLog {
            id: row.get(0)?,
            booking_id: row.get(1)?,
            customer_id: row.get(2)?,
            admin_id: row.get(3)?,
            channel: enum_col(row, 4)?,
            direction: enum_col(row, 5)?,
            message_summary: row.get(6)?,
            created_at: ts_col(row, 7)?,
        })
    })?;

    rows.collect()
}

// ── Audit log ──

#[allow(clippy::too_many_arguments)]
pub fn insert_audit_log(
    conn: &Connection,
    actor_type: &str,
    actor_id: Option<&str>,
    action: &str,
    entity: &str,
    entity_id: Option<&str>,
    booking_id: Option<&str>,
    before: Option<&serde_json::Value>,
    after: &serde_json::Value,
    ip: Option<&str>,
    user_agent: Option<&str>,
    created_at: &DateTime<Utc>,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO audit_logs (actor_type, actor_id, action, entity, entity_id, booking_id, before_state, after_state, ip, user_agent, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            actor_type,
            actor_id,
            action,
            entity,
            entity_id,
            booking_id,
            before.map(|v| v.to_string()),
            after.to_string(),
            ip,
            user_agent,
            fmt_ts(created_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_audit_logs_for_booking(
    conn: &Connection,
    booking_id: &str,
) -> rusqlite::Result<Vec<AuditLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, actor_type, actor_id, action, entity, entity_id, booking_id,
                before_state, after_state, ip, user_agent, created_at
         FROM audit_logs WHERE booking_id = ?1
         ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![booking_id], |row| {
        Ok(AuditLogEntry {
            id: row.get(0)?,
            actor_type: row.get(1)?,
            actor_id: row.get(2)?,
            action: row.get(3)?,
            entity: row.get(4)?,
            entity_id: row.get(5)?,
            booking_id: row.get(6)?,
            before: json_col(row, 7)?,
            after: json_col(row, 8)?,
            ip: row.get(9)?,
            user_agent: row.get(10)?,
            created_at: ts_col(row, 11)?,
        })
    })?;

    rows.collect()
}

pub fn count_audit_logs(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM audit_logs", [], |row| row.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{PaymentStatus, PricingType};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 10, 1, 0, 0).unwrap()
    }

    fn facility(id: &str) -> Facility {
        Facility {
            id: id.to_string(),
            name: "Main Hall".to_string(),
            pricing_type: PricingType::PerHour,
            base_price: dec!(50000),
            min_duration: Some(60),
            rules: None,
            is_deleted: false,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn customer(id: &str, nik: &str, name: &str) -> Customer {
        Customer {
            id: id.to_string(),
            nik: nik.to_string(),
            full_name: name.to_string(),
            phone: "0812".to_string(),
            email: None,
            address: None,
            created_at: now(),
        }
    }

    fn booking(id: &str, code: &str, customer_id: &str, hours: (u32, u32)) -> Booking {
        let wib = FixedOffset::east_opt(7 * 3600).unwrap();
        Booking {
            id: id.to_string(),
            booking_code: code.to_string(),
            customer_id: customer_id.to_string(),
            facility_id: "f-1".to_string(),
            booking_date: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
            start_time: Some(wib.with_ymd_and_hms(2030, 1, 15, hours.0, 0, 0).unwrap()),
            end_time: Some(wib.with_ymd_and_hms(2030, 1, 15, hours.1, 0, 0).unwrap()),
            participants: 1,
            purpose: None,
            status: BookingStatus::New,
            total_amount: dec!(100000),
            currency: "IDR".to_string(),
            source: "WEB".to_string(),
            admin_note: None,
            verification_method: "NONE".to_string(),
            verified_at: None,
            is_deleted: false,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_facility_round_trip_with_rules() {
        let conn = db::init_db(":memory:").unwrap();
        insert_facility(&conn, &facility("f-1")).unwrap();
        assert!(get_facility(&conn, "f-1").unwrap().unwrap().rules.is_none());

        let rules = BookingRules {
            booking_window_days: Some(30),
            advance_notice_hours: None,
            max_participants: Some(10),
        };
        upsert_booking_rules(&conn, "f-1", &rules).unwrap();

        let loaded = get_facility(&conn, "f-1").unwrap().unwrap();
        assert_eq!(loaded.rules, Some(rules));
        assert_eq!(loaded.base_price, dec!(50000));
        assert_eq!(loaded.pricing_type, PricingType::PerHour);

        assert_eq!(soft_delete_facility(&conn, "f-1", &now()).unwrap(), 1);
        assert!(get_facility(&conn, "f-1").unwrap().unwrap().is_deleted);
        assert_eq!(soft_delete_facility(&conn, "f-1", &now()).unwrap(), 0);
    }

    #[test]
    fn test_upsert_customer_keeps_id_and_phone() {
        let conn = db::init_db(":memory:").unwrap();
        let first = upsert_customer(&conn, &customer("c-1", "3201", "Ana")).unwrap();

        let mut again = customer("c-2", "3201", "Ana Maria");
        again.phone = "0899".to_string();
        again.email = Some("ana@example.com".to_string());
        let second = upsert_customer(&conn, &again).unwrap();

        assert_eq!(first, "c-1");
        assert_eq!(second, "c-1");
        let stored = get_customer(&conn, "c-1").unwrap().unwrap();
        assert_eq!(stored.full_name, "Ana Maria");
        assert_eq!(stored.phone, "0812");
        assert_eq!(stored.email.as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn test_active_scan_skips_cancelled_and_excluded() {
        let conn = db::init_db(":memory:").unwrap();
        insert_facility(&conn, &facility("f-1")).unwrap();
        upsert_customer(&conn, &customer("c-1", "3201", "Ana")).unwrap();
        insert_booking(&conn, &booking("b-1", "BK1", "c-1", (9, 11))).unwrap();
        insert_booking(&conn, &booking("b-2", "BK2", "c-1", (13, 15))).unwrap();
        insert_booking(&conn, &booking("b-3", "BK3", "c-1", (16, 17))).unwrap();
        update_booking_status(&conn, "b-3", BookingStatus::Cancelled, None, &now()).unwrap();

        let date = NaiveDate::from_ymd_opt(2030, 1, 15).unwrap();
        let all = list_active_bookings_on(&conn, "f-1", date, None).unwrap();
        let ids: Vec<_> = all.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b-1", "b-2"]);
        assert_eq!(all[0].customer_nik, "3201");

        let without = list_active_bookings_on(&conn, "f-1", date, Some("b-1")).unwrap();
        assert_eq!(without.len(), 1);
        assert_eq!(without[0].id, "b-2");
    }

    #[test]
    fn test_calendar_range_keeps_cancelled_and_filters_facility() {
        let conn = db::init_db(":memory:").unwrap();
        insert_facility(&conn, &facility("f-1")).unwrap();
        let mut other = facility("f-2");
        other.name = "Court".to_string();
        insert_facility(&conn, &other).unwrap();
        upsert_customer(&conn, &customer("c-1", "3201", "Ana")).unwrap();

        insert_booking(&conn, &booking("b-1", "BK1", "c-1", (13, 15))).unwrap();
        insert_booking(&conn, &booking("b-2", "BK2", "c-1", (9, 11))).unwrap();
        update_booking_status(&conn, "b-2", BookingStatus::Cancelled, None, &now()).unwrap();
        let mut elsewhere = booking("b-3", "BK3", "c-1", (9, 10));
        elsewhere.facility_id = "f-2".to_string();
        insert_booking(&conn, &elsewhere).unwrap();

        let day = NaiveDate::from_ymd_opt(2030, 1, 15).unwrap();
        let all = list_bookings_between(&conn, day, day, None).unwrap();
        assert_eq!(all.len(), 3);

        let hall = list_bookings_between(&conn, day, day, Some("f-1")).unwrap();
        let ids: Vec<_> = hall.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b-2", "b-1"]);
        assert_eq!(hall[0].status, BookingStatus::Cancelled);
        assert_eq!(hall[0].customer_name, "Ana");
        assert_eq!(hall[0].facility_name, "Main Hall");

        let next = day.succ_opt().unwrap();
        assert!(list_bookings_between(&conn, next, next, None).unwrap().is_empty());
    }

    #[test]
    fn test_contact_logs_list_newest_first() {
        use crate::models::{ContactChannel, ContactDirection};

        let conn = db::init_db(":memory:").unwrap();
        insert_facility(&conn, &facility("f-1")).unwrap();
        upsert_customer(&conn, &customer("c-1", "3201", "Ana")).unwrap();
        insert_booking(&conn, &booking("b-1", "BK1", "c-1", (9, 11))).unwrap();

        for (id, minutes) in [("cl-1", 0), ("cl-2", 3)] {
            insert_contact_log(
                &conn,
                &ContactLog {
                    id: id.to_string(),
                    booking_id: "b-1".to_string(),
                    customer_id: "c-1".to_string(),
                    admin_id: "adm-1".to_string(),
                    channel: ContactChannel::Whatsapp,
                    direction: ContactDirection::Out,
                    message_summary: "confirming the schedule".to_string(),
                    created_at: now() + chrono::Duration::minutes(minutes),
                },
            )
            .unwrap();
        }

        let logs = list_contact_logs(&conn, "b-1").unwrap();
        assert_eq!(logs[0].id, "cl-2");
        assert_eq!(logs[1].id, "cl-1");
        assert_eq!(logs[0].channel, ContactChannel::Whatsapp);
        assert!(list_contact_logs(&conn, "b-2").unwrap().is_empty());
    }

    #[test]
    fn test_booking_code_is_unique() {
        let conn = db::init_db(":memory:").unwrap();
        insert_facility(&conn, &facility("f-1")).unwrap();
        upsert_customer(&conn, &customer("c-1", "3201", "Ana")).unwrap();
        insert_booking(&conn, &booking("b-1", "BK1", "c-1", (9, 11))).unwrap();
        assert!(insert_booking(&conn, &booking("b-2", "BK1", "c-1", (13, 15))).is_err());
    }

    #[test]
    fn test_ledger_is_append_only_and_newest_first() {
        let conn = db::init_db(":memory:").unwrap();
        insert_facility(&conn, &facility("f-1")).unwrap();
        upsert_customer(&conn, &customer("c-1", "3201", "Ana")).unwrap();
        insert_booking(&conn, &booking("b-1", "BK1", "c-1", (9, 11))).unwrap();
        let payment = Payment {
            id: "p-1".to_string(),
            booking_id: "b-1".to_string(),
            status: PaymentStatus::Pending,
            total_due: dec!(100000),
            total_paid: dec!(0),
            last_transaction_at: None,
        };
        insert_payment(&conn, &payment, &now()).unwrap();

        for (id, ty, minutes) in [("t-1", "DP", 0), ("t-2", "PAID", 5)] {
            let at = now() + chrono::Duration::minutes(minutes);
            insert_payment_transaction(
                &conn,
                &PaymentTransaction {
                    id: id.to_string(),
                    booking_id: "b-1".to_string(),
                    payment_id: "p-1".to_string(),
                    amount: dec!(50000),
                    tx_type: ty.parse().unwrap(),
                    method: crate::models::PaymentMethod::Cash,
                    status: "RECORDED".to_string(),
                    paid_at: at,
                    notes: None,
                    created_at: at,
                },
            )
            .unwrap();
        }

        let ledger = list_payment_transactions(&conn, "b-1").unwrap();
        assert_eq!(ledger[0].id, "t-2");
        assert_eq!(ledger[1].id, "t-1");

        assert!(conn
            .execute("UPDATE payment_transactions SET amount = '1'", [])
            .is_err());
        assert!(conn.execute("DELETE FROM payment_transactions", []).is_err());
    }
}

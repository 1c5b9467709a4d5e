//! Admin status transitions: approve, complete, cancel.
//!
//! Each one re-reads the booking inside its own immediate transaction and
//! checks [`BookingStatus::can_transition`] against that fresh status, so two
//! concurrent calls cannot both move the same booking.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::audit::{
    BookingStatusState, PaymentState, PaymentUpdatedState, StatusChangedState, TransactionState,
};
use crate::models::payment::TRANSACTION_RECORDED;
use crate::models::{
    AuditContext, AuditEvent, Booking, BookingStatus, Payment, PaymentMethod, PaymentStatus,
    PaymentTransaction, TransactionType,
};

use super::audit;
use super::booking::{non_empty, validation, BookingOutcome};
use super::pricing::{decimal_from_json, money_epsilon, round_money};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub dp_amount: Option<Value>,
    pub total_amount: Option<Value>,
    pub payment_method: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub remaining_amount: Option<Value>,
    pub payment_method: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub reason: Option<String>,
}

const SETTLEMENT_NOTE: &str = "Settled on booking completion";

fn parse_method(raw: &Option<String>) -> Result<Option<PaymentMethod>, AppError> {
    non_empty(raw)
        .map(|m| m.parse::<PaymentMethod>().map_err(|_| validation("invalid paymentMethod")))
        .transpose()
}

fn load_for_transition(
    tx: &Transaction<'_>,
    booking_id: &str,
    next: BookingStatus,
) -> Result<Booking, AppError> {
    let current = queries::get_booking(tx, booking_id)?
        .ok_or_else(|| AppError::NotFound("booking not found".into()))?;

    if !current.status.can_transition(next) {
        return Err(validation(format!(
            "cannot change booking status from {} to {}",
            current.status.as_str(),
            next.as_str()
        )));
    }

    Ok(current)
}

fn require_payment(tx: &Transaction<'_>, booking_id: &str) -> Result<Payment, AppError> {
    queries::get_payment_for_booking(tx, booking_id)?
        .ok_or_else(|| validation("no payment record found for this booking"))
}

fn append_transaction(
    tx: &Transaction<'_>,
    payment: &Payment,
    amount: Decimal,
    tx_type: TransactionType,
    method: PaymentMethod,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<PaymentTransaction, AppError> {
    let entry = PaymentTransaction {
        id: Uuid::new_v4().to_string(),
        booking_id: payment.booking_id.clone(),
        payment_id: payment.id.clone(),
        amount,
        tx_type,
        method,
        status: TRANSACTION_RECORDED.to_string(),
        paid_at: now,
        notes,
        created_at: now,
    };
    queries::insert_payment_transaction(tx, &entry)?;
    Ok(entry)
}

fn status_changed(
    booking: &Booking,
    note: Option<&str>,
    settled_amount: Option<Decimal>,
    ctx: &AuditContext,
    now: DateTime<Utc>,
) -> StatusChangedState {
    StatusChangedState {
        state: BookingStatusState::from(booking),
        note: note.map(str::to_string),
        settled_amount,
        changed_at: now,
        changed_by: ctx.actor_ref(),
    }
}

/// `old`, a separator line, then `new`. Either side may be missing.
fn merge_notes(existing: Option<&str>, note: Option<&str>) -> Option<String> {
    match (existing, note) {
        (Some(old), Some(new)) => Some(format!("{old}\n---\n{new}")),
        (old, new) => new.or(old).map(str::to_string),
    }
}

// ── Approve ──

pub fn approve(
    conn: &mut Connection,
    now: DateTime<Utc>,
    ctx: &AuditContext,
    booking_id: &str,
    req: &ApproveRequest,
) -> Result<BookingOutcome, AppError> {
    let amounts = (
        req.dp_amount.as_ref().and_then(decimal_from_json),
        req.total_amount.as_ref().and_then(decimal_from_json),
    );
    let (Some(dp), Some(total)) = amounts else {
        return Err(validation("dpAmount and totalAmount must be numbers greater than 0"));
    };
    let (dp, total) = (round_money(dp), round_money(total));
    if dp <= Decimal::ZERO || total <= Decimal::ZERO {
        return Err(validation("dpAmount and totalAmount must be numbers greater than 0"));
    }
    if dp > total {
        return Err(validation("dpAmount cannot exceed totalAmount"));
    }
    let method = parse_method(&req.payment_method)?.unwrap_or(PaymentMethod::TransferManual);
    let note = non_empty(&req.note);

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let current = load_for_transition(&tx, booking_id, BookingStatus::Confirmed)?;
    let payment_before = require_payment(&tx, booking_id)?;

    let booking = Booking {
        status: BookingStatus::Confirmed,
        admin_note: note.map(str::to_string).or_else(|| current.admin_note.clone()),
        updated_at: now,
        ..current.clone()
    };
    queries::update_booking_status(&tx, &booking.id, booking.status, booking.admin_note.as_deref(), &now)?;

    let payment = Payment {
        status: PaymentStatus::Dp,
        total_due: total,
        total_paid: dp,
        last_transaction_at: Some(now),
        ..payment_before.clone()
    };
    queries::update_payment(&tx, &payment, &now)?;

    let entry = append_transaction(
        &tx,
        &payment,
        dp,
        TransactionType::Dp,
        method,
        note.map(str::to_string),
        now,
    )?;

    let events = [
        AuditEvent::BookingApprove {
            before: BookingStatusState::from(&current),
            after: status_changed(&booking, note, Some(dp), ctx, now),
        },
        AuditEvent::PaymentUpdate {
            before: PaymentState::from(&payment_before),
            after: PaymentUpdatedState {
                state: PaymentState::from(&payment),
                context: "down payment recorded on approval",
            },
        },
        AuditEvent::PaymentTransactionCreate {
            after: TransactionState::new(&entry, ctx.actor_ref()),
        },
    ];
    for event in &events {
        audit::record(&tx, ctx, Some(&booking.id), event, now)?;
    }

    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        dp_amount = %dp,
        total_amount = %total,
        "booking approved"
    );

    Ok(BookingOutcome {
        booking,
        payment: Some(payment),
        transaction: Some(entry),
    })
}

// ── Complete ──

pub fn complete(
    conn: &mut Connection,
    now: DateTime<Utc>,
    ctx: &AuditContext,
    booking_id: &str,
    req: &CompleteRequest,
) -> Result<BookingOutcome, AppError> {
    let paid_input = req
        .remaining_amount
        .as_ref()
        .filter(|v| !v.is_null())
        .map(|v| decimal_from_json(v).ok_or_else(|| validation("remainingAmount must be a number")))
        .transpose()?;
    let method = parse_method(&req.payment_method)?.unwrap_or(PaymentMethod::Cash);
    let note = non_empty(&req.note);

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let current = load_for_transition(&tx, booking_id, BookingStatus::Completed)?;
    let payment_before = require_payment(&tx, booking_id)?;

    let remaining = round_money(payment_before.total_due - payment_before.total_paid);
    let mut events = Vec::with_capacity(3);
    let mut payment = payment_before.clone();
    let mut entry = None;

    if remaining > money_epsilon() {
        let Some(paid) = paid_input else {
            return Err(validation(format!(
                "outstanding balance of {remaining} must be settled: send remainingAmount"
            )));
        };
        if (paid - remaining).abs() > money_epsilon() {
            return Err(validation(format!(
                "payment amount does not match the outstanding balance of {remaining}"
            )));
        }

        let settled = append_transaction(
            &tx,
            &payment_before,
            round_money(paid),
            TransactionType::Paid,
            method,
            Some(note.unwrap_or(SETTLEMENT_NOTE).to_string()),
            now,
        )?;

        payment = Payment {
            status: PaymentStatus::Paid,
            total_paid: payment_before.total_due,
            last_transaction_at: Some(now),
            ..payment_before.clone()
        };
        queries::update_payment(&tx, &payment, &now)?;

        events.push(AuditEvent::PaymentTransactionCreate {
            after: TransactionState::new(&settled, ctx.actor_ref()),
        });
        events.push(AuditEvent::PaymentUpdate {
            before: PaymentState::from(&payment_before),
            after: PaymentUpdatedState {
                state: PaymentState::from(&payment),
                context: "balance settled on completion",
            },
        });
        entry = Some(settled);
    }

    let booking = Booking {
        status: BookingStatus::Completed,
        admin_note: merge_notes(current.admin_note.as_deref(), note),
        updated_at: now,
        ..current.clone()
    };
    queries::update_booking_status(&tx, &booking.id, booking.status, booking.admin_note.as_deref(), &now)?;

    events.push(AuditEvent::BookingComplete {
        before: BookingStatusState::from(&current),
        after: status_changed(&booking, note, entry.as_ref().map(|e| e.amount), ctx, now),
    });
    for event in &events {
        audit::record(&tx, ctx, Some(&booking.id), event, now)?;
    }

    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        settled = entry.is_some(),
        "booking completed"
    );

    Ok(BookingOutcome {
        booking,
        payment: Some(payment),
        transaction: entry,
    })
}

// ── Cancel ──

pub fn cancel(
    conn: &mut Connection,
    now: DateTime<Utc>,
    ctx: &AuditContext,
    booking_id: &str,
    req: &CancelRequest,
) -> Result<BookingOutcome, AppError> {
    let reason = non_empty(&req.reason);

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let current = load_for_transition(&tx, booking_id, BookingStatus::Cancelled)?;
    let booking = Booking {
        status: BookingStatus::Cancelled,
        admin_note: reason.map(str::to_string).or_else(|| current.admin_note.clone()),
        updated_at: now,
        ..current.clone()
    };
    queries::update_booking_status(&tx, &booking.id, booking.status, booking.admin_note.as_deref(), &now)?;

    audit::record(
        &tx,
        ctx,
        Some(&booking.id),
        &AuditEvent::BookingCancel {
            before: BookingStatusState::from(&current),
            after: status_changed(&booking, reason, None, ctx, now),
        },
        now,
    )?;

    let payment = queries::get_payment_for_booking(&tx, &booking.id)?;
    tx.commit()?;

    tracing::info!(booking_id = %booking.id, from = current.status.as_str(), "booking cancelled");

    Ok(BookingOutcome {
        booking,
        payment,
        transaction: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db;
    use crate::models::{ActorType, Facility, PricingType};
    use crate::services::booking::{create_booking, CustomerInput, NewBookingRequest};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 10, 1, 0, 0).unwrap()
    }

    fn admin() -> AuditContext {
        AuditContext {
            actor_type: ActorType::Admin,
            actor_id: Some("adm-1".to_string()),
            actor_name: Some("ops".to_string()),
            ip: None,
            user_agent: None,
        }
    }

    fn setup() -> (Connection, String) {
        let mut conn = db::init_db(":memory:").unwrap();
        queries::insert_facility(
            &conn,
            &Facility {
                id: "f-1".to_string(),
                name: "Main Hall".to_string(),
                pricing_type: PricingType::PerHour,
                base_price: dec!(50000),
                min_duration: None,
                rules: None,
                is_deleted: false,
                created_at: now(),
                updated_at: now(),
            },
        )
        .unwrap();

        let req = NewBookingRequest {
            customer: Some(CustomerInput {
                full_name: Some("Ana".into()),
                phone: Some("0812".into()),
                nik: Some("3201".into()),
                ..Default::default()
            }),
            facility_id: Some("f-1".into()),
            booking_date: Some("2030-01-15".into()),
            start_time: Some("2030-01-15T09:00:00+07:00".into()),
            end_time: Some("2030-01-15T11:00:00+07:00".into()),
            ..Default::default()
        };
        let ctx = AuditContext {
            actor_type: ActorType::Customer,
            actor_id: None,
            actor_name: None,
            ip: None,
            user_agent: None,
        };
        let (created, _) = create_booking(&mut conn, &AppConfig::for_tests(), now(), &ctx, &req).unwrap();
        (conn, created.booking.id)
    }

    fn approve_req(dp: Value, total: Value) -> ApproveRequest {
        ApproveRequest {
            dp_amount: Some(dp),
            total_amount: Some(total),
            ..Default::default()
        }
    }

    #[test]
    fn test_approve_records_down_payment() {
        let (mut conn, id) = setup();
        let out = approve(&mut conn, now(), &admin(), &id, &approve_req(json!(50000), json!(100000))).unwrap();

        assert_eq!(out.booking.status, BookingStatus::Confirmed);
        let payment = out.payment.unwrap();
        assert_eq!(payment.status, PaymentStatus::Dp);
        assert_eq!(payment.total_paid, dec!(50000));
        assert_eq!(payment.total_due, dec!(100000));
        let entry = out.transaction.unwrap();
        assert_eq!(entry.tx_type, TransactionType::Dp);
        assert_eq!(entry.method, PaymentMethod::TransferManual);

        let actions: Vec<String> = queries::list_audit_logs_for_booking(&conn, &id)
            .unwrap()
            .into_iter()
            .map(|l| l.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                "BOOKING_CREATE",
                "PAYMENT_INIT",
                "BOOKING_APPROVE",
                "PAYMENT_UPDATE",
                "PAYMENT_TRANSACTION_CREATE"
            ]
        );
    }

    #[test]
    fn test_approve_rejects_bad_amounts() {
        let (mut conn, id) = setup();
        for (dp, total) in [
            (json!(0), json!(100000)),
            (json!(60000), json!(50000)),
            (json!("abc"), json!(100000)),
            (json!(null), json!(100000)),
        ] {
            let err = approve(&mut conn, now(), &admin(), &id, &approve_req(dp, total)).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{err}");
        }
        let stored = queries::get_booking(&conn, &id).unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::New);
    }

    #[test]
    fn test_second_approve_fails_on_fresh_status() {
        let (mut conn, id) = setup();
        approve(&mut conn, now(), &admin(), &id, &approve_req(json!(50000), json!(100000))).unwrap();
        let err = approve(&mut conn, now(), &admin(), &id, &approve_req(json!(50000), json!(100000))).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_complete_from_new_is_rejected() {
        let (mut conn, id) = setup();
        let err = complete(&mut conn, now(), &admin(), &id, &CompleteRequest::default()).unwrap_err();
        assert_eq!(err.to_string(), "cannot change booking status from NEW to COMPLETED");
    }

    #[test]
    fn test_complete_requires_matching_balance() {
        let (mut conn, id) = setup();
        approve(&mut conn, now(), &admin(), &id, &approve_req(json!(50000), json!(100000))).unwrap();

        let missing = complete(&mut conn, now(), &admin(), &id, &CompleteRequest::default());
        assert!(matches!(missing, Err(AppError::Validation(_))));

        let wrong = CompleteRequest {
            remaining_amount: Some(json!(40000)),
            ..Default::default()
        };
        assert!(matches!(
            complete(&mut conn, now(), &admin(), &id, &wrong),
            Err(AppError::Validation(_))
        ));

        let bad_method = CompleteRequest {
            remaining_amount: Some(json!(50000)),
            payment_method: Some("CHEQUE".into()),
            ..Default::default()
        };
        assert!(matches!(
            complete(&mut conn, now(), &admin(), &id, &bad_method),
            Err(AppError::Validation(_))
        ));

        let ok = CompleteRequest {
            remaining_amount: Some(json!(50000.004)),
            note: Some("paid at front desk".into()),
            ..Default::default()
        };
        let out = complete(&mut conn, now(), &admin(), &id, &ok).unwrap();
        assert_eq!(out.booking.status, BookingStatus::Completed);
        let payment = out.payment.unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(payment.total_paid, dec!(100000));
        let entry = out.transaction.unwrap();
        assert_eq!(entry.method, PaymentMethod::Cash);
        assert_eq!(entry.amount, dec!(50000));
    }

    #[test]
    fn test_complete_without_balance_skips_ledger() {
        let (mut conn, id) = setup();
        approve(&mut conn, now(), &admin(), &id, &approve_req(json!(100000), json!(100000))).unwrap();

        let out = complete(&mut conn, now(), &admin(), &id, &CompleteRequest::default()).unwrap();
        assert!(out.transaction.is_none());
        assert_eq!(out.payment.unwrap().status, PaymentStatus::Dp);
        assert_eq!(queries::list_payment_transactions(&conn, &id).unwrap().len(), 1);
    }

    #[test]
    fn test_cancel_is_terminal() {
        let (mut conn, id) = setup();
        let out = cancel(
            &mut conn,
            now(),
            &admin(),
            &id,
            &CancelRequest {
                reason: Some("customer request".into()),
            },
        )
        .unwrap();
        assert_eq!(out.booking.status, BookingStatus::Cancelled);
        assert_eq!(out.booking.admin_note.as_deref(), Some("customer request"));

        assert!(cancel(&mut conn, now(), &admin(), &id, &CancelRequest::default()).is_err());
        assert!(approve(&mut conn, now(), &admin(), &id, &approve_req(json!(1), json!(1))).is_err());
    }

    #[test]
    fn test_merge_notes() {
        assert_eq!(merge_notes(Some("a"), Some("b")).as_deref(), Some("a\n---\nb"));
        assert_eq!(merge_notes(None, Some("b")).as_deref(), Some("b"));
        assert_eq!(merge_notes(Some("a"), None).as_deref(), Some("a"));
        assert_eq!(merge_notes(None, None), None);
    }
}

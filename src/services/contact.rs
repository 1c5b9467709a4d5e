use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::audit::ContactStartedState;
use crate::models::{AuditContext, AuditEvent, ContactChannel, ContactDirection, ContactLog};

use super::audit;
use super::booking::non_empty;

const DEFAULT_SUMMARY: &str = "staff started a WhatsApp conversation to verify or coordinate the booking";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    pub message_summary: Option<String>,
}

/// Records that staff opened a WhatsApp conversation with the booking's
/// customer. The log row and its audit entry commit together.
pub fn start_whatsapp(
    conn: &mut Connection,
    now: DateTime<Utc>,
    ctx: &AuditContext,
    booking_id: &str,
    req: &ContactRequest,
) -> Result<ContactLog, AppError> {
    let admin_id = ctx
        .actor_id
        .clone()
        .ok_or_else(|| AppError::Unauthorized("staff identity required".into()))?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let booking = queries::get_booking(&tx, booking_id)?
        .ok_or_else(|| AppError::NotFound("booking not found".into()))?;

    let log = ContactLog {
        id: Uuid::new_v4().to_string(),
        booking_id: booking.id.clone(),
        customer_id: booking.customer_id.clone(),
        admin_id,
        channel: ContactChannel::Whatsapp,
        direction: ContactDirection::Out,
        message_summary: non_empty(&req.message_summary)
            .unwrap_or(DEFAULT_SUMMARY)
            .to_string(),
        created_at: now,
    };
    queries::insert_contact_log(&tx, &log)?;

    let event = AuditEvent::ContactWhatsappStart {
        after: ContactStartedState {
            contact_log_id: log.id.clone(),
            booking_code: booking.booking_code.clone(),
            facility_id: booking.facility_id.clone(),
            channel: log.channel,
            direction: log.direction,
            initiated_by: ctx.actor_ref(),
            started_at: now,
        },
    };
    audit::record(&tx, ctx, Some(&booking.id), &event, now)?;

    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        booking_code = %booking.booking_code,
        contact_log_id = %log.id,
        admin_id = %log.admin_id,
        "whatsapp contact started"
    );

    Ok(log)
}

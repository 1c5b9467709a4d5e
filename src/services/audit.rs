//! Audit recording.
//!
//! [`record`] is the primary channel and must be called on the same
//! transaction as the mutation it describes. [`record_failure`] is a lossy
//! secondary channel for unexpected errors: it writes outside any
//! transaction and only logs if the write itself fails.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{AuditContext, AuditEvent};
use crate::models::audit::FailureState;

pub fn record(
    conn: &Connection,
    ctx: &AuditContext,
    booking_id: Option<&str>,
    event: &AuditEvent,
    at: DateTime<Utc>,
) -> Result<i64, AppError> {
    let before = event.before_json()?;
    let after = event.after_json()?;

    let id = queries::insert_audit_log(
        conn,
        ctx.actor_type.as_str(),
        ctx.actor_id.as_deref(),
        event.action(),
        event.entity(),
        event.entity_id(),
        booking_id,
        before.as_ref(),
        &after,
        ctx.ip.as_deref(),
        ctx.user_agent.as_deref(),
        &at,
    )?;

    Ok(id)
}

/// Best-effort record of an operation that failed unexpectedly.
pub fn record_failure(
    db: &Mutex<Connection>,
    ctx: &AuditContext,
    attempted_action: &'static str,
    entity: &'static str,
    entity_id: Option<&str>,
    error: &AppError,
    at: DateTime<Utc>,
) {
    if !error.is_internal() {
        return;
    }

    let booking_id = (entity == "booking").then_some(entity_id).flatten();
    let event = AuditEvent::OperationFailed {
        entity,
        entity_id: entity_id.map(str::to_string),
        after: FailureState {
            attempted_action,
            error: error.to_string(),
        },
    };

    let conn = match db.lock() {
        Ok(conn) => conn,
        Err(_) => {
            tracing::warn!(action = attempted_action, "failure audit skipped: database lock poisoned");
            return;
        }
    };

    if let Err(e) = record(&conn, ctx, booking_id, &event, at) {
        tracing::warn!(action = attempted_action, error = %e, "failed to write failure audit");
    }
}

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use crate::auth::{self, RequestMeta, BOOKING_ROLES};
use crate::errors::AppError;
use crate::services::agenda::{self, CalendarQuery};
use crate::services::booking::{self, NewBookingRequest, RescheduleRequest};
use crate::services::contact::{self, ContactRequest};
use crate::services::notify;
use crate::services::transitions::{self, ApproveRequest, CancelRequest, CompleteRequest};
use crate::state::AppState;

use super::{audit_failure, JsonBody};

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<NewBookingRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let ctx = RequestMeta::from_headers(&headers).customer_context();
    let now = state.now();

    let result = state
        .conn()
        .and_then(|mut conn| booking::create_booking(&mut conn, &state.config, now, &ctx, &req));
    let (created, event) = result.map_err(audit_failure(&state, &ctx, "BOOKING_CREATE", "booking", None, now))?;

    notify::publish(&state.events, event);

    let b = &created.booking;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "booking created, awaiting admin verification",
            "data": {
                "id": b.id,
                "bookingCode": b.booking_code,
                "bookingDate": b.booking_date,
                "status": b.status,
                "totalAmount": b.total_amount,
                "currency": b.currency,
            }
        })),
    ))
}

pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let actor = auth::authenticate(&headers, &state.config.auth_secret)?;
    actor.require_role(BOOKING_ROLES)?;

    let detail = {
        let conn = state.conn()?;
        booking::load_detail(&conn, &id)?
    };

    Ok(Json(json!({ "data": detail })))
}

pub async fn reschedule_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<RescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = auth::authenticate(&headers, &state.config.auth_secret)?;
    actor.require_role(BOOKING_ROLES)?;
    let ctx = actor.audit_context(&RequestMeta::from_headers(&headers));
    let now = state.now();

    let result = state
        .conn()
        .and_then(|mut conn| booking::reschedule_booking(&mut conn, &state.config, now, &ctx, &id, &req));
    let (outcome, event) =
        result.map_err(audit_failure(&state, &ctx, "BOOKING_RESCHEDULE", "booking", Some(&id), now))?;

    notify::publish(&state.events, event);

    Ok(Json(json!({
        "message": "booking schedule updated",
        "data": outcome,
    })))
}

pub async fn approve_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<ApproveRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = auth::authenticate(&headers, &state.config.auth_secret)?;
    actor.require_role(BOOKING_ROLES)?;
    let ctx = actor.audit_context(&RequestMeta::from_headers(&headers));
    let now = state.now();

    let result = state
        .conn()
        .and_then(|mut conn| transitions::approve(&mut conn, now, &ctx, &id, &req));
    let outcome = result.map_err(audit_failure(&state, &ctx, "BOOKING_APPROVE", "booking", Some(&id), now))?;

    Ok(Json(json!({
        "message": "booking approved",
        "data": outcome,
    })))
}

pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<CompleteRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = auth::authenticate(&headers, &state.config.auth_secret)?;
    actor.require_role(BOOKING_ROLES)?;
    let ctx = actor.audit_context(&RequestMeta::from_headers(&headers));
    let now = state.now();

    let result = state
        .conn()
        .and_then(|mut conn| transitions::complete(&mut conn, now, &ctx, &id, &req));
    let outcome = result.map_err(audit_failure(&state, &ctx, "BOOKING_COMPLETE", "booking", Some(&id), now))?;

    Ok(Json(json!({
        "message": "booking completed",
        "data": outcome,
    })))
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<CancelRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = auth::authenticate(&headers, &state.config.auth_secret)?;
    actor.require_role(BOOKING_ROLES)?;
    let ctx = actor.audit_context(&RequestMeta::from_headers(&headers));
    let now = state.now();

    let result = state
        .conn()
        .and_then(|mut conn| transitions::cancel(&mut conn, now, &ctx, &id, &req));
    let outcome = result.map_err(audit_failure(&state, &ctx, "BOOKING_CANCEL", "booking", Some(&id), now))?;

    Ok(Json(json!({
        "message": "booking cancelled",
        "data": outcome,
    })))
}

pub async fn start_whatsapp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<ContactRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = auth::authenticate(&headers, &state.config.auth_secret)?;
    actor.require_role(BOOKING_ROLES)?;
    let ctx = actor.audit_context(&RequestMeta::from_headers(&headers));
    let now = state.now();

    let result = state
        .conn()
        .and_then(|mut conn| contact::start_whatsapp(&mut conn, now, &ctx, &id, &req));
    let log = result.map_err(audit_failure(&state, &ctx, "CONTACT_WHATSAPP_START", "contactLog", None, now))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "whatsapp contact logged for this booking",
            "data": log,
        })),
    ))
}

pub async fn calendar(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Value>, AppError> {
    let actor = auth::authenticate(&headers, &state.config.auth_secret)?;
    actor.require_role(BOOKING_ROLES)?;

    let view = {
        let conn = state.conn()?;
        agenda::load_calendar(&conn, state.now(), state.config.business_offset, &query)?
    };

    Ok(Json(json!({ "data": view })))
}

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use crate::auth::{self, RequestMeta, ADMIN_ONLY};
use crate::errors::AppError;
use crate::services::facilities::{self, NewFacilityRequest, PriceEntryRequest};
use crate::state::AppState;

use super::{audit_failure, JsonBody};

pub async fn create_facility(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<NewFacilityRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = auth::authenticate(&headers, &state.config.auth_secret)?;
    actor.require_role(ADMIN_ONLY)?;
    let ctx = actor.audit_context(&RequestMeta::from_headers(&headers));
    let now = state.now();

    let result = state.conn().and_then(|mut conn| {
        facilities::create_facility(&mut conn, state.config.business_offset, now, &ctx, &req)
    });
    let (facility, prices) = result.map_err(audit_failure(&state, &ctx, "FACILITY_CREATE", "facility", None, now))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "facility created",
            "data": { "facility": facility, "priceLists": prices },
        })),
    ))
}

pub async fn add_price(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<PriceEntryRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = auth::authenticate(&headers, &state.config.auth_secret)?;
    actor.require_role(ADMIN_ONLY)?;
    let ctx = actor.audit_context(&RequestMeta::from_headers(&headers));
    let now = state.now();

    let result = state.conn().and_then(|mut conn| {
        facilities::add_price_entry(&mut conn, state.config.business_offset, now, &ctx, &id, &req)
    });
    let entry = result.map_err(audit_failure(&state, &ctx, "PRICE_LIST_CREATE", "priceList", None, now))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "price list entry added", "data": entry })),
    ))
}

pub async fn delete_facility(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let actor = auth::authenticate(&headers, &state.config.auth_secret)?;
    actor.require_role(ADMIN_ONLY)?;
    let ctx = actor.audit_context(&RequestMeta::from_headers(&headers));
    let now = state.now();

    let result = state
        .conn()
        .and_then(|mut conn| facilities::delete_facility(&mut conn, now, &ctx, &id));
    let facility = result.map_err(audit_failure(&state, &ctx, "FACILITY_DELETE", "facility", Some(&id), now))?;

    Ok(Json(json!({ "message": "facility deleted", "data": facility })))
}

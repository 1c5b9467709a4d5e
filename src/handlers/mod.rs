pub mod bookings;
pub mod facilities;
pub mod health;

use std::sync::Arc;

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::routing::{delete, get, post, put};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::errors::AppError;
use crate::models::AuditContext;
use crate::services::audit;
use crate::state::AppState;

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/bookings", post(bookings::create_booking))
        .route("/api/bookings/:id", get(bookings::get_booking))
        .route("/api/bookings/:id/schedule", put(bookings::reschedule_booking))
        .route("/api/bookings/:id/approve", put(bookings::approve_booking))
        .route("/api/bookings/:id/complete", put(bookings::complete_booking))
        .route("/api/bookings/:id/cancel", put(bookings::cancel_booking))
        .route("/api/bookings/:id/contact/whatsapp", post(bookings::start_whatsapp))
        .route("/api/calendar", get(bookings::calendar))
        .route("/api/facilities", post(facilities::create_facility))
        .route("/api/facilities/:id", delete(facilities::delete_facility))
        .route("/api/facilities/:id/prices", post(facilities::add_price))
        .with_state(state)
}

/// JSON body where an empty body means "no fields given". Parse failures
/// answer 400 with the usual error shape.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(JsonBody(T::default()));
        }

        serde_json::from_slice(&bytes)
            .map(JsonBody)
            .map_err(|e| AppError::Validation(format!("invalid JSON body: {e}")))
    }
}

/// Writes the failure audit for unexpected errors, then hands the error back
/// for the response.
pub(crate) fn audit_failure<'a>(
    state: &'a AppState,
    ctx: &AuditContext,
    action: &'static str,
    entity: &'static str,
    entity_id: Option<&str>,
    at: DateTime<Utc>,
) -> impl FnOnce(AppError) -> AppError + 'a {
    let ctx = ctx.clone();
    let entity_id = entity_id.map(str::to_string);
    move |err| {
        audit::record_failure(&state.db, &ctx, action, entity, entity_id.as_deref(), &err, at);
        err
    }
}

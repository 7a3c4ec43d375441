//! API route handlers.
//!
//! Decision handlers always answer 200: the telephony platform expects a
//! body even when the engine fails, and a deny is already encoded in it.

use axum::extract::rejection::QueryRejection;
use axum::extract::{FromRequest, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::{Form, Json};
use tracing::warn;

use offduty_core::{CallEvent, Decision};

use crate::models::{CallRequest, HealthResponse};
use crate::state::AppState;

/// GET /api/decision?From=... - Decide on a call from query parameters.
pub async fn decide_query(
    State(state): State<AppState>,
    query: Result<Query<CallRequest>, QueryRejection>,
) -> Json<Decision> {
    let req = match query {
        Ok(Query(req)) => req,
        Err(rejection) => {
            warn!(error = %rejection, "Unreadable decision query");
            CallRequest::default()
        }
    };
    decide(&state, &req).await
}

/// POST /api/decision - Decide on a call from a form or JSON body.
///
/// Telephony webhooks post `From=...` form-encoded; anything else is read as
/// JSON. An unreadable body is treated as a call without a caller.
pub async fn decide_body(State(state): State<AppState>, request: Request) -> Json<Decision> {
    let is_form = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

    let body = if is_form {
        Form::<CallRequest>::from_request(request, &state)
            .await
            .map(|Form(req)| req)
            .map_err(|rejection| rejection.to_string())
    } else {
        Json::<CallRequest>::from_request(request, &state)
            .await
            .map(|Json(req)| req)
            .map_err(|rejection| rejection.to_string())
    };

    let req = body.unwrap_or_else(|error| {
        warn!(error = %error, "Unreadable decision request");
        CallRequest::default()
    });
    decide(&state, &req).await
}

async fn decide(state: &AppState, req: &CallRequest) -> Json<Decision> {
    let event = CallEvent::now(req.caller());
    Json(state.engine.evaluate(&event).await)
}

/// GET /health - Liveness check.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

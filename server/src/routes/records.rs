//! Record endpoint routes.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use tether_engine::CanonicalRecord;

use crate::auth::AuthUser;
use crate::db::Inserted;
use crate::error::{AppError, Result};
use crate::handlers::{handle_create, handle_get, handle_list, CreateRecordRequest, ListQuery};
use crate::AppState;

/// Header carrying the client's idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Create record routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/records", get(list_handler).post(create_handler))
        .route("/records/{id}", get(get_handler))
}

/// POST /records - Create a record.
///
/// `201` for a new record, `200` when the idempotency key was seen before.
async fn create_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    headers: HeaderMap,
    Json(request): Json<CreateRecordRequest>,
) -> Result<(StatusCode, Json<CanonicalRecord>)> {
    let key = match headers.get(IDEMPOTENCY_HEADER) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| AppError::BadRequest("invalid idempotency key".to_string()))?,
        ),
        None => None,
    };

    match handle_create(&state.repo, key, request).await? {
        Inserted::Created(record) => Ok((StatusCode::CREATED, Json(record))),
        Inserted::Replayed(record) => Ok((StatusCode::OK, Json(record))),
    }
}

/// GET /records - List records, newest first.
async fn list_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<ListQuery>,
) -> Json<Vec<CanonicalRecord>> {
    Json(handle_list(&state.repo, query).await)
}

/// GET /records/{id} - Fetch one record.
async fn get_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<CanonicalRecord>> {
    let stored = handle_get(&state.repo, &id).await?;
    Ok(Json(stored.record))
}

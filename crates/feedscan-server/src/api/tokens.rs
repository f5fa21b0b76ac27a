//! Token pool handlers: list, add, remove.
//!
//! Raw token values are accepted on write but never returned; responses
//! carry [`TokenSummary`] fingerprints only.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use feedscan_db::{DbError, TokenPoolSummary, TokenSummary};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct AddTokenRequest {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct RemovedToken {
    id: i64,
    removed: bool,
}

/// GET /api/v1/tokens: Valid tokens, the env fallback first when it applies.
pub(super) async fn list_tokens(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<TokenPoolSummary>>, ApiError> {
    let data = feedscan_db::list_token_summaries(&state.pool, state.tokens.fallback_token())
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/tokens: Validate and pool a bearer token.
pub(super) async fn add_token(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Result<Json<AddTokenRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<TokenSummary>>), ApiError> {
    let rid = &req_id.0;

    let raw = match body {
        Ok(Json(AddTokenRequest { token: Some(token) })) if !token.trim().is_empty() => token,
        Ok(_) => return Err(ApiError::new(rid, "validation_error", "token is required")),
        Err(rejection) => {
            return Err(ApiError::new(
                rid,
                "validation_error",
                rejection.body_text(),
            ))
        }
    };

    let row = state.tokens.add(&raw).await.map_err(|e| match e {
        DbError::Token(reason) => ApiError::new(rid, "validation_error", reason.to_string()),
        other => map_db_error(rid.clone(), &other),
    })?;
    state.stats.invalidate().await;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: TokenSummary::from(&row),
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// DELETE /api/v1/tokens/:id: Drop a pooled token.
pub(super) async fn remove_token(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<RemovedToken>>, ApiError> {
    let rid = &req_id.0;

    let id: i64 = id.parse().map_err(|_| {
        ApiError::new(
            rid,
            "validation_error",
            format!("token id must be an integer, got '{id}'"),
        )
    })?;

    let removed = state
        .tokens
        .remove(id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    if !removed {
        return Err(ApiError::new(
            rid,
            "not_found",
            format!("no token with id {id}"),
        ));
    }
    state.stats.invalidate().await;

    Ok(Json(ApiResponse {
        data: RemovedToken { id, removed },
        meta: ResponseMeta::new(req_id.0),
    }))
}

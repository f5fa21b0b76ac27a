use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Extension, Json,
};
use feedscan_db::ScanHistoryRow;
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct ScansQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/scans: Most recent scan attempts, newest first.
pub(super) async fn list_scans(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    query: Result<Query<ScansQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<ScanHistoryRow>>>, ApiError> {
    let Query(query) =
        query.map_err(|rejection| ApiError::new(&req_id.0, "bad_request", rejection.body_text()))?;

    let data = feedscan_db::list_scan_history(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

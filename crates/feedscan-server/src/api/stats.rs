use axum::{extract::State, Extension, Json};
use feedscan_db::DashboardSnapshot;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

/// GET /api/v1/stats: Full dashboard snapshot, served from the stats cache.
pub(super) async fn get_stats(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<DashboardSnapshot>>, ApiError> {
    let data = state
        .stats
        .snapshot()
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

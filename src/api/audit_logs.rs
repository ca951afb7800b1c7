use axum::{
    Json,
    extract::{Query, State},
};
use std::sync::Arc;

use super::types::AuditLogQuery;
use super::validation;
use super::{ApiError, ApiResponse, AppState};
use crate::services::AuditPage;

/// GET /audit-logs?page=&limit=
/// Newest first.
pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<ApiResponse<AuditPage>>, ApiError> {
    let (page, limit) = validation::parse_pagination(&query)?;
    let page = state.audit().list(page, limit).await?;
    Ok(Json(ApiResponse::success(page)))
}

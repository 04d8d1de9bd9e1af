use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    ledger::{models::Withdrawal, PledgeLedger},
    optimizer::PledgePreview,
    pledges::{
        models::{
            CreatePledgeRequest, FundingStatusResponse, PledgeResponse, PreviewPledgeRequest,
        },
        service::PledgeService,
    },
    settlement::scheduler::{RunReport, SettlementScheduler},
};

#[derive(Clone)]
pub struct AppState {
    pub pledge_service: Arc<PledgeService>,
    pub scheduler: Arc<SettlementScheduler>,
    pub ledger: Arc<dyn PledgeLedger>,
}

/// Pledge an amount toward a server's monthly cost
/// POST /api/v1/pledges
pub async fn create_pledge(
    State(state): State<AppState>,
    Json(request): Json<CreatePledgeRequest>,
) -> AppResult<Json<PledgeResponse>> {
    info!(
        "Creating pledge: {} toward server {} by user {}",
        request.amount, request.server_id, request.user_id
    );

    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let pledge = state
        .pledge_service
        .create_pledge(request.user_id, request.server_id, request.amount)
        .await?;

    Ok(Json(PledgeResponse::from(pledge)))
}

/// What would this pledge actually cost after redistribution?
/// POST /api/v1/pledges/preview
pub async fn preview_pledge(
    State(state): State<AppState>,
    Json(request): Json<PreviewPledgeRequest>,
) -> AppResult<Json<PledgePreview>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    let preview = state
        .pledge_service
        .preview_pledge(request.server_id, request.amount)
        .await?;

    Ok(Json(preview))
}

/// Cancel an active pledge
/// DELETE /api/v1/pledges/:pledge_id
pub async fn cancel_pledge(
    State(state): State<AppState>,
    Path(pledge_id): Path<Uuid>,
) -> AppResult<Json<PledgeResponse>> {
    info!("Cancelling pledge: {}", pledge_id);

    let pledge = state.pledge_service.cancel_pledge(pledge_id).await?;

    Ok(Json(PledgeResponse::from(pledge)))
}

/// Live funding snapshot for a server
/// GET /api/v1/servers/:server_id/funding
pub async fn get_funding_status(
    State(state): State<AppState>,
    Path(server_id): Path<Uuid>,
) -> AppResult<Json<FundingStatusResponse>> {
    let status = state.pledge_service.funding_status(server_id).await?;
    Ok(Json(status))
}

/// Withdrawal history for a server, most recent first
/// GET /api/v1/servers/:server_id/withdrawals
pub async fn list_server_withdrawals(
    State(state): State<AppState>,
    Path(server_id): Path<Uuid>,
) -> AppResult<Json<Vec<Withdrawal>>> {
    state
        .ledger
        .get_server(server_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("server {}", server_id)))?;

    let withdrawals = state.ledger.withdrawals_for_server(server_id).await?;
    Ok(Json(withdrawals))
}

/// Settle every server due as of today, regardless of the clock
/// POST /api/v1/settlement/run
pub async fn trigger_settlement_run(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<RunReport>>> {
    info!("🔧 Manual settlement run requested");

    let reports = state.scheduler.run_cycle(Utc::now().date_naive()).await;
    Ok(Json(reports))
}

/// GET /health - Health check
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

use axum::{
    extract::{Path, State},
    routing::{patch, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use agora_campaign::CampaignStatus;
use agora_pledge::Pledge;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/campaigns/{id}/pledges", post(place_pledge))
        .route("/v1/pledges/{id}", patch(update_quantity))
        .route("/v1/pledges/{id}/withdraw", post(withdraw))
}

#[derive(Debug, Deserialize)]
pub struct PlacePledgeRequest {
    pub buyer_org_id: Uuid,
    pub placed_by: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

/// POST /v1/campaigns/:id/pledges
async fn place_pledge(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    Json(payload): Json<PlacePledgeRequest>,
) -> Result<Json<Pledge>, ApiError> {
    let campaign = state.campaigns.find_campaign(campaign_id).await?;
    if campaign.status != CampaignStatus::Open {
        return Err(ApiError::Validation(format!(
            "Campaign is {:?}; pledges are only accepted while it is open",
            campaign.status
        )));
    }

    let pledge = state
        .pledges
        .place_pledge(Pledge::new(
            campaign_id,
            payload.buyer_org_id,
            payload.placed_by,
            payload.quantity,
        ))
        .await?;
    Ok(Json(pledge))
}

/// PATCH /v1/pledges/:id
async fn update_quantity(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<Json<Pledge>, ApiError> {
    Ok(Json(state.pledges.update_quantity(id, payload.quantity).await?))
}

/// POST /v1/pledges/:id/withdraw
async fn withdraw(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Pledge>, ApiError> {
    Ok(Json(state.pledges.withdraw(id).await?))
}

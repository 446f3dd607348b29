use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agora_billing::models::Invoice;
use agora_campaign::brackets::{self, DiscountBracket};
use agora_campaign::{Campaign, CampaignError, CampaignStatus};
use agora_shared::models::events::{CampaignLockedEvent, InvoiceIssuedEvent};
use agora_store::events::topics;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/campaigns", post(create_campaign))
        .route("/v1/campaigns/{id}", get(get_campaign))
        .route("/v1/campaigns/{id}/brackets", post(add_bracket).get(list_brackets))
        .route("/v1/campaigns/{id}/open", post(open_campaign))
        .route("/v1/campaigns/{id}/cancel", post(cancel_campaign))
        .route("/v1/campaigns/{id}/pricing", get(get_pricing))
        .route("/v1/campaigns/{id}/lock", post(lock_campaign))
}

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub supplier_org_id: Uuid,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct AddBracketRequest {
    pub min_quantity: i64,
    pub max_quantity: Option<i64>,
    pub unit_price: Decimal,
    pub bracket_order: i32,
}

#[derive(Debug, Serialize)]
pub struct PricingResponse {
    pub campaign_id: Uuid,
    pub total_pledged_quantity: i64,
    pub current_unit_price: Decimal,
    pub current_bracket_order: i32,
    /// Units still missing until the next tier unlocks
    pub quantity_to_next_bracket: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LockCampaignResponse {
    pub campaign: Campaign,
    pub final_bracket: DiscountBracket,
    pub committed_quantity: i64,
    pub invoices: Vec<Invoice>,
}

/// POST /v1/campaigns
async fn create_campaign(
    State(state): State<AppState>,
    Json(payload): Json<CreateCampaignRequest>,
) -> Result<Json<Campaign>, ApiError> {
    let campaign = state
        .campaigns
        .insert_campaign(Campaign::new(payload.supplier_org_id, payload.title))
        .await?;
    Ok(Json(campaign))
}

/// GET /v1/campaigns/:id
async fn get_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    Ok(Json(state.campaigns.find_campaign(id).await?))
}

/// POST /v1/campaigns/:id/brackets
async fn add_bracket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddBracketRequest>,
) -> Result<Json<DiscountBracket>, ApiError> {
    let bracket = DiscountBracket::new(
        id,
        payload.min_quantity,
        payload.max_quantity,
        payload.unit_price,
        payload.bracket_order,
    );
    Ok(Json(state.campaigns.add_bracket(bracket).await?))
}

/// GET /v1/campaigns/:id/brackets
async fn list_brackets(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DiscountBracket>>, ApiError> {
    Ok(Json(state.campaigns.brackets_for_campaign(id).await?))
}

/// POST /v1/campaigns/:id/open
async fn open_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    Ok(Json(state.campaigns.open_campaign(id).await?))
}

/// POST /v1/campaigns/:id/cancel
async fn cancel_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    Ok(Json(state.campaigns.cancel_campaign(id).await?))
}

/// GET /v1/campaigns/:id/pricing
///
/// The committed aggregate is recomputed on every call; concurrent pledges
/// simply show up on the next read.
async fn get_pricing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PricingResponse>, ApiError> {
    state.campaigns.find_campaign(id).await?;
    let brackets = state.campaigns.brackets_for_campaign(id).await?;
    let quantity = state.pledges.total_pledged_quantity(id).await?;

    let current = brackets::resolve_bracket(&brackets, quantity)?;
    Ok(Json(PricingResponse {
        campaign_id: id,
        total_pledged_quantity: quantity,
        current_unit_price: current.unit_price,
        current_bracket_order: current.bracket_order,
        quantity_to_next_bracket: brackets::quantity_to_next_bracket(&brackets, quantity),
    }))
}

/// POST /v1/campaigns/:id/lock
///
/// Commits all pending pledges, locks the campaign at the bracket the
/// committed quantity lands in, and generates the invoices. Retryable: a
/// second call on an already-locked campaign only fills in whatever invoices
/// a previous partial failure left out.
async fn lock_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LockCampaignResponse>, ApiError> {
    let brackets = state.campaigns.brackets_for_campaign(id).await?;

    state.pledges.commit_all_for_campaign(id).await?;
    let committed_quantity = state.pledges.committed_quantity(id).await?;
    let mut final_bracket = brackets::resolve_bracket(&brackets, committed_quantity)?.clone();

    let campaign = match state.campaigns.lock_campaign(id, final_bracket.bracket_order).await {
        Ok(campaign) => {
            let event = CampaignLockedEvent {
                campaign_id: id,
                final_bracket_order: final_bracket.bracket_order,
                committed_quantity,
                timestamp: Utc::now().timestamp(),
            };
            if let Err(e) = state
                .kafka
                .publish_event(topics::CAMPAIGN_LOCKED, &id.to_string(), &event)
                .await
            {
                tracing::warn!(campaign_id = %id, error = %e, "Campaign lock event not published");
            }
            campaign
        }
        // Re-entry after a partial failure: the campaign is already locked,
        // finish generating against the recorded final bracket
        Err(CampaignError::InvalidTransition {
            from: CampaignStatus::Locked,
            ..
        }) => {
            let campaign = state.campaigns.find_campaign(id).await?;
            if let Some(order) = campaign.final_bracket_order {
                if let Some(recorded) = brackets.iter().find(|b| b.bracket_order == order) {
                    final_bracket = recorded.clone();
                }
            }
            campaign
        }
        Err(e) => return Err(e.into()),
    };

    let invoices = state
        .generator
        .generate_invoices_for_campaign(id, &final_bracket)
        .await?;
    state.metrics.invoices_generated.inc_by(invoices.len() as u64);

    for invoice in &invoices {
        let event = InvoiceIssuedEvent {
            invoice_id: invoice.id,
            invoice_number: invoice.invoice_number.clone(),
            campaign_id: invoice.campaign_id,
            buyer_org_id: invoice.buyer_org_id,
            total_amount: invoice.total_amount.to_string(),
            timestamp: Utc::now().timestamp(),
        };
        if let Err(e) = state
            .kafka
            .publish_event(topics::INVOICE_ISSUED, &invoice.id.to_string(), &event)
            .await
        {
            tracing::warn!(invoice_id = %invoice.id, error = %e, "Invoice event not published");
        }
    }

    Ok(Json(LockCampaignResponse {
        campaign,
        final_bracket,
        committed_quantity,
        invoices,
    }))
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use agora_campaign::brackets::{validate_brackets, DiscountBracket};
use agora_campaign::campaign::{Campaign, CampaignError, CampaignStatus};
use agora_campaign::store::CampaignStore;

pub struct PgCampaignStore {
    pool: PgPool,
}

impl PgCampaignStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CampaignRow {
    id: Uuid,
    supplier_org_id: Uuid,
    title: String,
    status: String,
    final_bracket_order: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct BracketRow {
    id: Uuid,
    campaign_id: Uuid,
    min_quantity: i64,
    max_quantity: Option<i64>,
    unit_price: Decimal,
    bracket_order: i32,
}

const CAMPAIGN_COLUMNS: &str =
    "id, supplier_org_id, title, status, final_bracket_order, created_at, updated_at";
const BRACKET_COLUMNS: &str = "id, campaign_id, min_quantity, max_quantity, unit_price, bracket_order";

impl CampaignRow {
    fn into_campaign(self) -> Result<Campaign, CampaignError> {
        let status = CampaignStatus::parse(&self.status)
            .ok_or_else(|| CampaignError::Storage(format!("unknown campaign status {}", self.status)))?;
        Ok(Campaign {
            id: self.id,
            supplier_org_id: self.supplier_org_id,
            title: self.title,
            status,
            final_bracket_order: self.final_bracket_order,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl From<BracketRow> for DiscountBracket {
    fn from(row: BracketRow) -> Self {
        DiscountBracket {
            id: row.id,
            campaign_id: row.campaign_id,
            min_quantity: row.min_quantity,
            max_quantity: row.max_quantity,
            unit_price: row.unit_price,
            bracket_order: row.bracket_order,
        }
    }
}

fn storage(e: sqlx::Error) -> CampaignError {
    CampaignError::Storage(e.to_string())
}

impl PgCampaignStore {
    /// Guarded status swap; `final_bracket_order` only written when provided
    async fn transition(
        &self,
        id: Uuid,
        expected: CampaignStatus,
        to: CampaignStatus,
        final_bracket_order: Option<i32>,
    ) -> Result<Campaign, CampaignError> {
        let row = sqlx::query_as::<_, CampaignRow>(&format!(
            "UPDATE campaigns SET status = $1, \
             final_bracket_order = COALESCE($2, final_bracket_order), \
             updated_at = now() \
             WHERE id = $3 AND status = $4 \
             RETURNING {CAMPAIGN_COLUMNS}"
        ))
        .bind(to.as_str())
        .bind(final_bracket_order)
        .bind(id)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        match row {
            Some(row) => row.into_campaign(),
            None => {
                let current = self.find_campaign(id).await?;
                Err(CampaignError::InvalidTransition {
                    from: current.status,
                    to,
                })
            }
        }
    }
}

#[async_trait]
impl CampaignStore for PgCampaignStore {
    async fn insert_campaign(&self, campaign: Campaign) -> Result<Campaign, CampaignError> {
        sqlx::query(
            "INSERT INTO campaigns (id, supplier_org_id, title, status, final_bracket_order) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(campaign.id)
        .bind(campaign.supplier_org_id)
        .bind(&campaign.title)
        .bind(campaign.status.as_str())
        .bind(campaign.final_bracket_order)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(campaign)
    }

    async fn find_campaign(&self, id: Uuid) -> Result<Campaign, CampaignError> {
        sqlx::query_as::<_, CampaignRow>(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?
        .ok_or(CampaignError::NotFound(id))?
        .into_campaign()
    }

    async fn add_bracket(&self, bracket: DiscountBracket) -> Result<DiscountBracket, CampaignError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        // Hold the campaign row so the draft check and the insert are atomic
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM campaigns WHERE id = $1 FOR UPDATE")
                .bind(bracket.campaign_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage)?;
        match status.as_deref() {
            None => return Err(CampaignError::NotFound(bracket.campaign_id)),
            Some("DRAFT") => {}
            Some(_) => return Err(CampaignError::BracketsImmutable),
        }

        sqlx::query(
            "INSERT INTO discount_brackets (id, campaign_id, min_quantity, max_quantity, unit_price, bracket_order) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(bracket.id)
        .bind(bracket.campaign_id)
        .bind(bracket.min_quantity)
        .bind(bracket.max_quantity)
        .bind(bracket.unit_price)
        .bind(bracket.bracket_order)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(bracket)
    }

    async fn brackets_for_campaign(&self, campaign_id: Uuid) -> Result<Vec<DiscountBracket>, CampaignError> {
        let rows = sqlx::query_as::<_, BracketRow>(&format!(
            "SELECT {BRACKET_COLUMNS} FROM discount_brackets WHERE campaign_id = $1 ORDER BY bracket_order"
        ))
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(rows.into_iter().map(DiscountBracket::from).collect())
    }

    async fn open_campaign(&self, id: Uuid) -> Result<Campaign, CampaignError> {
        let brackets = self.brackets_for_campaign(id).await?;
        validate_brackets(&brackets)?;
        self.transition(id, CampaignStatus::Draft, CampaignStatus::Open, None).await
    }

    async fn lock_campaign(&self, id: Uuid, final_bracket_order: i32) -> Result<Campaign, CampaignError> {
        self.transition(id, CampaignStatus::Open, CampaignStatus::Locked, Some(final_bracket_order))
            .await
    }

    async fn cancel_campaign(&self, id: Uuid) -> Result<Campaign, CampaignError> {
        let current = self.find_campaign(id).await?;
        if !current.status.can_transition_to(CampaignStatus::Cancelled) {
            return Err(CampaignError::InvalidTransition {
                from: current.status,
                to: CampaignStatus::Cancelled,
            });
        }
        self.transition(id, current.status, CampaignStatus::Cancelled, None).await
    }
}

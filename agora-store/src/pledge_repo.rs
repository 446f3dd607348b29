use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use agora_pledge::{Pledge, PledgeError, PledgeStatus, PledgeStore};

pub struct PgPledgeLedger {
    pool: PgPool,
}

impl PgPledgeLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PledgeRow {
    id: Uuid,
    campaign_id: Uuid,
    buyer_org_id: Uuid,
    placed_by: Uuid,
    quantity: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const PLEDGE_COLUMNS: &str =
    "id, campaign_id, buyer_org_id, placed_by, quantity, status, created_at, updated_at";

impl PledgeRow {
    fn into_pledge(self) -> Result<Pledge, PledgeError> {
        let status = PledgeStatus::parse(&self.status)
            .ok_or_else(|| PledgeError::Storage(format!("unknown pledge status {}", self.status)))?;
        Ok(Pledge {
            id: self.id,
            campaign_id: self.campaign_id,
            buyer_org_id: self.buyer_org_id,
            placed_by: self.placed_by,
            quantity: self.quantity,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn storage(e: sqlx::Error) -> PledgeError {
    PledgeError::Storage(e.to_string())
}

#[async_trait]
impl PledgeStore for PgPledgeLedger {
    async fn place_pledge(&self, pledge: Pledge) -> Result<Pledge, PledgeError> {
        if pledge.quantity <= 0 {
            return Err(PledgeError::InvalidQuantity(pledge.quantity));
        }

        let result = sqlx::query(
            "INSERT INTO pledges (id, campaign_id, buyer_org_id, placed_by, quantity, status) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(pledge.id)
        .bind(pledge.campaign_id)
        .bind(pledge.buyer_org_id)
        .bind(pledge.placed_by)
        .bind(pledge.quantity)
        .bind(pledge.status.as_str())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(pledge),
            Err(e)
                if e.as_database_error().and_then(|d| d.constraint()) == Some("uq_pledges_active") =>
            {
                Err(PledgeError::DuplicatePledge)
            }
            Err(e) => Err(storage(e)),
        }
    }

    async fn find_pledge(&self, id: Uuid) -> Result<Pledge, PledgeError> {
        sqlx::query_as::<_, PledgeRow>(&format!("SELECT {PLEDGE_COLUMNS} FROM pledges WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .ok_or(PledgeError::NotFound(id))?
            .into_pledge()
    }

    async fn update_quantity(&self, id: Uuid, quantity: i64) -> Result<Pledge, PledgeError> {
        if quantity <= 0 {
            return Err(PledgeError::InvalidQuantity(quantity));
        }

        let row = sqlx::query_as::<_, PledgeRow>(&format!(
            "UPDATE pledges SET quantity = $1, updated_at = now() \
             WHERE id = $2 AND status = 'PENDING' \
             RETURNING {PLEDGE_COLUMNS}"
        ))
        .bind(quantity)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        match row {
            Some(row) => row.into_pledge(),
            None => {
                let current = self.find_pledge(id).await?;
                Err(PledgeError::InvalidTransition {
                    status: current.status,
                    action: "resized",
                })
            }
        }
    }

    async fn withdraw(&self, id: Uuid) -> Result<Pledge, PledgeError> {
        let row = sqlx::query_as::<_, PledgeRow>(&format!(
            "UPDATE pledges SET status = 'WITHDRAWN', updated_at = now() \
             WHERE id = $1 AND status = 'PENDING' \
             RETURNING {PLEDGE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        match row {
            Some(row) => row.into_pledge(),
            None => {
                let current = self.find_pledge(id).await?;
                Err(PledgeError::InvalidTransition {
                    status: current.status,
                    action: "withdrawn",
                })
            }
        }
    }

    async fn commit_all_for_campaign(&self, campaign_id: Uuid) -> Result<u64, PledgeError> {
        let result = sqlx::query(
            "UPDATE pledges SET status = 'COMMITTED', updated_at = now() \
             WHERE campaign_id = $1 AND status = 'PENDING'",
        )
        .bind(campaign_id)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(result.rows_affected())
    }

    async fn find_committed(&self, campaign_id: Uuid) -> Result<Vec<Pledge>, PledgeError> {
        let rows = sqlx::query_as::<_, PledgeRow>(&format!(
            "SELECT {PLEDGE_COLUMNS} FROM pledges WHERE campaign_id = $1 AND status = 'COMMITTED' ORDER BY created_at"
        ))
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.into_iter().map(PledgeRow::into_pledge).collect()
    }

    async fn total_pledged_quantity(&self, campaign_id: Uuid) -> Result<i64, PledgeError> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(quantity)::BIGINT FROM pledges WHERE campaign_id = $1 AND status <> 'WITHDRAWN'",
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        Ok(total.unwrap_or(0))
    }

    async fn committed_quantity(&self, campaign_id: Uuid) -> Result<i64, PledgeError> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(quantity)::BIGINT FROM pledges WHERE campaign_id = $1 AND status = 'COMMITTED'",
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        Ok(total.unwrap_or(0))
    }
}

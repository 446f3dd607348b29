use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pledge status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PledgeStatus {
    Pending,
    Committed,
    Withdrawn,
}

impl PledgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PledgeStatus::Pending => "PENDING",
            PledgeStatus::Committed => "COMMITTED",
            PledgeStatus::Withdrawn => "WITHDRAWN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PledgeStatus::Pending),
            "COMMITTED" => Some(PledgeStatus::Committed),
            "WITHDRAWN" => Some(PledgeStatus::Withdrawn),
            _ => None,
        }
    }
}

/// A buyer organization's quantity commitment to a campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pledge {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub buyer_org_id: Uuid,
    /// User who placed the pledge on behalf of the organization
    pub placed_by: Uuid,
    pub quantity: i64,
    pub status: PledgeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pledge {
    pub fn new(campaign_id: Uuid, buyer_org_id: Uuid, placed_by: Uuid, quantity: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            buyer_org_id,
            placed_by,
            quantity,
            status: PledgeStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Withdrawn pledges no longer count toward the campaign
    pub fn is_active(&self) -> bool {
        self.status != PledgeStatus::Withdrawn
    }

    pub fn is_committed(&self) -> bool {
        self.status == PledgeStatus::Committed
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Campaign status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Draft,
    Open,
    Locked,
    Fulfilled,
    Cancelled,
}

impl CampaignStatus {
    pub fn allowed_transitions(&self) -> &'static [CampaignStatus] {
        match self {
            CampaignStatus::Draft => &[CampaignStatus::Open, CampaignStatus::Cancelled],
            CampaignStatus::Open => &[CampaignStatus::Locked, CampaignStatus::Cancelled],
            CampaignStatus::Locked => &[CampaignStatus::Fulfilled, CampaignStatus::Cancelled],
            CampaignStatus::Fulfilled | CampaignStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, to: CampaignStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "DRAFT",
            CampaignStatus::Open => "OPEN",
            CampaignStatus::Locked => "LOCKED",
            CampaignStatus::Fulfilled => "FULFILLED",
            CampaignStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(CampaignStatus::Draft),
            "OPEN" => Some(CampaignStatus::Open),
            "LOCKED" => Some(CampaignStatus::Locked),
            "FULFILLED" => Some(CampaignStatus::Fulfilled),
            "CANCELLED" => Some(CampaignStatus::Cancelled),
            _ => None,
        }
    }
}

/// A supplier's bulk-purchase campaign, the owning entity for discount
/// brackets and pledges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub supplier_org_id: Uuid,
    pub title: String,
    pub status: CampaignStatus,
    /// Set when the campaign locks; records which tier won
    pub final_bracket_order: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(supplier_org_id: Uuid, title: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            supplier_org_id,
            title,
            status: CampaignStatus::Draft,
            final_bracket_order: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Brackets are mutable only while the campaign is in draft
    pub fn can_edit_brackets(&self) -> bool {
        self.status == CampaignStatus::Draft
    }

    pub fn is_locked(&self) -> bool {
        self.status == CampaignStatus::Locked
    }

    pub fn transition(&mut self, to: CampaignStatus) -> Result<(), CampaignError> {
        if !self.status.can_transition_to(to) {
            return Err(CampaignError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Open → Locked, recording the winning tier
    pub fn lock(&mut self, final_bracket_order: i32) -> Result<(), CampaignError> {
        self.transition(CampaignStatus::Locked)?;
        self.final_bracket_order = Some(final_bracket_order);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("Campaign not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid campaign transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: CampaignStatus,
        to: CampaignStatus,
    },

    #[error("Brackets are immutable once the campaign leaves draft")]
    BracketsImmutable,

    #[error("Invalid bracket set: {0}")]
    InvalidBrackets(#[from] crate::brackets::PricingError),

    #[error("Campaign storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_records_final_bracket() {
        let mut campaign = Campaign::new(Uuid::new_v4(), "Pallet deal".to_string());
        campaign.transition(CampaignStatus::Open).unwrap();
        campaign.lock(3).unwrap();
        assert_eq!(campaign.status, CampaignStatus::Locked);
        assert_eq!(campaign.final_bracket_order, Some(3));
    }

    #[test]
    fn draft_cannot_lock_directly() {
        let mut campaign = Campaign::new(Uuid::new_v4(), "Pallet deal".to_string());
        let result = campaign.lock(1);
        assert!(matches!(result, Err(CampaignError::InvalidTransition { .. })));
        assert_eq!(campaign.status, CampaignStatus::Draft);
        assert_eq!(campaign.final_bracket_order, None);
    }

    #[test]
    fn terminal_states_allow_nothing() {
        assert!(CampaignStatus::Fulfilled.allowed_transitions().is_empty());
        assert!(CampaignStatus::Cancelled.allowed_transitions().is_empty());
    }

    #[test]
    fn brackets_editable_only_in_draft() {
        let mut campaign = Campaign::new(Uuid::new_v4(), "Pallet deal".to_string());
        assert!(campaign.can_edit_brackets());
        campaign.transition(CampaignStatus::Open).unwrap();
        assert!(!campaign.can_edit_brackets());
    }
}

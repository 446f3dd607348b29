use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::brackets::{validate_brackets, DiscountBracket};
use crate::campaign::{Campaign, CampaignError, CampaignStatus};

/// Campaign and bracket data access
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn insert_campaign(&self, campaign: Campaign) -> Result<Campaign, CampaignError>;

    async fn find_campaign(&self, id: Uuid) -> Result<Campaign, CampaignError>;

    /// Only legal while the campaign is in draft
    async fn add_bracket(&self, bracket: DiscountBracket) -> Result<DiscountBracket, CampaignError>;

    /// Sorted ascending by `bracket_order`
    async fn brackets_for_campaign(&self, campaign_id: Uuid) -> Result<Vec<DiscountBracket>, CampaignError>;

    /// Draft → Open; validates the bracket set before publishing
    async fn open_campaign(&self, id: Uuid) -> Result<Campaign, CampaignError>;

    /// Open → Locked, recording the winning tier
    async fn lock_campaign(&self, id: Uuid, final_bracket_order: i32) -> Result<Campaign, CampaignError>;

    async fn cancel_campaign(&self, id: Uuid) -> Result<Campaign, CampaignError>;
}

#[derive(Default)]
struct CampaignState {
    campaigns: HashMap<Uuid, Campaign>,
    brackets: HashMap<Uuid, Vec<DiscountBracket>>,
}

/// In-memory store used by tests and local wiring
#[derive(Default)]
pub struct InMemoryCampaignStore {
    state: Mutex<CampaignState>,
}

impl InMemoryCampaignStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CampaignStore for InMemoryCampaignStore {
    async fn insert_campaign(&self, campaign: Campaign) -> Result<Campaign, CampaignError> {
        let mut state = self.state.lock().unwrap();
        state.campaigns.insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    async fn find_campaign(&self, id: Uuid) -> Result<Campaign, CampaignError> {
        let state = self.state.lock().unwrap();
        state
            .campaigns
            .get(&id)
            .cloned()
            .ok_or(CampaignError::NotFound(id))
    }

    async fn add_bracket(&self, bracket: DiscountBracket) -> Result<DiscountBracket, CampaignError> {
        let mut state = self.state.lock().unwrap();
        let campaign = state
            .campaigns
            .get(&bracket.campaign_id)
            .ok_or(CampaignError::NotFound(bracket.campaign_id))?;
        if !campaign.can_edit_brackets() {
            return Err(CampaignError::BracketsImmutable);
        }
        let entry = state.brackets.entry(bracket.campaign_id).or_default();
        entry.push(bracket.clone());
        entry.sort_by_key(|b| b.bracket_order);
        Ok(bracket)
    }

    async fn brackets_for_campaign(&self, campaign_id: Uuid) -> Result<Vec<DiscountBracket>, CampaignError> {
        let state = self.state.lock().unwrap();
        Ok(state.brackets.get(&campaign_id).cloned().unwrap_or_default())
    }

    async fn open_campaign(&self, id: Uuid) -> Result<Campaign, CampaignError> {
        let mut state = self.state.lock().unwrap();
        let brackets = state.brackets.get(&id).cloned().unwrap_or_default();
        validate_brackets(&brackets)?;
        let campaign = state.campaigns.get_mut(&id).ok_or(CampaignError::NotFound(id))?;
        campaign.transition(CampaignStatus::Open)?;
        Ok(campaign.clone())
    }

    async fn lock_campaign(&self, id: Uuid, final_bracket_order: i32) -> Result<Campaign, CampaignError> {
        let mut state = self.state.lock().unwrap();
        let campaign = state.campaigns.get_mut(&id).ok_or(CampaignError::NotFound(id))?;
        campaign.lock(final_bracket_order)?;
        Ok(campaign.clone())
    }

    async fn cancel_campaign(&self, id: Uuid) -> Result<Campaign, CampaignError> {
        let mut state = self.state.lock().unwrap();
        let campaign = state.campaigns.get_mut(&id).ok_or(CampaignError::NotFound(id))?;
        campaign.transition(CampaignStatus::Cancelled)?;
        Ok(campaign.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn brackets_reject_after_open() {
        let store = InMemoryCampaignStore::new();
        let campaign = store
            .insert_campaign(Campaign::new(Uuid::new_v4(), "Bulk filament".to_string()))
            .await
            .unwrap();

        store
            .add_bracket(DiscountBracket::new(campaign.id, 0, Some(49), dec!(100), 1))
            .await
            .unwrap();
        store
            .add_bracket(DiscountBracket::new(campaign.id, 50, None, dec!(90), 2))
            .await
            .unwrap();

        store.open_campaign(campaign.id).await.unwrap();

        let late = store
            .add_bracket(DiscountBracket::new(campaign.id, 100, None, dec!(80), 3))
            .await;
        assert!(matches!(late, Err(CampaignError::BracketsImmutable)));
    }

    #[tokio::test]
    async fn open_rejects_malformed_ladder() {
        let store = InMemoryCampaignStore::new();
        let campaign = store
            .insert_campaign(Campaign::new(Uuid::new_v4(), "Bulk filament".to_string()))
            .await
            .unwrap();

        // Gap between 49 and 60
        store
            .add_bracket(DiscountBracket::new(campaign.id, 0, Some(49), dec!(100), 1))
            .await
            .unwrap();
        store
            .add_bracket(DiscountBracket::new(campaign.id, 60, None, dec!(90), 2))
            .await
            .unwrap();

        assert!(matches!(
            store.open_campaign(campaign.id).await,
            Err(CampaignError::InvalidBrackets(_))
        ));
    }
}

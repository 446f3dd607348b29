use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{Pledge, PledgeStatus};

#[derive(Debug, thiserror::Error)]
pub enum PledgeError {
    #[error("Pledge not found: {0}")]
    NotFound(Uuid),

    #[error("Organization already has an active pledge on this campaign")]
    DuplicatePledge,

    #[error("Pledge quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    #[error("Pledge in status {status:?} cannot be {action}")]
    InvalidTransition {
        status: PledgeStatus,
        action: &'static str,
    },

    #[error("Pledge storage error: {0}")]
    Storage(String),
}

/// Tracks buyer commitments and supplies the committed-quantity aggregate
#[async_trait]
pub trait PledgeStore: Send + Sync {
    /// Rejects a second non-withdrawn pledge for the same (campaign, org)
    async fn place_pledge(&self, pledge: Pledge) -> Result<Pledge, PledgeError>;

    async fn find_pledge(&self, id: Uuid) -> Result<Pledge, PledgeError>;

    /// Quantity is mutable only while the pledge is pending
    async fn update_quantity(&self, id: Uuid, quantity: i64) -> Result<Pledge, PledgeError>;

    async fn withdraw(&self, id: Uuid) -> Result<Pledge, PledgeError>;

    /// Pending → Committed for every pledge on the campaign. Idempotent:
    /// already-committed pledges are left alone. Returns how many moved.
    async fn commit_all_for_campaign(&self, campaign_id: Uuid) -> Result<u64, PledgeError>;

    async fn find_committed(&self, campaign_id: Uuid) -> Result<Vec<Pledge>, PledgeError>;

    /// Sum of quantities across non-withdrawn pledges. Recomputed on every
    /// call so the bracket resolver always sees the latest aggregate.
    async fn total_pledged_quantity(&self, campaign_id: Uuid) -> Result<i64, PledgeError>;

    async fn committed_quantity(&self, campaign_id: Uuid) -> Result<i64, PledgeError>;
}

/// In-memory ledger used by tests and local wiring
#[derive(Default)]
pub struct InMemoryPledgeLedger {
    pledges: Mutex<HashMap<Uuid, Pledge>>,
}

impl InMemoryPledgeLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PledgeStore for InMemoryPledgeLedger {
    async fn place_pledge(&self, pledge: Pledge) -> Result<Pledge, PledgeError> {
        if pledge.quantity <= 0 {
            return Err(PledgeError::InvalidQuantity(pledge.quantity));
        }
        let mut pledges = self.pledges.lock().unwrap();
        let duplicate = pledges.values().any(|p| {
            p.campaign_id == pledge.campaign_id && p.buyer_org_id == pledge.buyer_org_id && p.is_active()
        });
        if duplicate {
            return Err(PledgeError::DuplicatePledge);
        }
        pledges.insert(pledge.id, pledge.clone());
        Ok(pledge)
    }

    async fn find_pledge(&self, id: Uuid) -> Result<Pledge, PledgeError> {
        let pledges = self.pledges.lock().unwrap();
        pledges.get(&id).cloned().ok_or(PledgeError::NotFound(id))
    }

    async fn update_quantity(&self, id: Uuid, quantity: i64) -> Result<Pledge, PledgeError> {
        if quantity <= 0 {
            return Err(PledgeError::InvalidQuantity(quantity));
        }
        let mut pledges = self.pledges.lock().unwrap();
        let pledge = pledges.get_mut(&id).ok_or(PledgeError::NotFound(id))?;
        if pledge.status != PledgeStatus::Pending {
            return Err(PledgeError::InvalidTransition {
                status: pledge.status,
                action: "resized",
            });
        }
        pledge.quantity = quantity;
        pledge.updated_at = Utc::now();
        Ok(pledge.clone())
    }

    async fn withdraw(&self, id: Uuid) -> Result<Pledge, PledgeError> {
        let mut pledges = self.pledges.lock().unwrap();
        let pledge = pledges.get_mut(&id).ok_or(PledgeError::NotFound(id))?;
        if pledge.status != PledgeStatus::Pending {
            return Err(PledgeError::InvalidTransition {
                status: pledge.status,
                action: "withdrawn",
            });
        }
        pledge.status = PledgeStatus::Withdrawn;
        pledge.updated_at = Utc::now();
        Ok(pledge.clone())
    }

    async fn commit_all_for_campaign(&self, campaign_id: Uuid) -> Result<u64, PledgeError> {
        let mut pledges = self.pledges.lock().unwrap();
        let mut moved = 0;
        for pledge in pledges.values_mut() {
            if pledge.campaign_id == campaign_id && pledge.status == PledgeStatus::Pending {
                pledge.status = PledgeStatus::Committed;
                pledge.updated_at = Utc::now();
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn find_committed(&self, campaign_id: Uuid) -> Result<Vec<Pledge>, PledgeError> {
        let pledges = self.pledges.lock().unwrap();
        let mut committed: Vec<Pledge> = pledges
            .values()
            .filter(|p| p.campaign_id == campaign_id && p.is_committed())
            .cloned()
            .collect();
        committed.sort_by_key(|p| p.created_at);
        Ok(committed)
    }

    async fn total_pledged_quantity(&self, campaign_id: Uuid) -> Result<i64, PledgeError> {
        let pledges = self.pledges.lock().unwrap();
        Ok(pledges
            .values()
            .filter(|p| p.campaign_id == campaign_id && p.is_active())
            .map(|p| p.quantity)
            .sum())
    }

    async fn committed_quantity(&self, campaign_id: Uuid) -> Result<i64, PledgeError> {
        let pledges = self.pledges.lock().unwrap();
        Ok(pledges
            .values()
            .filter(|p| p.campaign_id == campaign_id && p.is_committed())
            .map(|p| p.quantity)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with_pledge(quantity: i64) -> (InMemoryPledgeLedger, Pledge) {
        let ledger = InMemoryPledgeLedger::new();
        let pledge = Pledge::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), quantity);
        (ledger, pledge)
    }

    #[tokio::test]
    async fn one_active_pledge_per_org_per_campaign() {
        let (ledger, pledge) = ledger_with_pledge(30);
        let campaign_id = pledge.campaign_id;
        let org_id = pledge.buyer_org_id;
        ledger.place_pledge(pledge).await.unwrap();

        let second = Pledge::new(campaign_id, org_id, Uuid::new_v4(), 10);
        assert!(matches!(
            ledger.place_pledge(second).await,
            Err(PledgeError::DuplicatePledge)
        ));
    }

    #[tokio::test]
    async fn withdrawn_pledge_frees_the_slot() {
        let (ledger, pledge) = ledger_with_pledge(30);
        let campaign_id = pledge.campaign_id;
        let org_id = pledge.buyer_org_id;
        let placed = ledger.place_pledge(pledge).await.unwrap();
        ledger.withdraw(placed.id).await.unwrap();

        let again = Pledge::new(campaign_id, org_id, Uuid::new_v4(), 10);
        assert!(ledger.place_pledge(again).await.is_ok());
    }

    #[tokio::test]
    async fn quantity_mutable_only_while_pending() {
        let (ledger, pledge) = ledger_with_pledge(30);
        let campaign_id = pledge.campaign_id;
        let placed = ledger.place_pledge(pledge).await.unwrap();

        ledger.update_quantity(placed.id, 45).await.unwrap();
        ledger.commit_all_for_campaign(campaign_id).await.unwrap();

        assert!(matches!(
            ledger.update_quantity(placed.id, 60).await,
            Err(PledgeError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn commit_all_is_idempotent() {
        let (ledger, pledge) = ledger_with_pledge(30);
        let campaign_id = pledge.campaign_id;
        ledger.place_pledge(pledge).await.unwrap();
        ledger
            .place_pledge(Pledge::new(campaign_id, Uuid::new_v4(), Uuid::new_v4(), 90))
            .await
            .unwrap();

        assert_eq!(ledger.commit_all_for_campaign(campaign_id).await.unwrap(), 2);
        assert_eq!(ledger.commit_all_for_campaign(campaign_id).await.unwrap(), 0);
        assert_eq!(ledger.committed_quantity(campaign_id).await.unwrap(), 120);
    }

    #[tokio::test]
    async fn aggregates_skip_withdrawn() {
        let (ledger, pledge) = ledger_with_pledge(30);
        let campaign_id = pledge.campaign_id;
        let placed = ledger.place_pledge(pledge).await.unwrap();
        ledger
            .place_pledge(Pledge::new(campaign_id, Uuid::new_v4(), Uuid::new_v4(), 50))
            .await
            .unwrap();

        assert_eq!(ledger.total_pledged_quantity(campaign_id).await.unwrap(), 80);
        ledger.withdraw(placed.id).await.unwrap();
        assert_eq!(ledger.total_pledged_quantity(campaign_id).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn rejects_nonpositive_quantity() {
        let (ledger, pledge) = ledger_with_pledge(0);
        assert!(matches!(
            ledger.place_pledge(pledge).await,
            Err(PledgeError::InvalidQuantity(0))
        ));
    }
}

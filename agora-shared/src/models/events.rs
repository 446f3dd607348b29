use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct CampaignLockedEvent {
    pub campaign_id: Uuid,
    pub final_bracket_order: i32,
    pub committed_quantity: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct InvoiceIssuedEvent {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub campaign_id: Uuid,
    pub buyer_org_id: Uuid,
    pub total_amount: String, // Decimal serialized as string
    pub timestamp: i64,
}

/// Published on the first transition into SUCCEEDED; order materialization
/// consumes this downstream
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PaymentSucceededEvent {
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub pledge_id: Uuid,
    pub campaign_id: Uuid,
    pub buyer_org_id: Uuid,
    pub amount: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OverdueSweepEvent {
    pub count: u64,
    pub swept_on: String, // ISO date
    pub timestamp: i64,
}

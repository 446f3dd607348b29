use agora_shared::pii::Masked;
use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::CoreError;

/// Context handed to the order materializer once a payment has succeeded.
/// Carries the identifiers the fulfillment side needs without exposing the
/// billing internals.
#[derive(Debug, Clone)]
pub struct PaidPledgeContext {
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub pledge_id: Uuid,
    pub campaign_id: Uuid,
    pub buyer_org_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct OrderRef {
    pub order_id: Uuid,
}

/// Creates a fulfillment order from a successful payment. Best-effort
/// trigger: callers log failures and never unwind the payment.
#[async_trait]
pub trait OrderMaterializer: Send + Sync {
    async fn create_order_from_payment(&self, context: &PaidPledgeContext) -> Result<OrderRef, CoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    InvoiceIssued,
    PaymentReceived,
    PaymentFailed,
    InvoiceOverdue,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient_org_id: Uuid,
    pub recipient_email: Option<Masked<String>>,
    pub subject: String,
    pub body: String,
}

/// Fire-and-forget notification channel
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), CoreError>;
}

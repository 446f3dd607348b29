use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{Invoice, InvoiceStatus, Payment, PaymentStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Row not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Invoice insert payload; the store assigns id and invoice number
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub pledge_id: Uuid,
    pub campaign_id: Uuid,
    pub buyer_org_id: Uuid,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// Provider and error fields applied together with a payment transition
#[derive(Debug, Clone, Default)]
pub struct PaymentUpdate {
    pub provider_checkout_id: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub redirect_url: Option<String>,
    pub checkout_expires_at: Option<DateTime<Utc>>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
}

/// Outcome of an idempotency-key-protected insert
#[derive(Debug, Clone)]
pub enum PaymentInsert {
    Created(Payment),
    /// A concurrent duplicate submit won the insert; this is its row
    Existing(Payment),
}

/// Invoice persistence.
///
/// Implementations must make `insert_invoice` atomic with the month-sequence
/// lookup (one invoice per pledge, strictly increasing numbers per month) and
/// `transition_invoice` a compare-and-swap under the row lock.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Assigns `{prefix}-{YYYYMM}-{4-digit seq}` inside the insert
    /// transaction. A duplicate pledge id is a `Conflict`.
    async fn insert_invoice(&self, new: NewInvoice, prefix: &str) -> Result<Invoice, StoreError>;

    async fn find_invoice(&self, id: Uuid) -> Result<Invoice, StoreError>;

    async fn find_by_pledge(&self, pledge_id: Uuid) -> Result<Option<Invoice>, StoreError>;

    /// Guarded status move: fails with `Conflict` when the row is no longer
    /// in `expected`, so concurrent callers serialize instead of interleaving.
    async fn transition_invoice(
        &self,
        id: Uuid,
        expected: InvoiceStatus,
        to: InvoiceStatus,
        paid_date: Option<NaiveDate>,
    ) -> Result<Invoice, StoreError>;

    /// SENT with `due_date < today` → OVERDUE. Returns rows changed;
    /// running twice is a no-op.
    async fn mark_overdue(&self, today: NaiveDate) -> Result<u64, StoreError>;
}

/// Payment persistence.
///
/// The idempotency key carries a unique constraint; at most one SUCCEEDED
/// payment may exist per invoice (enforced on insert and on transition).
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_payment(&self, payment: Payment) -> Result<PaymentInsert, StoreError>;

    async fn find_payment(&self, id: Uuid) -> Result<Payment, StoreError>;

    async fn find_by_checkout(&self, checkout_id: &str) -> Result<Payment, StoreError>;

    /// Non-terminal payment holding the given idempotency key, if any
    async fn find_active_by_key(&self, key: &str) -> Result<Option<Payment>, StoreError>;

    async fn succeeded_payment_for_invoice(&self, invoice_id: Uuid) -> Result<Option<Payment>, StoreError>;

    async fn payments_for_invoice(&self, invoice_id: Uuid) -> Result<Vec<Payment>, StoreError>;

    /// Guarded status move, same contract as `transition_invoice`. Moving to
    /// SUCCEEDED when the invoice already has a successful payment is a
    /// `Conflict`.
    async fn transition_payment(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        to: PaymentStatus,
        update: PaymentUpdate,
    ) -> Result<Payment, StoreError>;
}

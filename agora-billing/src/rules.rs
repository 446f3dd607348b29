use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Whether freshly generated invoices go straight out or sit in draft
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceIssuePolicy {
    SendImmediately,
    HoldAsDraft,
}

/// Target invoice status after an admin records an offline payment.
///
/// Human-recorded payments default to awaiting bank reconciliation; the
/// direct-to-paid variant exists for deployments that treat the admin entry
/// as final.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfflinePaymentPolicy {
    PendingConfirmation,
    MarkPaid,
}

/// Billing business rules, loaded from configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingRules {
    pub invoice_prefix: String,
    /// e.g. 0.19 for 19% VAT
    pub vat_rate: Decimal,
    pub due_grace_days: i64,
    pub currency: String,
    pub issue_policy: InvoiceIssuePolicy,
    pub offline_policy: OfflinePaymentPolicy,
    /// Width of the online-payment idempotency window
    pub idempotency_bucket_secs: i64,
}

impl Default for BillingRules {
    fn default() -> Self {
        Self {
            invoice_prefix: "AGR".to_string(),
            vat_rate: Decimal::new(19, 2),
            due_grace_days: 14,
            currency: "EUR".to_string(),
            issue_policy: InvoiceIssuePolicy::SendImmediately,
            offline_policy: OfflinePaymentPolicy::PendingConfirmation,
            idempotency_bucket_secs: 60,
        }
    }
}

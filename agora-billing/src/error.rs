use rust_decimal::Decimal;
use uuid::Uuid;

use agora_core::gateway::GatewayError;
use agora_pledge::PledgeError;

use crate::models::{InvoiceStatus, PaymentStatus};
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(Uuid),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Invalid invoice transition from {from:?} to {to:?}")]
    InvalidInvoiceTransition {
        from: InvoiceStatus,
        to: InvoiceStatus,
    },

    #[error("Invalid payment transition from {from:?} to {to:?}")]
    InvalidPaymentTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Invoice in status {0:?} is not payable")]
    InvoiceNotPayable(InvoiceStatus),

    #[error("Payment in status {0:?} cannot be retried")]
    NotRetryable(PaymentStatus),

    #[error("Payment amount must equal the invoice total: expected {expected}, got {got}")]
    AmountMismatch { expected: Decimal, got: Decimal },

    #[error("Invoice already has a successful payment")]
    DuplicateSuccessfulPayment,

    #[error("Webhook signature verification failed")]
    InvalidWebhookSignature,

    #[error("Payment belongs to a different buyer")]
    OwnershipMismatch,

    #[error("Payment method {0} is not valid for this operation")]
    InvalidPaymentMethod(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Pledge ledger error: {0}")]
    Pledge(#[from] PledgeError),

    #[error("Billing storage error: {0}")]
    Store(#[from] StoreError),
}

use agora_core::gateway::PaymentProvider;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Invoice status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    PendingConfirmation,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    /// The transition table is data so tests can enumerate every pair
    pub fn allowed_transitions(&self) -> &'static [InvoiceStatus] {
        match self {
            InvoiceStatus::Draft => &[InvoiceStatus::Sent, InvoiceStatus::Cancelled],
            InvoiceStatus::Sent => &[
                InvoiceStatus::Paid,
                InvoiceStatus::PendingConfirmation,
                InvoiceStatus::Overdue,
                InvoiceStatus::Cancelled,
            ],
            InvoiceStatus::PendingConfirmation => &[InvoiceStatus::Paid, InvoiceStatus::Cancelled],
            InvoiceStatus::Overdue => &[InvoiceStatus::Paid, InvoiceStatus::Cancelled],
            InvoiceStatus::Paid | InvoiceStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, to: InvoiceStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Online and offline collection both require a payable invoice
    pub fn is_payable(&self) -> bool {
        !matches!(
            self,
            InvoiceStatus::Paid | InvoiceStatus::Cancelled | InvoiceStatus::Draft
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Sent => "SENT",
            InvoiceStatus::PendingConfirmation => "PENDING_CONFIRMATION",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Overdue => "OVERDUE",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(InvoiceStatus::Draft),
            "SENT" => Some(InvoiceStatus::Sent),
            "PENDING_CONFIRMATION" => Some(InvoiceStatus::PendingConfirmation),
            "PAID" => Some(InvoiceStatus::Paid),
            "OVERDUE" => Some(InvoiceStatus::Overdue),
            "CANCELLED" => Some(InvoiceStatus::Cancelled),
            _ => None,
        }
    }
}

/// One invoice per committed pledge; never deleted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
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
    pub paid_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payment status for one collection attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Cancelled,
    Expired,
    Refunded,
}

impl PaymentStatus {
    pub fn allowed_transitions(&self) -> &'static [PaymentStatus] {
        match self {
            PaymentStatus::Pending => &[
                PaymentStatus::Processing,
                PaymentStatus::Failed,
                PaymentStatus::Cancelled,
            ],
            PaymentStatus::Processing => &[
                PaymentStatus::Succeeded,
                PaymentStatus::Failed,
                PaymentStatus::Cancelled,
                PaymentStatus::Expired,
            ],
            // Refunds are recorded externally against a succeeded attempt
            PaymentStatus::Succeeded => &[PaymentStatus::Refunded],
            PaymentStatus::Failed
            | PaymentStatus::Cancelled
            | PaymentStatus::Expired
            | PaymentStatus::Refunded => &[],
        }
    }

    pub fn can_transition_to(&self, to: PaymentStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// Terminal attempts are never mutated; retries create new rows
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Succeeded
                | PaymentStatus::Failed
                | PaymentStatus::Cancelled
                | PaymentStatus::Expired
                | PaymentStatus::Refunded
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Succeeded => "SUCCEEDED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Expired => "EXPIRED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "PROCESSING" => Some(PaymentStatus::Processing),
            "SUCCEEDED" => Some(PaymentStatus::Succeeded),
            "FAILED" => Some(PaymentStatus::Failed),
            "CANCELLED" => Some(PaymentStatus::Cancelled),
            "EXPIRED" => Some(PaymentStatus::Expired),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// How the money moved
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    BankTransfer,
    Cash,
    Check,
    PaymentGateway,
}

impl PaymentMethod {
    pub fn is_offline(&self) -> bool {
        !matches!(self, PaymentMethod::PaymentGateway)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Check => "CHECK",
            PaymentMethod::PaymentGateway => "PAYMENT_GATEWAY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BANK_TRANSFER" => Some(PaymentMethod::BankTransfer),
            "CASH" => Some(PaymentMethod::Cash),
            "CHECK" => Some(PaymentMethod::Check),
            "PAYMENT_GATEWAY" => Some(PaymentMethod::PaymentGateway),
            _ => None,
        }
    }
}

/// One collection attempt against an invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub buyer_user_id: Uuid,
    pub buyer_org_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub provider: Option<PaymentProvider>,
    pub provider_checkout_id: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Unique per in-flight online attempt; `None` for offline payments
    pub idempotency_key: Option<String>,
    pub redirect_url: Option<String>,
    pub checkout_expires_at: Option<DateTime<Utc>>,
    pub payment_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// Admin who recorded an offline payment
    pub recorded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Fresh online attempt, not yet handed to the gateway
    pub fn new_online(
        invoice: &Invoice,
        buyer_user_id: Uuid,
        provider: PaymentProvider,
        idempotency_key: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            invoice_id: invoice.id,
            buyer_user_id,
            buyer_org_id: invoice.buyer_org_id,
            amount: invoice.total_amount,
            currency: invoice.currency.clone(),
            method: PaymentMethod::PaymentGateway,
            status: PaymentStatus::Pending,
            provider: Some(provider),
            provider_checkout_id: None,
            provider_transaction_id: None,
            error_code: None,
            error_message: None,
            idempotency_key: Some(idempotency_key),
            redirect_url: None,
            checkout_expires_at: None,
            payment_date: None,
            notes: None,
            recorded_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Offline collection is asserted fact, so the row is born succeeded
    pub fn new_offline(
        invoice: &Invoice,
        buyer_user_id: Uuid,
        method: PaymentMethod,
        payment_date: DateTime<Utc>,
        notes: Option<String>,
        recorded_by: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            invoice_id: invoice.id,
            buyer_user_id,
            buyer_org_id: invoice.buyer_org_id,
            amount: invoice.total_amount,
            currency: invoice.currency.clone(),
            method,
            status: PaymentStatus::Succeeded,
            provider: None,
            provider_checkout_id: None,
            provider_transaction_id: None,
            error_code: None,
            error_message: None,
            idempotency_key: None,
            redirect_url: None,
            checkout_expires_at: None,
            payment_date: Some(payment_date),
            notes,
            recorded_by: Some(recorded_by),
            created_at: now,
            updated_at: now,
        }
    }

    /// Checkout details, present once the gateway session exists
    pub fn checkout_info(&self) -> Option<CheckoutInfo> {
        match (&self.provider_checkout_id, &self.redirect_url, self.checkout_expires_at) {
            (Some(checkout_id), Some(redirect_url), Some(expires_at)) => Some(CheckoutInfo {
                payment_id: self.id,
                checkout_id: checkout_id.clone(),
                redirect_url: redirect_url.clone(),
                expires_at,
            }),
            _ => None,
        }
    }
}

/// What the buyer's browser needs to finish an online payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutInfo {
    pub payment_id: Uuid,
    pub checkout_id: String,
    pub redirect_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Admin-entered record of money collected outside the gateway
#[derive(Debug, Clone, Deserialize)]
pub struct OfflinePaymentRequest {
    pub buyer_user_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub payment_date: DateTime<Utc>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVOICE_STATES: [InvoiceStatus; 6] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::PendingConfirmation,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Cancelled,
    ];

    const PAYMENT_STATES: [PaymentStatus; 7] = [
        PaymentStatus::Pending,
        PaymentStatus::Processing,
        PaymentStatus::Succeeded,
        PaymentStatus::Failed,
        PaymentStatus::Cancelled,
        PaymentStatus::Expired,
        PaymentStatus::Refunded,
    ];

    #[test]
    fn invoice_transition_table_is_exhaustive() {
        for from in INVOICE_STATES {
            for to in INVOICE_STATES {
                let allowed = from.can_transition_to(to);
                let expected = matches!(
                    (from, to),
                    (InvoiceStatus::Draft, InvoiceStatus::Sent)
                        | (InvoiceStatus::Draft, InvoiceStatus::Cancelled)
                        | (InvoiceStatus::Sent, InvoiceStatus::Paid)
                        | (InvoiceStatus::Sent, InvoiceStatus::PendingConfirmation)
                        | (InvoiceStatus::Sent, InvoiceStatus::Overdue)
                        | (InvoiceStatus::Sent, InvoiceStatus::Cancelled)
                        | (InvoiceStatus::PendingConfirmation, InvoiceStatus::Paid)
                        | (InvoiceStatus::PendingConfirmation, InvoiceStatus::Cancelled)
                        | (InvoiceStatus::Overdue, InvoiceStatus::Paid)
                        | (InvoiceStatus::Overdue, InvoiceStatus::Cancelled)
                );
                assert_eq!(allowed, expected, "invoice {:?} -> {:?}", from, to);
            }
        }
    }

    #[test]
    fn payment_transition_table_is_exhaustive() {
        for from in PAYMENT_STATES {
            for to in PAYMENT_STATES {
                let allowed = from.can_transition_to(to);
                let expected = matches!(
                    (from, to),
                    (PaymentStatus::Pending, PaymentStatus::Processing)
                        | (PaymentStatus::Pending, PaymentStatus::Failed)
                        | (PaymentStatus::Pending, PaymentStatus::Cancelled)
                        | (PaymentStatus::Processing, PaymentStatus::Succeeded)
                        | (PaymentStatus::Processing, PaymentStatus::Failed)
                        | (PaymentStatus::Processing, PaymentStatus::Cancelled)
                        | (PaymentStatus::Processing, PaymentStatus::Expired)
                        | (PaymentStatus::Succeeded, PaymentStatus::Refunded)
                );
                assert_eq!(allowed, expected, "payment {:?} -> {:?}", from, to);
            }
        }
    }

    #[test]
    fn terminal_and_retryable_flags() {
        assert!(PaymentStatus::Succeeded.is_terminal());
        assert!(PaymentStatus::Refunded.is_terminal());
        assert!(!PaymentStatus::Processing.is_terminal());
        assert!(PaymentStatus::Failed.is_retryable());
        assert!(PaymentStatus::Expired.is_retryable());
        assert!(!PaymentStatus::Succeeded.is_retryable());
        assert!(!PaymentStatus::Cancelled.is_retryable());
    }

    #[test]
    fn payable_excludes_paid_cancelled_draft() {
        assert!(InvoiceStatus::Sent.is_payable());
        assert!(InvoiceStatus::Overdue.is_payable());
        assert!(InvoiceStatus::PendingConfirmation.is_payable());
        assert!(!InvoiceStatus::Paid.is_payable());
        assert!(!InvoiceStatus::Cancelled.is_payable());
        assert!(!InvoiceStatus::Draft.is_payable());
    }
}

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{Invoice, InvoiceStatus, Payment, PaymentStatus};
use crate::store::{InvoiceStore, NewInvoice, PaymentInsert, PaymentStore, PaymentUpdate, StoreError};

#[derive(Default)]
struct BillingState {
    invoices: HashMap<Uuid, Invoice>,
    payments: HashMap<Uuid, Payment>,
}

/// In-memory billing store mirroring the Postgres contracts: month-scoped
/// invoice numbering, unique idempotency keys for in-flight payments, at most
/// one successful payment per invoice, compare-and-swap transitions. Used by
/// tests and local wiring.
#[derive(Default)]
pub struct InMemoryBillingStore {
    state: Mutex<BillingState>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_invoice_number(state: &BillingState, prefix: &str, issue_date: NaiveDate) -> String {
        let month_prefix = format!("{}-{}", prefix, issue_date.format("%Y%m"));
        let max_seq = state
            .invoices
            .values()
            .filter_map(|inv| inv.invoice_number.strip_prefix(&month_prefix))
            .filter_map(|rest| rest.strip_prefix('-'))
            .filter_map(|seq| seq.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        format!("{}-{:04}", month_prefix, max_seq + 1)
    }
}

#[async_trait]
impl InvoiceStore for InMemoryBillingStore {
    async fn insert_invoice(&self, new: NewInvoice, prefix: &str) -> Result<Invoice, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.invoices.values().any(|inv| inv.pledge_id == new.pledge_id) {
            return Err(StoreError::Conflict(format!(
                "invoice already exists for pledge {}",
                new.pledge_id
            )));
        }
        let invoice_number = Self::next_invoice_number(&state, prefix, new.issue_date);
        let now = Utc::now();
        let invoice = Invoice {
            id: Uuid::new_v4(),
            invoice_number,
            pledge_id: new.pledge_id,
            campaign_id: new.campaign_id,
            buyer_org_id: new.buyer_org_id,
            subtotal: new.subtotal,
            tax_amount: new.tax_amount,
            total_amount: new.total_amount,
            currency: new.currency,
            status: new.status,
            issue_date: new.issue_date,
            due_date: new.due_date,
            paid_date: None,
            created_at: now,
            updated_at: now,
        };
        state.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    async fn find_invoice(&self, id: Uuid) -> Result<Invoice, StoreError> {
        let state = self.state.lock().unwrap();
        state.invoices.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn find_by_pledge(&self, pledge_id: Uuid) -> Result<Option<Invoice>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .invoices
            .values()
            .find(|inv| inv.pledge_id == pledge_id)
            .cloned())
    }

    async fn transition_invoice(
        &self,
        id: Uuid,
        expected: InvoiceStatus,
        to: InvoiceStatus,
        paid_date: Option<NaiveDate>,
    ) -> Result<Invoice, StoreError> {
        let mut state = self.state.lock().unwrap();
        let invoice = state.invoices.get_mut(&id).ok_or(StoreError::NotFound)?;
        if invoice.status != expected {
            return Err(StoreError::Conflict(format!(
                "invoice is {:?}, expected {:?}",
                invoice.status, expected
            )));
        }
        invoice.status = to;
        if paid_date.is_some() {
            invoice.paid_date = paid_date;
        }
        invoice.updated_at = Utc::now();
        Ok(invoice.clone())
    }

    async fn mark_overdue(&self, today: NaiveDate) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        let mut changed = 0;
        for invoice in state.invoices.values_mut() {
            if invoice.status == InvoiceStatus::Sent && invoice.due_date < today {
                invoice.status = InvoiceStatus::Overdue;
                invoice.updated_at = Utc::now();
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl PaymentStore for InMemoryBillingStore {
    async fn insert_payment(&self, payment: Payment) -> Result<PaymentInsert, StoreError> {
        let mut state = self.state.lock().unwrap();

        // Unique in-flight attempt per idempotency key
        if let Some(key) = &payment.idempotency_key {
            if let Some(existing) = state
                .payments
                .values()
                .find(|p| p.idempotency_key.as_deref() == Some(key) && !p.status.is_terminal())
            {
                return Ok(PaymentInsert::Existing(existing.clone()));
            }
        }

        // Inserting an already-succeeded row (offline path) must respect the
        // one-successful-payment-per-invoice constraint
        if payment.status == PaymentStatus::Succeeded
            && state
                .payments
                .values()
                .any(|p| p.invoice_id == payment.invoice_id && p.status == PaymentStatus::Succeeded)
        {
            return Err(StoreError::Conflict(
                "invoice already has a successful payment".to_string(),
            ));
        }

        state.payments.insert(payment.id, payment.clone());
        Ok(PaymentInsert::Created(payment))
    }

    async fn find_payment(&self, id: Uuid) -> Result<Payment, StoreError> {
        let state = self.state.lock().unwrap();
        state.payments.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn find_by_checkout(&self, checkout_id: &str) -> Result<Payment, StoreError> {
        let state = self.state.lock().unwrap();
        state
            .payments
            .values()
            .filter(|p| p.provider_checkout_id.as_deref() == Some(checkout_id))
            .max_by_key(|p| p.created_at)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_active_by_key(&self, key: &str) -> Result<Option<Payment>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .payments
            .values()
            .find(|p| p.idempotency_key.as_deref() == Some(key) && !p.status.is_terminal())
            .cloned())
    }

    async fn succeeded_payment_for_invoice(&self, invoice_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .payments
            .values()
            .find(|p| p.invoice_id == invoice_id && p.status == PaymentStatus::Succeeded)
            .cloned())
    }

    async fn payments_for_invoice(&self, invoice_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| p.invoice_id == invoice_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn transition_payment(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        to: PaymentStatus,
        update: PaymentUpdate,
    ) -> Result<Payment, StoreError> {
        let mut state = self.state.lock().unwrap();

        if to == PaymentStatus::Succeeded {
            let invoice_id = state
                .payments
                .get(&id)
                .ok_or(StoreError::NotFound)?
                .invoice_id;
            if state
                .payments
                .values()
                .any(|p| p.id != id && p.invoice_id == invoice_id && p.status == PaymentStatus::Succeeded)
            {
                return Err(StoreError::Conflict(
                    "invoice already has a successful payment".to_string(),
                ));
            }
        }

        let payment = state.payments.get_mut(&id).ok_or(StoreError::NotFound)?;
        if payment.status != expected {
            return Err(StoreError::Conflict(format!(
                "payment is {:?}, expected {:?}",
                payment.status, expected
            )));
        }
        payment.status = to;
        if update.provider_checkout_id.is_some() {
            payment.provider_checkout_id = update.provider_checkout_id;
        }
        if update.provider_transaction_id.is_some() {
            payment.provider_transaction_id = update.provider_transaction_id;
        }
        if update.redirect_url.is_some() {
            payment.redirect_url = update.redirect_url;
        }
        if update.checkout_expires_at.is_some() {
            payment.checkout_expires_at = update.checkout_expires_at;
        }
        if update.error_code.is_some() {
            payment.error_code = update.error_code;
        }
        if update.error_message.is_some() {
            payment.error_message = update.error_message;
        }
        if update.payment_date.is_some() {
            payment.payment_date = update.payment_date;
        }
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }
}

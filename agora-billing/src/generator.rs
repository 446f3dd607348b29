use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use agora_campaign::brackets::DiscountBracket;
use agora_core::collab::{Notification, NotificationDispatcher, NotificationKind};
use agora_pledge::PledgeStore;

use crate::error::BillingError;
use crate::models::{Invoice, InvoiceStatus};
use crate::rules::{BillingRules, InvoiceIssuePolicy};
use crate::store::{InvoiceStore, NewInvoice, StoreError};

/// Turns a locked campaign's committed pledges into invoices, exactly one
/// per pledge
pub struct InvoiceGenerator {
    invoices: Arc<dyn InvoiceStore>,
    pledges: Arc<dyn PledgeStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    rules: BillingRules,
}

impl InvoiceGenerator {
    pub fn new(
        invoices: Arc<dyn InvoiceStore>,
        pledges: Arc<dyn PledgeStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        rules: BillingRules,
    ) -> Self {
        Self {
            invoices,
            pledges,
            notifier,
            rules,
        }
    }

    /// Generate invoices for every committed pledge of a locked campaign.
    ///
    /// Safe to call repeatedly: pledges that already carry an invoice are
    /// returned as-is, so a retry after partial failure completes the set
    /// without duplicating anything.
    pub async fn generate_invoices_for_campaign(
        &self,
        campaign_id: Uuid,
        final_bracket: &DiscountBracket,
    ) -> Result<Vec<Invoice>, BillingError> {
        let committed = self.pledges.find_committed(campaign_id).await?;
        let mut invoices = Vec::with_capacity(committed.len());

        for pledge in committed {
            if let Some(existing) = self.invoices.find_by_pledge(pledge.id).await? {
                invoices.push(existing);
                continue;
            }

            let subtotal = final_bracket.unit_price * Decimal::from(pledge.quantity);
            let tax_amount = (subtotal * self.rules.vat_rate).round_dp(2);
            let total_amount = subtotal + tax_amount;
            let issue_date = Utc::now().date_naive();
            let status = match self.rules.issue_policy {
                InvoiceIssuePolicy::SendImmediately => InvoiceStatus::Sent,
                InvoiceIssuePolicy::HoldAsDraft => InvoiceStatus::Draft,
            };

            let new = NewInvoice {
                pledge_id: pledge.id,
                campaign_id,
                buyer_org_id: pledge.buyer_org_id,
                subtotal,
                tax_amount,
                total_amount,
                currency: self.rules.currency.clone(),
                status,
                issue_date,
                due_date: issue_date + Duration::days(self.rules.due_grace_days),
            };

            let invoice = match self.invoices.insert_invoice(new, &self.rules.invoice_prefix).await {
                Ok(invoice) => {
                    self.notify_issued(&invoice).await;
                    invoice
                }
                // A concurrent generation won the insert for this pledge
                Err(StoreError::Conflict(_)) => self
                    .invoices
                    .find_by_pledge(pledge.id)
                    .await?
                    .ok_or(StoreError::NotFound)?,
                Err(e) => return Err(e.into()),
            };

            invoices.push(invoice);
        }

        tracing::info!(
            campaign_id = %campaign_id,
            count = invoices.len(),
            "Invoice generation completed"
        );
        Ok(invoices)
    }

    /// Draft → Sent
    pub async fn send_invoice(&self, invoice_id: Uuid) -> Result<Invoice, BillingError> {
        self.transition(invoice_id, InvoiceStatus::Sent).await
    }

    pub async fn cancel_invoice(&self, invoice_id: Uuid) -> Result<Invoice, BillingError> {
        self.transition(invoice_id, InvoiceStatus::Cancelled).await
    }

    pub async fn find_invoice(&self, invoice_id: Uuid) -> Result<Invoice, BillingError> {
        self.invoices.find_invoice(invoice_id).await.map_err(|e| match e {
            StoreError::NotFound => BillingError::InvoiceNotFound(invoice_id),
            other => other.into(),
        })
    }

    async fn transition(&self, invoice_id: Uuid, to: InvoiceStatus) -> Result<Invoice, BillingError> {
        let invoice = self.find_invoice(invoice_id).await?;
        if !invoice.status.can_transition_to(to) {
            return Err(BillingError::InvalidInvoiceTransition {
                from: invoice.status,
                to,
            });
        }
        match self
            .invoices
            .transition_invoice(invoice_id, invoice.status, to, None)
            .await
        {
            Ok(invoice) => Ok(invoice),
            // Someone moved the row between our read and the swap
            Err(StoreError::Conflict(_)) => {
                let current = self.find_invoice(invoice_id).await?;
                Err(BillingError::InvalidInvoiceTransition {
                    from: current.status,
                    to,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn notify_issued(&self, invoice: &Invoice) {
        let notification = Notification {
            kind: NotificationKind::InvoiceIssued,
            recipient_org_id: invoice.buyer_org_id,
            recipient_email: None,
            subject: format!("Invoice {} issued", invoice.invoice_number),
            body: format!(
                "Invoice {} over {} {} is due on {}.",
                invoice.invoice_number, invoice.total_amount, invoice.currency, invoice.due_date
            ),
        };
        if let Err(e) = self.notifier.send(notification).await {
            tracing::warn!(
                invoice_id = %invoice.id,
                error = %e,
                "Invoice notification failed; invoice stands"
            );
        }
    }
}

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use agora_core::collab::{
    Notification, NotificationDispatcher, NotificationKind, OrderMaterializer, PaidPledgeContext,
};
use agora_core::gateway::{
    CheckoutRequest, GatewayError, GatewayPaymentStatus, GatewayRegistry, PaymentProvider,
};

use crate::error::BillingError;
use crate::models::{
    CheckoutInfo, Invoice, InvoiceStatus, OfflinePaymentRequest, Payment, PaymentStatus,
};
use crate::rules::{BillingRules, OfflinePaymentPolicy};
use crate::store::{InvoiceStore, PaymentInsert, PaymentStore, PaymentUpdate, StoreError};

/// Scope duplicate rapid submissions to the same in-flight attempt.
///
/// The coarse time bucket is a deliberate heuristic: a request arriving just
/// past a bucket boundary opens a fresh attempt.
pub fn idempotency_key(invoice_id: Uuid, buyer_user_id: Uuid, at: DateTime<Utc>, bucket_secs: i64) -> String {
    let bucket = at.timestamp() / bucket_secs.max(1);
    format!("{}:{}:{}", invoice_id.simple(), buyer_user_id.simple(), bucket)
}

/// Drives payments to a terminal state and the owning invoice forward.
///
/// Every mutation goes through the stores' compare-and-swap transitions, so
/// the browser return path, the provider webhook, and duplicate submits can
/// interleave freely: exactly one caller performs each transition, the rest
/// observe it.
pub struct PaymentProcessor {
    invoices: Arc<dyn InvoiceStore>,
    payments: Arc<dyn PaymentStore>,
    gateways: Arc<GatewayRegistry>,
    default_provider: PaymentProvider,
    materializer: Arc<dyn OrderMaterializer>,
    notifier: Arc<dyn NotificationDispatcher>,
    rules: BillingRules,
}

impl PaymentProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        invoices: Arc<dyn InvoiceStore>,
        payments: Arc<dyn PaymentStore>,
        gateways: Arc<GatewayRegistry>,
        default_provider: PaymentProvider,
        materializer: Arc<dyn OrderMaterializer>,
        notifier: Arc<dyn NotificationDispatcher>,
        rules: BillingRules,
    ) -> Self {
        Self {
            invoices,
            payments,
            gateways,
            default_provider,
            materializer,
            notifier,
            rules,
        }
    }

    /// Open (or re-surface) a gateway checkout for an invoice.
    ///
    /// Duplicate submissions inside the idempotency window get the existing
    /// checkout back instead of a second one.
    pub async fn initiate_online_payment(
        &self,
        invoice_id: Uuid,
        buyer_user_id: Uuid,
    ) -> Result<CheckoutInfo, BillingError> {
        let invoice = self.fetch_invoice(invoice_id).await?;
        if !invoice.status.is_payable() {
            return Err(BillingError::InvoiceNotPayable(invoice.status));
        }

        let key = idempotency_key(
            invoice_id,
            buyer_user_id,
            Utc::now(),
            self.rules.idempotency_bucket_secs,
        );

        let pending = match self.payments.find_active_by_key(&key).await? {
            Some(existing) => existing,
            None => {
                let fresh = Payment::new_online(&invoice, buyer_user_id, self.default_provider, key);
                match self.payments.insert_payment(fresh).await? {
                    PaymentInsert::Created(p) => p,
                    // Lost the insert race against a duplicate submit
                    PaymentInsert::Existing(p) => p,
                }
            }
        };

        if let Some(info) = pending.checkout_info() {
            return Ok(info);
        }

        self.open_checkout(&invoice, pending).await
    }

    /// Reconcile from the buyer's browser redirect. Idempotent: a payment
    /// already terminal is returned untouched.
    pub async fn process_gateway_return(&self, checkout_id: &str) -> Result<Payment, BillingError> {
        let payment = self.fetch_payment_by_checkout(checkout_id).await?;
        if payment.status.is_terminal() {
            return Ok(payment);
        }

        let provider = payment
            .provider
            .ok_or_else(|| GatewayError::UnsupportedProvider("none".to_string()))?;
        let gateway = self.gateways.get(provider)?;
        let status = gateway.get_payment_status(checkout_id).await?;

        self.apply_gateway_status(payment, status, None).await
    }

    /// Reconcile from a signed provider webhook. Races freely with the
    /// return path; whoever transitions first wins, the other no-ops.
    pub async fn handle_webhook(
        &self,
        provider: PaymentProvider,
        payload: &[u8],
        signature: &str,
    ) -> Result<(), BillingError> {
        let gateway = self.gateways.get(provider)?;
        if !gateway.verify_webhook_signature(payload, signature) {
            return Err(BillingError::InvalidWebhookSignature);
        }
        let event = gateway.parse_webhook_payload(payload)?;

        let payment = self.fetch_payment_by_checkout(&event.checkout_id).await?;
        if payment.status.is_terminal() {
            tracing::debug!(
                payment_id = %payment.id,
                checkout_id = %event.checkout_id,
                "Webhook for terminal payment ignored"
            );
            return Ok(());
        }

        self.apply_gateway_status(payment, event.status, event.provider_transaction_id)
            .await?;
        Ok(())
    }

    /// Record money collected outside the gateway. The payment row is born
    /// succeeded; the invoice advances per the configured offline policy.
    pub async fn record_offline_payment(
        &self,
        invoice_id: Uuid,
        request: OfflinePaymentRequest,
        recorded_by: Uuid,
    ) -> Result<Payment, BillingError> {
        let invoice = self.fetch_invoice(invoice_id).await?;

        if self
            .payments
            .succeeded_payment_for_invoice(invoice_id)
            .await?
            .is_some()
        {
            return Err(BillingError::DuplicateSuccessfulPayment);
        }
        if !invoice.status.is_payable() {
            return Err(BillingError::InvoiceNotPayable(invoice.status));
        }
        if !request.method.is_offline() {
            return Err(BillingError::InvalidPaymentMethod(
                "PAYMENT_GATEWAY".to_string(),
            ));
        }
        // No partial payments in this model, down to the cent
        if request.amount != invoice.total_amount {
            return Err(BillingError::AmountMismatch {
                expected: invoice.total_amount,
                got: request.amount,
            });
        }

        let payment = Payment::new_offline(
            &invoice,
            request.buyer_user_id,
            request.method,
            request.payment_date,
            request.notes,
            recorded_by,
        );
        let payment = match self.payments.insert_payment(payment).await {
            Ok(PaymentInsert::Created(p)) | Ok(PaymentInsert::Existing(p)) => p,
            // Raced with another successful collection for this invoice
            Err(StoreError::Conflict(_)) => return Err(BillingError::DuplicateSuccessfulPayment),
            Err(e) => return Err(e.into()),
        };

        let target = match self.rules.offline_policy {
            OfflinePaymentPolicy::PendingConfirmation => InvoiceStatus::PendingConfirmation,
            OfflinePaymentPolicy::MarkPaid => InvoiceStatus::Paid,
        };
        // Overdue invoices settle straight to paid; the table has no
        // OVERDUE → PENDING_CONFIRMATION edge
        let target = if invoice.status.can_transition_to(target) {
            target
        } else {
            InvoiceStatus::Paid
        };
        self.advance_invoice(invoice.id, target).await?;
        self.run_post_success(&payment).await;

        Ok(payment)
    }

    /// Confirm a human-recorded payment once the bank statement backs it up
    pub async fn confirm_offline_payment(&self, invoice_id: Uuid) -> Result<Invoice, BillingError> {
        let invoice = self.fetch_invoice(invoice_id).await?;
        if invoice.status != InvoiceStatus::PendingConfirmation {
            return Err(BillingError::InvalidInvoiceTransition {
                from: invoice.status,
                to: InvoiceStatus::Paid,
            });
        }
        match self
            .invoices
            .transition_invoice(
                invoice_id,
                InvoiceStatus::PendingConfirmation,
                InvoiceStatus::Paid,
                Some(Utc::now().date_naive()),
            )
            .await
        {
            Ok(invoice) => Ok(invoice),
            Err(StoreError::Conflict(_)) => {
                let current = self.fetch_invoice(invoice_id).await?;
                Err(BillingError::InvalidInvoiceTransition {
                    from: current.status,
                    to: InvoiceStatus::Paid,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// A fresh attempt after a failed or expired one. Ownership is checked
    /// against the prior attempt before delegating.
    pub async fn retry_payment(
        &self,
        payment_id: Uuid,
        buyer_user_id: Uuid,
    ) -> Result<CheckoutInfo, BillingError> {
        let prior = self.payments.find_payment(payment_id).await.map_err(|e| match e {
            StoreError::NotFound => BillingError::PaymentNotFound(payment_id.to_string()),
            other => other.into(),
        })?;

        if prior.buyer_user_id != buyer_user_id {
            return Err(BillingError::OwnershipMismatch);
        }
        if !prior.status.is_retryable() {
            return Err(BillingError::NotRetryable(prior.status));
        }

        self.initiate_online_payment(prior.invoice_id, buyer_user_id).await
    }

    /// Scheduled sweep: SENT past due → OVERDUE. Running twice changes
    /// nothing further.
    pub async fn mark_overdue_invoices(&self, today: chrono::NaiveDate) -> Result<u64, BillingError> {
        let count = self.invoices.mark_overdue(today).await?;
        if count > 0 {
            tracing::info!(count, "Marked invoices overdue");
        }
        Ok(count)
    }

    pub async fn payments_for_invoice(&self, invoice_id: Uuid) -> Result<Vec<Payment>, BillingError> {
        Ok(self.payments.payments_for_invoice(invoice_id).await?)
    }

    async fn open_checkout(&self, invoice: &Invoice, payment: Payment) -> Result<CheckoutInfo, BillingError> {
        let provider = payment.provider.unwrap_or(self.default_provider);
        let gateway = self.gateways.get(provider)?;

        let request = CheckoutRequest {
            payment_id: payment.id,
            invoice_number: invoice.invoice_number.clone(),
            amount: payment.amount,
            currency: payment.currency.clone(),
            idempotency_key: payment.idempotency_key.clone().unwrap_or_default(),
        };

        match gateway.create_checkout(&request).await {
            Ok(session) => {
                let update = PaymentUpdate {
                    provider_checkout_id: Some(session.checkout_id),
                    redirect_url: Some(session.redirect_url),
                    checkout_expires_at: Some(session.expires_at),
                    ..Default::default()
                };
                match self
                    .payments
                    .transition_payment(payment.id, PaymentStatus::Pending, PaymentStatus::Processing, update)
                    .await
                {
                    Ok(updated) => updated.checkout_info().ok_or_else(|| {
                        StoreError::Backend("checkout fields missing after transition".to_string()).into()
                    }),
                    // A concurrent initiation attached its session first
                    Err(StoreError::Conflict(_)) => {
                        let current = self.payments.find_payment(payment.id).await?;
                        current
                            .checkout_info()
                            .ok_or(BillingError::PaymentNotFound(payment.id.to_string()))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Err(gateway_error) => {
                // Park the row in an explicit, retryable state before
                // surfacing the upstream failure
                let update = PaymentUpdate {
                    error_code: Some("GATEWAY_UNAVAILABLE".to_string()),
                    error_message: Some(gateway_error.to_string()),
                    ..Default::default()
                };
                if let Err(e) = self
                    .payments
                    .transition_payment(payment.id, PaymentStatus::Pending, PaymentStatus::Failed, update)
                    .await
                {
                    tracing::error!(
                        payment_id = %payment.id,
                        error = %e,
                        "Could not park payment as failed after gateway error"
                    );
                }
                Err(BillingError::Gateway(gateway_error))
            }
        }
    }

    async fn apply_gateway_status(
        &self,
        payment: Payment,
        status: GatewayPaymentStatus,
        provider_transaction_id: Option<String>,
    ) -> Result<Payment, BillingError> {
        let target = match status {
            // Provider not done yet; nothing to record
            GatewayPaymentStatus::Pending => return Ok(payment),
            GatewayPaymentStatus::Succeeded => PaymentStatus::Succeeded,
            GatewayPaymentStatus::Failed => PaymentStatus::Failed,
            GatewayPaymentStatus::Cancelled => PaymentStatus::Cancelled,
            GatewayPaymentStatus::Expired => PaymentStatus::Expired,
        };
        self.finalize_payment(payment, target, provider_transaction_id).await
    }

    /// Guarded check-then-transition into a terminal state. Exactly one of
    /// the racing reconciliation paths performs the move; the others get the
    /// already-final row back.
    async fn finalize_payment(
        &self,
        mut payment: Payment,
        target: PaymentStatus,
        provider_transaction_id: Option<String>,
    ) -> Result<Payment, BillingError> {
        // A row the initiation path never marked processing (crash between
        // checkout creation and the status swap) is promoted first
        if payment.status == PaymentStatus::Pending {
            payment = match self
                .payments
                .transition_payment(
                    payment.id,
                    PaymentStatus::Pending,
                    PaymentStatus::Processing,
                    PaymentUpdate::default(),
                )
                .await
            {
                Ok(p) => p,
                Err(StoreError::Conflict(_)) => self.payments.find_payment(payment.id).await?,
                Err(e) => return Err(e.into()),
            };
            if payment.status.is_terminal() {
                return Ok(payment);
            }
        }

        if !payment.status.can_transition_to(target) {
            return Err(BillingError::InvalidPaymentTransition {
                from: payment.status,
                to: target,
            });
        }

        if target == PaymentStatus::Succeeded {
            if let Some(other) = self.payments.succeeded_payment_for_invoice(payment.invoice_id).await? {
                if other.id != payment.id {
                    return Err(BillingError::DuplicateSuccessfulPayment);
                }
            }
        }

        let update = PaymentUpdate {
            provider_transaction_id,
            payment_date: (target == PaymentStatus::Succeeded).then(Utc::now),
            ..Default::default()
        };
        let finalized = match self
            .payments
            .transition_payment(payment.id, payment.status, target, update)
            .await
        {
            Ok(p) => p,
            Err(StoreError::Conflict(_)) => {
                let current = self.payments.find_payment(payment.id).await?;
                if current.status.is_terminal() {
                    // The concurrent reconciliation path won; nothing left to do
                    return Ok(current);
                }
                if target == PaymentStatus::Succeeded {
                    return Err(BillingError::DuplicateSuccessfulPayment);
                }
                return Err(BillingError::InvalidPaymentTransition {
                    from: current.status,
                    to: target,
                });
            }
            Err(e) => return Err(e.into()),
        };

        match finalized.status {
            PaymentStatus::Succeeded => {
                self.settle_invoice(&finalized).await?;
                self.run_post_success(&finalized).await;
            }
            PaymentStatus::Failed | PaymentStatus::Expired => {
                self.notify(
                    NotificationKind::PaymentFailed,
                    finalized.buyer_org_id,
                    format!("Payment attempt did not complete ({:?})", finalized.status),
                )
                .await;
            }
            _ => {}
        }

        Ok(finalized)
    }

    /// First transition into SUCCEEDED marks the invoice paid
    async fn settle_invoice(&self, payment: &Payment) -> Result<(), BillingError> {
        for _ in 0..3 {
            let invoice = self.fetch_invoice(payment.invoice_id).await?;
            if invoice.status == InvoiceStatus::Paid {
                return Ok(());
            }
            if !invoice.status.can_transition_to(InvoiceStatus::Paid) {
                // Money moved but the invoice can no longer accept it;
                // leave the mismatch for manual reconciliation
                tracing::error!(
                    invoice_id = %invoice.id,
                    status = ?invoice.status,
                    payment_id = %payment.id,
                    "Successful payment against an invoice that cannot become paid"
                );
                return Ok(());
            }
            match self
                .invoices
                .transition_invoice(
                    invoice.id,
                    invoice.status,
                    InvoiceStatus::Paid,
                    Some(Utc::now().date_naive()),
                )
                .await
            {
                Ok(_) => return Ok(()),
                // Concurrent transition (e.g. the overdue sweep); re-read and retry
                Err(StoreError::Conflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        tracing::warn!(
            invoice_id = %payment.invoice_id,
            "Gave up settling invoice after repeated conflicts"
        );
        Ok(())
    }

    async fn advance_invoice(&self, invoice_id: Uuid, target: InvoiceStatus) -> Result<(), BillingError> {
        let invoice = self.fetch_invoice(invoice_id).await?;
        if invoice.status == target {
            return Ok(());
        }
        if !invoice.status.can_transition_to(target) {
            return Err(BillingError::InvalidInvoiceTransition {
                from: invoice.status,
                to: target,
            });
        }
        let paid_date = (target == InvoiceStatus::Paid).then(|| Utc::now().date_naive());
        match self
            .invoices
            .transition_invoice(invoice_id, invoice.status, target, paid_date)
            .await
        {
            Ok(_) => Ok(()),
            Err(StoreError::Conflict(_)) => {
                let current = self.fetch_invoice(invoice_id).await?;
                if current.status == target {
                    Ok(())
                } else {
                    Err(BillingError::InvalidInvoiceTransition {
                        from: current.status,
                        to: target,
                    })
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Downstream provisioning and buyer notice. Failures here are logged
    /// and swallowed: the money moved, the payment stays succeeded.
    async fn run_post_success(&self, payment: &Payment) {
        let context = match self.invoices.find_invoice(payment.invoice_id).await {
            Ok(invoice) => PaidPledgeContext {
                payment_id: payment.id,
                invoice_id: invoice.id,
                pledge_id: invoice.pledge_id,
                campaign_id: invoice.campaign_id,
                buyer_org_id: invoice.buyer_org_id,
                amount: payment.amount,
            },
            Err(e) => {
                tracing::error!(
                    payment_id = %payment.id,
                    error = %e,
                    "Could not load invoice for order materialization"
                );
                return;
            }
        };

        match self.materializer.create_order_from_payment(&context).await {
            Ok(order) => {
                tracing::info!(
                    payment_id = %payment.id,
                    order_id = %order.order_id,
                    "Order materialized from payment"
                );
            }
            Err(e) => {
                tracing::error!(
                    payment_id = %payment.id,
                    error = %e,
                    "Order materialization failed; payment remains succeeded"
                );
            }
        }

        self.notify(
            NotificationKind::PaymentReceived,
            payment.buyer_org_id,
            format!("Payment of {} {} received", payment.amount, payment.currency),
        )
        .await;
    }

    async fn notify(&self, kind: NotificationKind, org_id: Uuid, subject: String) {
        let notification = Notification {
            kind,
            recipient_org_id: org_id,
            recipient_email: None,
            body: subject.clone(),
            subject,
        };
        if let Err(e) = self.notifier.send(notification).await {
            tracing::warn!(error = %e, "Notification dispatch failed");
        }
    }

    async fn fetch_invoice(&self, id: Uuid) -> Result<Invoice, BillingError> {
        self.invoices.find_invoice(id).await.map_err(|e| match e {
            StoreError::NotFound => BillingError::InvoiceNotFound(id),
            other => other.into(),
        })
    }

    async fn fetch_payment_by_checkout(&self, checkout_id: &str) -> Result<Payment, BillingError> {
        self.payments.find_by_checkout(checkout_id).await.map_err(|e| match e {
            StoreError::NotFound => BillingError::PaymentNotFound(checkout_id.to_string()),
            other => other.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn key_is_stable_within_a_bucket() {
        let invoice_id = Uuid::new_v4();
        let buyer_id = Uuid::new_v4();
        let t0 = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 5).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 55).unwrap();

        assert_eq!(
            idempotency_key(invoice_id, buyer_id, t0, 60),
            idempotency_key(invoice_id, buyer_id, t1, 60)
        );
    }

    #[test]
    fn key_changes_across_buckets_and_buyers() {
        let invoice_id = Uuid::new_v4();
        let buyer_id = Uuid::new_v4();
        let t0 = Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 30).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 7, 1, 12, 1, 30).unwrap();

        assert_ne!(
            idempotency_key(invoice_id, buyer_id, t0, 60),
            idempotency_key(invoice_id, buyer_id, t1, 60)
        );
        assert_ne!(
            idempotency_key(invoice_id, buyer_id, t0, 60),
            idempotency_key(invoice_id, Uuid::new_v4(), t0, 60)
        );
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;
use uuid::Uuid;

use agora_billing::{
    BillingError, BillingRules, InMemoryBillingStore, InvoiceGenerator, InvoiceStatus, MockGateway,
    OfflinePaymentPolicy, PaymentProcessor, PaymentStatus,
};
use agora_billing::models::{OfflinePaymentRequest, PaymentMethod};
use agora_campaign::brackets::{resolve_bracket, DiscountBracket};
use agora_core::collab::{
    Notification, NotificationDispatcher, OrderMaterializer, OrderRef, PaidPledgeContext,
};
use agora_core::gateway::{GatewayPaymentStatus, GatewayRegistry, PaymentProvider};
use agora_core::CoreError;
use agora_pledge::{InMemoryPledgeLedger, Pledge, PledgeStore};

struct CountingMaterializer {
    calls: AtomicUsize,
}

#[async_trait]
impl OrderMaterializer for CountingMaterializer {
    async fn create_order_from_payment(&self, _context: &PaidPledgeContext) -> Result<OrderRef, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(OrderRef {
            order_id: Uuid::new_v4(),
        })
    }
}

struct FlakyNotifier;

#[async_trait]
impl NotificationDispatcher for FlakyNotifier {
    async fn send(&self, _notification: Notification) -> Result<(), CoreError> {
        Err(CoreError::DispatchError("smtp relay down".to_string()))
    }
}

struct Harness {
    ledger: Arc<InMemoryPledgeLedger>,
    gateway: Arc<MockGateway>,
    materializer: Arc<CountingMaterializer>,
    generator: InvoiceGenerator,
    processor: PaymentProcessor,
}

fn harness(rules: BillingRules) -> Harness {
    let store = Arc::new(InMemoryBillingStore::new());
    let ledger = Arc::new(InMemoryPledgeLedger::new());
    let gateway = Arc::new(MockGateway::new("whsec_test"));
    let materializer = Arc::new(CountingMaterializer {
        calls: AtomicUsize::new(0),
    });
    // Notifications fail on purpose throughout: nothing below may care
    let notifier = Arc::new(FlakyNotifier);
    let registry =
        Arc::new(GatewayRegistry::new().register(PaymentProvider::Mock, gateway.clone()));

    let generator = InvoiceGenerator::new(store.clone(), ledger.clone(), notifier.clone(), rules.clone());
    let processor = PaymentProcessor::new(
        store.clone(),
        store.clone(),
        registry,
        PaymentProvider::Mock,
        materializer.clone(),
        notifier,
        rules,
    );

    Harness {
        ledger,
        gateway,
        materializer,
        generator,
        processor,
    }
}

fn rules() -> BillingRules {
    BillingRules {
        vat_rate: dec!(0.19),
        // Wide bucket keeps duplicate-submit tests off the bucket boundary
        idempotency_bucket_secs: 3600,
        ..BillingRules::default()
    }
}

fn ladder(campaign_id: Uuid) -> Vec<DiscountBracket> {
    vec![
        DiscountBracket::new(campaign_id, 0, Some(49), dec!(100), 1),
        DiscountBracket::new(campaign_id, 50, Some(99), dec!(90), 2),
        DiscountBracket::new(campaign_id, 100, None, dec!(80), 3),
    ]
}

/// Lock a campaign with two pledges (30 + 90 units) and generate invoices.
/// Returns (campaign_id, invoices).
async fn locked_campaign(h: &Harness) -> (Uuid, Vec<agora_billing::Invoice>) {
    let campaign_id = Uuid::new_v4();
    let brackets = ladder(campaign_id);

    h.ledger
        .place_pledge(Pledge::new(campaign_id, Uuid::new_v4(), Uuid::new_v4(), 30))
        .await
        .unwrap();
    h.ledger
        .place_pledge(Pledge::new(campaign_id, Uuid::new_v4(), Uuid::new_v4(), 90))
        .await
        .unwrap();
    h.ledger.commit_all_for_campaign(campaign_id).await.unwrap();

    let committed = h.ledger.committed_quantity(campaign_id).await.unwrap();
    assert_eq!(committed, 120);
    let final_bracket = resolve_bracket(&brackets, committed).unwrap();
    assert_eq!(final_bracket.unit_price, dec!(80));

    let invoices = h
        .generator
        .generate_invoices_for_campaign(campaign_id, final_bracket)
        .await
        .unwrap();
    (campaign_id, invoices)
}

#[tokio::test]
async fn campaign_lock_invoices_at_final_bracket() {
    let h = harness(rules());
    let (_, invoices) = locked_campaign(&h).await;

    assert_eq!(invoices.len(), 2);
    let small = invoices.iter().find(|i| i.subtotal == dec!(2400)).unwrap();
    assert_eq!(small.tax_amount, dec!(456.00));
    assert_eq!(small.total_amount, dec!(2856.00));
    assert_eq!(small.status, InvoiceStatus::Sent);
    assert!(small.invoice_number.starts_with("AGR-"));
}

#[tokio::test]
async fn generation_is_idempotent() {
    let h = harness(rules());
    let (campaign_id, first) = locked_campaign(&h).await;

    let brackets = ladder(campaign_id);
    let final_bracket = resolve_bracket(&brackets, 120).unwrap();
    let second = h
        .generator
        .generate_invoices_for_campaign(campaign_id, final_bracket)
        .await
        .unwrap();

    assert_eq!(first.len(), second.len());
    let mut first_ids: Vec<Uuid> = first.iter().map(|i| i.id).collect();
    let mut second_ids: Vec<Uuid> = second.iter().map(|i| i.id).collect();
    first_ids.sort();
    second_ids.sort();
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn duplicate_submit_reuses_the_checkout() {
    let h = harness(rules());
    let (_, invoices) = locked_campaign(&h).await;
    let invoice = &invoices[0];
    let buyer = Uuid::new_v4();

    let first = h
        .processor
        .initiate_online_payment(invoice.id, buyer)
        .await
        .unwrap();
    let second = h
        .processor
        .initiate_online_payment(invoice.id, buyer)
        .await
        .unwrap();

    assert_eq!(first.payment_id, second.payment_id);
    assert_eq!(first.checkout_id, second.checkout_id);
}

#[tokio::test]
async fn concurrent_initiations_create_one_checkout() {
    let h = Arc::new(harness(rules()));
    let (_, invoices) = locked_campaign(&h).await;
    let invoice_id = invoices[0].id;
    let buyer = Uuid::new_v4();

    let a = {
        let h = h.clone();
        tokio::spawn(async move { h.processor.initiate_online_payment(invoice_id, buyer).await })
    };
    let b = {
        let h = h.clone();
        tokio::spawn(async move { h.processor.initiate_online_payment(invoice_id, buyer).await })
    };

    let first = a.await.unwrap().unwrap();
    let second = b.await.unwrap().unwrap();
    assert_eq!(first.payment_id, second.payment_id);
    assert_eq!(first.checkout_id, second.checkout_id);
}

#[tokio::test]
async fn webhook_and_return_settle_exactly_once() {
    let h = harness(rules());
    let (_, invoices) = locked_campaign(&h).await;
    let invoice = &invoices[0];
    let buyer = Uuid::new_v4();

    let checkout = h
        .processor
        .initiate_online_payment(invoice.id, buyer)
        .await
        .unwrap();
    h.gateway
        .complete_checkout(&checkout.checkout_id, GatewayPaymentStatus::Succeeded);

    // Webhook arrives first
    let payload = serde_json::json!({
        "checkout_id": checkout.checkout_id,
        "status": "SUCCEEDED",
        "transaction_id": "txn_001",
    });
    let body = serde_json::to_vec(&payload).unwrap();
    let signature = h.gateway.sign_payload(&body);
    h.processor
        .handle_webhook(PaymentProvider::Mock, &body, &signature)
        .await
        .unwrap();

    // Browser return races in afterwards; must observe, not re-process
    let payment = h
        .processor
        .process_gateway_return(&checkout.checkout_id)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);

    // Replay the webhook for good measure
    h.processor
        .handle_webhook(PaymentProvider::Mock, &body, &signature)
        .await
        .unwrap();

    let settled = h.generator.find_invoice(invoice.id).await.unwrap();
    assert_eq!(settled.status, InvoiceStatus::Paid);
    assert!(settled.paid_date.is_some());
    assert_eq!(h.materializer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_webhook_signature_is_rejected() {
    let h = harness(rules());
    let (_, invoices) = locked_campaign(&h).await;
    let checkout = h
        .processor
        .initiate_online_payment(invoices[0].id, Uuid::new_v4())
        .await
        .unwrap();

    let payload = serde_json::json!({
        "checkout_id": checkout.checkout_id,
        "status": "SUCCEEDED",
    });
    let body = serde_json::to_vec(&payload).unwrap();

    let result = h
        .processor
        .handle_webhook(PaymentProvider::Mock, &body, "forged")
        .await;
    assert!(matches!(result, Err(BillingError::InvalidWebhookSignature)));

    // Payment untouched by the rejected webhook
    let payment = h
        .processor
        .process_gateway_return(&checkout.checkout_id)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Processing);
}

#[tokio::test]
async fn gateway_outage_parks_payment_retryable() {
    let h = harness(rules());
    let (_, invoices) = locked_campaign(&h).await;
    let buyer = Uuid::new_v4();

    h.gateway.set_fail_on_create(true);
    let result = h.processor.initiate_online_payment(invoices[0].id, buyer).await;
    assert!(matches!(result, Err(BillingError::Gateway(_))));

    // The failed attempt is visible and retryable
    let attempts = h.processor.payments_for_invoice(invoices[0].id).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, PaymentStatus::Failed);
    assert!(attempts[0].status.is_retryable());

    h.gateway.set_fail_on_create(false);
    let retried = h
        .processor
        .retry_payment(attempts[0].id, buyer)
        .await
        .unwrap();
    assert_ne!(retried.payment_id, attempts[0].id);
}

#[tokio::test]
async fn retry_rejects_foreign_buyer_and_nonretryable_states() {
    let h = harness(rules());
    let (_, invoices) = locked_campaign(&h).await;
    let buyer = Uuid::new_v4();

    let checkout = h
        .processor
        .initiate_online_payment(invoices[0].id, buyer)
        .await
        .unwrap();

    let foreign = h.processor.retry_payment(checkout.payment_id, Uuid::new_v4()).await;
    assert!(matches!(foreign, Err(BillingError::OwnershipMismatch)));

    // Processing attempts are not retryable
    let premature = h.processor.retry_payment(checkout.payment_id, buyer).await;
    assert!(matches!(premature, Err(BillingError::NotRetryable(_))));
}

#[tokio::test]
async fn offline_payment_requires_exact_amount() {
    let h = harness(rules());
    let (_, invoices) = locked_campaign(&h).await;
    let invoice = &invoices[0];

    let request = OfflinePaymentRequest {
        buyer_user_id: Uuid::new_v4(),
        amount: invoice.total_amount - dec!(0.01),
        method: PaymentMethod::BankTransfer,
        payment_date: Utc::now(),
        notes: None,
    };
    let result = h
        .processor
        .record_offline_payment(invoice.id, request, Uuid::new_v4())
        .await;
    assert!(matches!(result, Err(BillingError::AmountMismatch { .. })));
}

#[tokio::test]
async fn offline_payment_awaits_confirmation_then_settles() {
    let h = harness(rules());
    let (_, invoices) = locked_campaign(&h).await;
    let invoice = &invoices[0];

    let request = OfflinePaymentRequest {
        buyer_user_id: Uuid::new_v4(),
        amount: invoice.total_amount,
        method: PaymentMethod::BankTransfer,
        payment_date: Utc::now(),
        notes: Some("wire ref 4711".to_string()),
    };
    let payment = h
        .processor
        .record_offline_payment(invoice.id, request.clone(), Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);

    let pending = h.generator.find_invoice(invoice.id).await.unwrap();
    assert_eq!(pending.status, InvoiceStatus::PendingConfirmation);
    assert_eq!(h.materializer.calls.load(Ordering::SeqCst), 1);

    // Second entry for the same invoice is a conflict
    let duplicate = h
        .processor
        .record_offline_payment(invoice.id, request, Uuid::new_v4())
        .await;
    assert!(matches!(duplicate, Err(BillingError::DuplicateSuccessfulPayment)));

    let confirmed = h.processor.confirm_offline_payment(invoice.id).await.unwrap();
    assert_eq!(confirmed.status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn offline_policy_can_mark_paid_directly() {
    let h = harness(BillingRules {
        offline_policy: OfflinePaymentPolicy::MarkPaid,
        ..rules()
    });
    let (_, invoices) = locked_campaign(&h).await;
    let invoice = &invoices[0];

    let request = OfflinePaymentRequest {
        buyer_user_id: Uuid::new_v4(),
        amount: invoice.total_amount,
        method: PaymentMethod::Cash,
        payment_date: Utc::now(),
        notes: None,
    };
    h.processor
        .record_offline_payment(invoice.id, request, Uuid::new_v4())
        .await
        .unwrap();

    let settled = h.generator.find_invoice(invoice.id).await.unwrap();
    assert_eq!(settled.status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn offline_gateway_method_is_rejected() {
    let h = harness(rules());
    let (_, invoices) = locked_campaign(&h).await;

    let request = OfflinePaymentRequest {
        buyer_user_id: Uuid::new_v4(),
        amount: invoices[0].total_amount,
        method: PaymentMethod::PaymentGateway,
        payment_date: Utc::now(),
        notes: None,
    };
    let result = h
        .processor
        .record_offline_payment(invoices[0].id, request, Uuid::new_v4())
        .await;
    assert!(matches!(result, Err(BillingError::InvalidPaymentMethod(_))));
}

#[tokio::test]
async fn paid_invoice_cannot_be_cancelled_or_repaid() {
    let h = harness(rules());
    let (_, invoices) = locked_campaign(&h).await;
    let invoice = &invoices[0];
    let buyer = Uuid::new_v4();

    let checkout = h
        .processor
        .initiate_online_payment(invoice.id, buyer)
        .await
        .unwrap();
    h.gateway
        .complete_checkout(&checkout.checkout_id, GatewayPaymentStatus::Succeeded);
    h.processor
        .process_gateway_return(&checkout.checkout_id)
        .await
        .unwrap();

    let cancel = h.generator.cancel_invoice(invoice.id).await;
    assert!(matches!(
        cancel,
        Err(BillingError::InvalidInvoiceTransition {
            from: InvoiceStatus::Paid,
            ..
        })
    ));

    let repay = h.processor.initiate_online_payment(invoice.id, buyer).await;
    assert!(matches!(repay, Err(BillingError::InvoiceNotPayable(InvoiceStatus::Paid))));
}

#[tokio::test]
async fn failed_gateway_outcome_is_terminal_for_the_attempt() {
    let h = harness(rules());
    let (_, invoices) = locked_campaign(&h).await;
    let buyer = Uuid::new_v4();

    let checkout = h
        .processor
        .initiate_online_payment(invoices[0].id, buyer)
        .await
        .unwrap();
    h.gateway
        .complete_checkout(&checkout.checkout_id, GatewayPaymentStatus::Failed);

    let payment = h
        .processor
        .process_gateway_return(&checkout.checkout_id)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);

    // Invoice untouched, order never created
    let invoice = h.generator.find_invoice(invoices[0].id).await.unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Sent);
    assert_eq!(h.materializer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn overdue_sweep_marks_only_past_due_sent() {
    let h = harness(rules());
    let (_, invoices) = locked_campaign(&h).await;

    // Not yet due
    assert_eq!(
        h.processor
            .mark_overdue_invoices(Utc::now().date_naive())
            .await
            .unwrap(),
        0
    );

    let past_due = invoices[0].due_date + chrono::Duration::days(1);
    assert_eq!(h.processor.mark_overdue_invoices(past_due).await.unwrap(), 2);
    assert_eq!(h.processor.mark_overdue_invoices(past_due).await.unwrap(), 0);

    let invoice = h.generator.find_invoice(invoices[0].id).await.unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Overdue);

    // Overdue invoices still collect, settling straight to paid
    let request = OfflinePaymentRequest {
        buyer_user_id: Uuid::new_v4(),
        amount: invoice.total_amount,
        method: PaymentMethod::Check,
        payment_date: Utc::now(),
        notes: None,
    };
    h.processor
        .record_offline_payment(invoice.id, request, Uuid::new_v4())
        .await
        .unwrap();
    let settled = h.generator.find_invoice(invoice.id).await.unwrap();
    assert_eq!(settled.status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn draft_policy_holds_invoices_until_sent() {
    let h = harness(BillingRules {
        issue_policy: agora_billing::InvoiceIssuePolicy::HoldAsDraft,
        ..rules()
    });
    let (_, invoices) = locked_campaign(&h).await;
    let invoice = &invoices[0];
    assert_eq!(invoice.status, InvoiceStatus::Draft);

    // Draft invoices do not collect
    let result = h
        .processor
        .initiate_online_payment(invoice.id, Uuid::new_v4())
        .await;
    assert!(matches!(result, Err(BillingError::InvoiceNotPayable(InvoiceStatus::Draft))));

    let sent = h.generator.send_invoice(invoice.id).await.unwrap();
    assert_eq!(sent.status, InvoiceStatus::Sent);
}

#[tokio::test]
async fn unknown_invoice_and_checkout_are_not_found() {
    let h = harness(rules());
    let missing_invoice = h
        .processor
        .initiate_online_payment(Uuid::new_v4(), Uuid::new_v4())
        .await;
    assert!(matches!(missing_invoice, Err(BillingError::InvoiceNotFound(_))));

    let missing_checkout = h.processor.process_gateway_return("co_missing").await;
    assert!(matches!(missing_checkout, Err(BillingError::PaymentNotFound(_))));
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use agora_billing::models::{Payment, PaymentMethod, PaymentStatus};
use agora_billing::store::{PaymentInsert, PaymentStore, PaymentUpdate, StoreError};
use agora_core::gateway::PaymentProvider;

pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    invoice_id: Uuid,
    buyer_user_id: Uuid,
    buyer_org_id: Uuid,
    amount: Decimal,
    currency: String,
    method: String,
    status: String,
    provider: Option<String>,
    provider_checkout_id: Option<String>,
    provider_transaction_id: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
    idempotency_key: Option<String>,
    redirect_url: Option<String>,
    checkout_expires_at: Option<DateTime<Utc>>,
    payment_date: Option<DateTime<Utc>>,
    notes: Option<String>,
    recorded_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const PAYMENT_COLUMNS: &str = "id, invoice_id, buyer_user_id, buyer_org_id, amount, currency, method, status, provider, provider_checkout_id, provider_transaction_id, error_code, error_message, idempotency_key, redirect_url, checkout_expires_at, payment_date, notes, recorded_by, created_at, updated_at";

impl PaymentRow {
    fn into_payment(self) -> Result<Payment, StoreError> {
        let status = PaymentStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Backend(format!("unknown payment status {}", self.status)))?;
        let method = PaymentMethod::parse(&self.method)
            .ok_or_else(|| StoreError::Backend(format!("unknown payment method {}", self.method)))?;
        let provider = match self.provider.as_deref() {
            None => None,
            Some(p) => Some(
                PaymentProvider::parse(p)
                    .ok_or_else(|| StoreError::Backend(format!("unknown payment provider {}", p)))?,
            ),
        };
        Ok(Payment {
            id: self.id,
            invoice_id: self.invoice_id,
            buyer_user_id: self.buyer_user_id,
            buyer_org_id: self.buyer_org_id,
            amount: self.amount,
            currency: self.currency,
            method,
            status,
            provider,
            provider_checkout_id: self.provider_checkout_id,
            provider_transaction_id: self.provider_transaction_id,
            error_code: self.error_code,
            error_message: self.error_message,
            idempotency_key: self.idempotency_key,
            redirect_url: self.redirect_url,
            checkout_expires_at: self.checkout_expires_at,
            payment_date: self.payment_date,
            notes: self.notes,
            recorded_by: self.recorded_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        other => StoreError::Backend(other.to_string()),
    }
}

fn constraint_name(e: &sqlx::Error) -> Option<&str> {
    e.as_database_error().and_then(|d| d.constraint())
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn insert_payment(&self, payment: Payment) -> Result<PaymentInsert, StoreError> {
        let result = sqlx::query(
            "INSERT INTO payments (id, invoice_id, buyer_user_id, buyer_org_id, amount, currency, method, status, provider, provider_checkout_id, provider_transaction_id, error_code, error_message, idempotency_key, redirect_url, checkout_expires_at, payment_date, notes, recorded_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
        )
        .bind(payment.id)
        .bind(payment.invoice_id)
        .bind(payment.buyer_user_id)
        .bind(payment.buyer_org_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(payment.provider.map(|p| p.as_str()))
        .bind(&payment.provider_checkout_id)
        .bind(&payment.provider_transaction_id)
        .bind(&payment.error_code)
        .bind(&payment.error_message)
        .bind(&payment.idempotency_key)
        .bind(&payment.redirect_url)
        .bind(payment.checkout_expires_at)
        .bind(payment.payment_date)
        .bind(&payment.notes)
        .bind(payment.recorded_by)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(PaymentInsert::Created(payment)),
            Err(e) => {
                let constraint = constraint_name(&e).map(str::to_string);
                match constraint.as_deref() {
                    // A concurrent duplicate submit holds the key; hand its row back
                    Some("uq_payments_active_key") => {
                        let key = payment.idempotency_key.as_deref().ok_or_else(|| backend(e))?;
                        match self.find_active_by_key(key).await? {
                            Some(existing) => Ok(PaymentInsert::Existing(existing)),
                            None => Err(StoreError::Conflict("idempotency key raced away".to_string())),
                        }
                    }
                    Some("uq_payments_one_success") => Err(StoreError::Conflict(
                        "invoice already has a successful payment".to_string(),
                    )),
                    _ => Err(backend(e)),
                }
            }
        }
    }

    async fn find_payment(&self, id: Uuid) -> Result<Payment, StoreError> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or(StoreError::NotFound)?
        .into_payment()
    }

    async fn find_by_checkout(&self, checkout_id: &str) -> Result<Payment, StoreError> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE provider_checkout_id = $1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(checkout_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or(StoreError::NotFound)?
        .into_payment()
    }

    async fn find_active_by_key(&self, key: &str) -> Result<Option<Payment>, StoreError> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE idempotency_key = $1 AND status IN ('PENDING', 'PROCESSING')"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .map(PaymentRow::into_payment)
        .transpose()
    }

    async fn succeeded_payment_for_invoice(&self, invoice_id: Uuid) -> Result<Option<Payment>, StoreError> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE invoice_id = $1 AND status = 'SUCCEEDED'"
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .map(PaymentRow::into_payment)
        .transpose()
    }

    async fn payments_for_invoice(&self, invoice_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE invoice_id = $1 ORDER BY created_at"
        ))
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(PaymentRow::into_payment).collect()
    }

    async fn transition_payment(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        to: PaymentStatus,
        update: PaymentUpdate,
    ) -> Result<Payment, StoreError> {
        let result = sqlx::query_as::<_, PaymentRow>(&format!(
            "UPDATE payments SET status = $1, \
             provider_checkout_id = COALESCE($2, provider_checkout_id), \
             provider_transaction_id = COALESCE($3, provider_transaction_id), \
             redirect_url = COALESCE($4, redirect_url), \
             checkout_expires_at = COALESCE($5, checkout_expires_at), \
             error_code = COALESCE($6, error_code), \
             error_message = COALESCE($7, error_message), \
             payment_date = COALESCE($8, payment_date), \
             updated_at = now() \
             WHERE id = $9 AND status = $10 \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(to.as_str())
        .bind(&update.provider_checkout_id)
        .bind(&update.provider_transaction_id)
        .bind(&update.redirect_url)
        .bind(update.checkout_expires_at)
        .bind(&update.error_code)
        .bind(&update.error_message)
        .bind(update.payment_date)
        .bind(id)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(Some(row)) => row.into_payment(),
            Ok(None) => {
                let current: Option<String> =
                    sqlx::query_scalar("SELECT status FROM payments WHERE id = $1")
                        .bind(id)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(backend)?;
                match current {
                    None => Err(StoreError::NotFound),
                    Some(status) => Err(StoreError::Conflict(format!(
                        "payment is {}, expected {}",
                        status,
                        expected.as_str()
                    ))),
                }
            }
            // Second success for the invoice trips the partial unique index
            Err(e) if constraint_name(&e) == Some("uq_payments_one_success") => Err(
                StoreError::Conflict("invoice already has a successful payment".to_string()),
            ),
            Err(e) => Err(backend(e)),
        }
    }
}

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use agora_billing::models::{Invoice, InvoiceStatus};
use agora_billing::store::{InvoiceStore, NewInvoice, StoreError};

/// Advisory-lock namespace for invoice number allocation
const INVOICE_SEQ_LOCK_NS: i32 = 0x4147_4f52;

pub struct PgInvoiceStore {
    pool: PgPool,
}

impl PgInvoiceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    invoice_number: String,
    pledge_id: Uuid,
    campaign_id: Uuid,
    buyer_org_id: Uuid,
    subtotal: Decimal,
    tax_amount: Decimal,
    total_amount: Decimal,
    currency: String,
    status: String,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    paid_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const INVOICE_COLUMNS: &str = "id, invoice_number, pledge_id, campaign_id, buyer_org_id, subtotal, tax_amount, total_amount, currency, status, issue_date, due_date, paid_date, created_at, updated_at";

impl InvoiceRow {
    fn into_invoice(self) -> Result<Invoice, StoreError> {
        let status = InvoiceStatus::parse(&self.status)
            .ok_or_else(|| StoreError::Backend(format!("unknown invoice status {}", self.status)))?;
        Ok(Invoice {
            id: self.id,
            invoice_number: self.invoice_number,
            pledge_id: self.pledge_id,
            campaign_id: self.campaign_id,
            buyer_org_id: self.buyer_org_id,
            subtotal: self.subtotal,
            tax_amount: self.tax_amount,
            total_amount: self.total_amount,
            currency: self.currency,
            status,
            issue_date: self.issue_date,
            due_date: self.due_date,
            paid_date: self.paid_date,
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

#[async_trait]
impl InvoiceStore for PgInvoiceStore {
    async fn insert_invoice(&self, new: NewInvoice, prefix: &str) -> Result<Invoice, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Number allocation is a max-lookup plus increment; the advisory
        // lock serializes it per calendar month for the rest of the
        // transaction, so concurrent generations cannot allocate the same
        // sequence value.
        let month = new.issue_date.format("%Y%m").to_string();
        let month_key: i32 = month.parse().unwrap_or(0);
        sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
            .bind(INVOICE_SEQ_LOCK_NS)
            .bind(month_key)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        let month_prefix = format!("{}-{}", prefix, month);
        let last: Option<String> = sqlx::query_scalar(
            "SELECT invoice_number FROM invoices WHERE invoice_number LIKE $1 ORDER BY invoice_number DESC LIMIT 1",
        )
        .bind(format!("{}-%", month_prefix))
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;

        let next_seq = last
            .as_deref()
            .and_then(|n| n.rsplit('-').next())
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0)
            + 1;
        let invoice_number = format!("{}-{:04}", month_prefix, next_seq);

        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "INSERT INTO invoices (id, invoice_number, pledge_id, campaign_id, buyer_org_id, subtotal, tax_amount, total_amount, currency, status, issue_date, due_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {INVOICE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&invoice_number)
        .bind(new.pledge_id)
        .bind(new.campaign_id)
        .bind(new.buyer_org_id)
        .bind(new.subtotal)
        .bind(new.tax_amount)
        .bind(new.total_amount)
        .bind(&new.currency)
        .bind(new.status.as_str())
        .bind(new.issue_date)
        .bind(new.due_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
                StoreError::Conflict(format!("invoice already exists for pledge {}", new.pledge_id))
            } else {
                backend(e)
            }
        })?;

        tx.commit().await.map_err(backend)?;
        row.into_invoice()
    }

    async fn find_invoice(&self, id: Uuid) -> Result<Invoice, StoreError> {
        sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or(StoreError::NotFound)?
        .into_invoice()
    }

    async fn find_by_pledge(&self, pledge_id: Uuid) -> Result<Option<Invoice>, StoreError> {
        sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE pledge_id = $1"
        ))
        .bind(pledge_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .map(InvoiceRow::into_invoice)
        .transpose()
    }

    async fn transition_invoice(
        &self,
        id: Uuid,
        expected: InvoiceStatus,
        to: InvoiceStatus,
        paid_date: Option<NaiveDate>,
    ) -> Result<Invoice, StoreError> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "UPDATE invoices SET status = $1, paid_date = COALESCE($2, paid_date), updated_at = now() \
             WHERE id = $3 AND status = $4 \
             RETURNING {INVOICE_COLUMNS}"
        ))
        .bind(to.as_str())
        .bind(paid_date)
        .bind(id)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => row.into_invoice(),
            None => {
                let current: Option<String> =
                    sqlx::query_scalar("SELECT status FROM invoices WHERE id = $1")
                        .bind(id)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(backend)?;
                match current {
                    None => Err(StoreError::NotFound),
                    Some(status) => Err(StoreError::Conflict(format!(
                        "invoice is {}, expected {}",
                        status,
                        expected.as_str()
                    ))),
                }
            }
        }
    }

    async fn mark_overdue(&self, today: NaiveDate) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE invoices SET status = 'OVERDUE', updated_at = now() \
             WHERE status = 'SENT' AND due_date < $1",
        )
        .bind(today)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected())
    }
}

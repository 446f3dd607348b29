use agora_billing::{BillingRules, InvoiceIssuePolicy, OfflinePaymentPolicy};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, Row};
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay operator-set billing rules from the `business_rules` table on
    /// top of the configured defaults.
    ///
    /// Expected row format: `rule_key` plus `rule_value` of `{"value": ...}`.
    pub async fn fetch_billing_rules(&self, defaults: BillingRules) -> Result<BillingRules, sqlx::Error> {
        let rows = sqlx::query("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;

        for row in rows {
            let rule_key: String = row.get("rule_key");
            let rule_value: Value = row.get("rule_value");

            let Some(v) = rule_value.get("value") else {
                continue;
            };
            match rule_key.as_str() {
                "vat_rate" => {
                    if let Some(f) = v.as_f64() {
                        if let Ok(d) = Decimal::try_from(f) {
                            rules.vat_rate = d;
                        }
                    }
                }
                "due_grace_days" => {
                    if let Some(n) = v.as_i64() {
                        rules.due_grace_days = n;
                    }
                }
                "invoice_prefix" => {
                    if let Some(s) = v.as_str() {
                        rules.invoice_prefix = s.to_string();
                    }
                }
                "currency" => {
                    if let Some(s) = v.as_str() {
                        rules.currency = s.to_string();
                    }
                }
                "issue_policy" => {
                    if let Some(s) = v.as_str() {
                        rules.issue_policy = match s {
                            "HOLD_AS_DRAFT" => InvoiceIssuePolicy::HoldAsDraft,
                            _ => InvoiceIssuePolicy::SendImmediately,
                        };
                    }
                }
                "offline_policy" => {
                    if let Some(s) = v.as_str() {
                        rules.offline_policy = match s {
                            "MARK_PAID" => OfflinePaymentPolicy::MarkPaid,
                            _ => OfflinePaymentPolicy::PendingConfirmation,
                        };
                    }
                }
                "idempotency_bucket_secs" => {
                    if let Some(n) = v.as_i64() {
                        rules.idempotency_bucket_secs = n;
                    }
                }
                _ => {}
            }
        }

        Ok(rules)
    }
}

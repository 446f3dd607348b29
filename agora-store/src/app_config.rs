use agora_billing::{BillingRules, InvoiceIssuePolicy, OfflinePaymentPolicy};
use agora_shared::pii::Masked;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub kafka: KafkaConfig,
    pub gateway: GatewayConfig,
    pub billing_rules: BillingRulesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Provider selected for new online payments (e.g. "mock")
    pub provider: String,
    pub webhook_secret: Masked<String>,
}

/// Raw billing rules as they appear in config files; converted into
/// `BillingRules` after optional database overrides are applied
#[derive(Debug, Deserialize, Clone)]
pub struct BillingRulesConfig {
    pub invoice_prefix: String,
    pub vat_rate: f64,
    pub due_grace_days: i64,
    pub currency: String,
    #[serde(default = "default_issue_policy")]
    pub issue_policy: String,
    #[serde(default = "default_offline_policy")]
    pub offline_policy: String,
    #[serde(default = "default_bucket_secs")]
    pub idempotency_bucket_secs: i64,
}

fn default_issue_policy() -> String {
    "SEND_IMMEDIATELY".to_string()
}

fn default_offline_policy() -> String {
    "PENDING_CONFIRMATION".to_string()
}

fn default_bucket_secs() -> i64 {
    60
}

impl BillingRulesConfig {
    pub fn into_rules(self) -> BillingRules {
        let defaults = BillingRules::default();
        BillingRules {
            invoice_prefix: self.invoice_prefix,
            vat_rate: Decimal::try_from(self.vat_rate).unwrap_or(defaults.vat_rate),
            due_grace_days: self.due_grace_days,
            currency: self.currency,
            issue_policy: match self.issue_policy.as_str() {
                "HOLD_AS_DRAFT" => InvoiceIssuePolicy::HoldAsDraft,
                _ => InvoiceIssuePolicy::SendImmediately,
            },
            offline_policy: match self.offline_policy.as_str() {
                "MARK_PAID" => OfflinePaymentPolicy::MarkPaid,
                _ => OfflinePaymentPolicy::PendingConfirmation,
            },
            idempotency_bucket_secs: self.idempotency_bucket_secs,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Environment-specific file, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Env vars with prefix AGORA, e.g. AGORA_SERVER__PORT=8080
            .add_source(config::Environment::with_prefix("AGORA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_conversion_parses_policies() {
        let raw = BillingRulesConfig {
            invoice_prefix: "AGR".to_string(),
            vat_rate: 0.19,
            due_grace_days: 14,
            currency: "EUR".to_string(),
            issue_policy: "HOLD_AS_DRAFT".to_string(),
            offline_policy: "MARK_PAID".to_string(),
            idempotency_bucket_secs: 60,
        };
        let rules = raw.into_rules();
        assert_eq!(rules.issue_policy, InvoiceIssuePolicy::HoldAsDraft);
        assert_eq!(rules.offline_policy, OfflinePaymentPolicy::MarkPaid);
        assert_eq!(rules.vat_rate, Decimal::new(19, 2));
    }

    #[test]
    fn unknown_policy_falls_back_to_defaults() {
        let raw = BillingRulesConfig {
            invoice_prefix: "AGR".to_string(),
            vat_rate: 0.19,
            due_grace_days: 14,
            currency: "EUR".to_string(),
            issue_policy: "???".to_string(),
            offline_policy: "???".to_string(),
            idempotency_bucket_secs: 60,
        };
        let rules = raw.into_rules();
        assert_eq!(rules.issue_policy, InvoiceIssuePolicy::SendImmediately);
        assert_eq!(rules.offline_policy, OfflinePaymentPolicy::PendingConfirmation);
    }
}

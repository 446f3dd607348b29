pub mod error;
pub mod gateway_mock;
pub mod generator;
pub mod memory;
pub mod models;
pub mod processor;
pub mod rules;
pub mod store;

pub use error::BillingError;
pub use gateway_mock::MockGateway;
pub use generator::InvoiceGenerator;
pub use memory::InMemoryBillingStore;
pub use models::{CheckoutInfo, Invoice, InvoiceStatus, Payment, PaymentMethod, PaymentStatus};
pub use processor::PaymentProcessor;
pub use rules::{BillingRules, InvoiceIssuePolicy, OfflinePaymentPolicy};
pub use store::{InvoiceStore, PaymentStore};

pub mod app_config;
pub mod campaign_repo;
pub mod database;
pub mod events;
pub mod invoice_repo;
pub mod payment_repo;
pub mod pledge_repo;

pub use campaign_repo::PgCampaignStore;
pub use database::DbClient;
pub use events::EventProducer;
pub use invoice_repo::PgInvoiceStore;
pub use payment_repo::PgPaymentStore;
pub use pledge_repo::PgPledgeLedger;

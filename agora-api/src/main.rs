use std::net::SocketAddr;
use std::sync::Arc;

use agora_api::dispatch::{KafkaNotifier, KafkaOrderMaterializer};
use agora_api::metrics::Metrics;
use agora_api::{app, worker, AppState};
use agora_billing::{InvoiceGenerator, MockGateway, PaymentProcessor};
use agora_core::gateway::{GatewayRegistry, PaymentProvider};
use agora_store::{
    DbClient, EventProducer, PgCampaignStore, PgInvoiceStore, PgPaymentStore, PgPledgeLedger,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const OVERDUE_SWEEP_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = agora_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Agora API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    // Config defaults, overridden by operator rows in business_rules
    let rules = db
        .fetch_billing_rules(config.billing_rules.clone().into_rules())
        .await
        .expect("Failed to load billing rules");
    tracing::info!(prefix = %rules.invoice_prefix, vat = %rules.vat_rate, "Billing rules loaded");

    let kafka = Arc::new(
        EventProducer::new(&config.kafka.brokers).expect("Failed to create Kafka producer"),
    );

    let campaigns = Arc::new(PgCampaignStore::new(db.pool.clone()));
    let pledges = Arc::new(PgPledgeLedger::new(db.pool.clone()));
    let invoices = Arc::new(PgInvoiceStore::new(db.pool.clone()));
    let payments = Arc::new(PgPaymentStore::new(db.pool.clone()));

    let default_provider =
        PaymentProvider::parse(&config.gateway.provider).unwrap_or(PaymentProvider::Mock);
    let gateway = Arc::new(MockGateway::new(
        config.gateway.webhook_secret.clone().into_inner(),
    ));
    let registry = Arc::new(GatewayRegistry::new().register(PaymentProvider::Mock, gateway));

    let notifier = Arc::new(KafkaNotifier::new(kafka.clone()));
    let materializer = Arc::new(KafkaOrderMaterializer::new(kafka.clone()));

    let generator = Arc::new(InvoiceGenerator::new(
        invoices.clone(),
        pledges.clone(),
        notifier.clone(),
        rules.clone(),
    ));
    let processor = Arc::new(PaymentProcessor::new(
        invoices,
        payments,
        registry,
        default_provider,
        materializer,
        notifier,
        rules,
    ));

    tokio::spawn(worker::start_overdue_worker(
        processor.clone(),
        kafka.clone(),
        std::time::Duration::from_secs(OVERDUE_SWEEP_INTERVAL_SECS),
    ));

    let app_state = AppState {
        campaigns,
        pledges,
        generator,
        processor,
        kafka,
        metrics: Arc::new(Metrics::new()),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

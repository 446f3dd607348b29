use axum::{http::Method, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod campaigns;
pub mod dispatch;
pub mod error;
pub mod invoices;
pub mod metrics;
pub mod payments;
pub mod pledges;
pub mod state;
pub mod webhooks;
pub mod worker;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    Router::new()
        .merge(campaigns::routes())
        .merge(pledges::routes())
        .merge(invoices::routes())
        .merge(payments::routes())
        .merge(webhooks::routes())
        .route("/metrics", get(metrics::render_metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

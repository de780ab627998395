pub mod handlers;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::TraceLayer,
};
use std::sync::Arc;

use crate::{
    config::Settings,
    service::ServiceContext,
};
use state::AppState;

pub fn create_app(service_context: Arc<ServiceContext>, settings: Arc<Settings>) -> Router {
    let app_state = AppState::new(service_context, settings);

    Router::new()
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))

        .nest("/api", api_routes())

        .with_state(app_state)

        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/charges", charge_routes())
        .nest("/invoices", invoice_routes())
}

fn charge_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::charges::list).post(handlers::charges::create))
        .route("/:id", get(handlers::charges::get))
        .route("/:id/poll", post(handlers::charges::poll))
        .route("/:id/cancel", post(handlers::charges::cancel))
        .route("/:id/fail", post(handlers::charges::fail))
        .route("/:id/confirmations", post(handlers::charges::confirmations))
        .route("/:id/refunds", get(handlers::refunds::list).post(handlers::refunds::create))
        .route("/:id/webhooks", get(handlers::charges::webhooks))
        .route("/:id/qr.svg", get(handlers::charges::qr_svg))
}

fn invoice_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::invoices::create))
        .route("/:invoice_id", get(handlers::invoices::get))
}

//! HTTP API server with observability for the commerce core.
//!
//! Provides REST endpoints for checkout, payment events, order
//! confirmation, inventory and vouchers, with structured logging (tracing)
//! and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use fulfillment::services::{InMemoryNotifier, InMemoryPaymentGateway, Notifier, PaymentGateway};
use fulfillment::{CheckoutManager, OrderPipeline, VoucherService, WebhookVerifier};
use inventory::InventoryAggregator;
use metrics_exporter_prometheus::PrometheusHandle;
use store::{CommerceStore, InMemoryStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

pub type DynStore = dyn CommerceStore;
pub type DynGateway = dyn PaymentGateway;
pub type DynNotifier = dyn Notifier;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub checkout: CheckoutManager<DynStore, DynNotifier>,
    pub pipeline: OrderPipeline<DynStore, DynGateway, DynNotifier>,
    pub inventory: InventoryAggregator<DynStore>,
    pub vouchers: VoucherService<DynStore>,
    /// `None` when no signing secret is configured; every event is rejected.
    pub webhook: Option<WebhookVerifier>,
    /// `None` leaves the sweep trigger unprotected.
    pub sweep_secret: Option<String>,
}

impl AppState {
    /// Wires the services over a store and collaborators.
    pub fn new(
        store: Arc<DynStore>,
        gateway: Arc<DynGateway>,
        notifier: Arc<DynNotifier>,
        config: &Config,
    ) -> Self {
        let fulfillment = config.fulfillment();
        Self {
            checkout: CheckoutManager::new(Arc::clone(&store), Arc::clone(&notifier), fulfillment.clone()),
            pipeline: OrderPipeline::new(Arc::clone(&store), gateway, notifier, fulfillment),
            inventory: InventoryAggregator::new(Arc::clone(&store)),
            vouchers: VoucherService::new(store),
            webhook: config.payment_webhook_secret.as_deref().map(WebhookVerifier::new),
            sweep_secret: config.sweep_secret.clone(),
        }
    }
}

/// In-memory backends behind a default state, for seeding and inspection.
#[derive(Clone)]
pub struct InMemoryBackends {
    pub store: Arc<InMemoryStore>,
    pub gateway: Arc<InMemoryPaymentGateway>,
    pub notifier: Arc<InMemoryNotifier>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkout", post(routes::checkout::record))
        .route("/checkout/sweep", post(routes::checkout::sweep))
        .route("/checkout/{cart_id}", get(routes::checkout::get))
        .route("/webhooks/payment", post(routes::webhooks::payment))
        .route("/orders/confirm/{session_ref}", get(routes::orders::confirm))
        .route("/inventory", get(routes::inventory::availability))
        .route("/inventory/volume-tiers", get(routes::inventory::volume_tiers))
        .route("/vouchers/validate", post(routes::vouchers::validate))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state over in-memory backends.
pub fn create_default_state(config: &Config) -> (Arc<AppState>, InMemoryBackends) {
    let backends = InMemoryBackends {
        store: Arc::new(InMemoryStore::new()),
        gateway: Arc::new(InMemoryPaymentGateway::new()),
        notifier: Arc::new(InMemoryNotifier::new()),
    };
    let state = AppState::new(
        backends.store.clone(),
        backends.gateway.clone(),
        backends.notifier.clone(),
        config,
    );
    (Arc::new(state), backends)
}

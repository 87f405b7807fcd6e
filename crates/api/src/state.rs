//! Shared application state for the Axum API server.

use std::sync::Arc;

use sqlx::PgPool;

use beacon_addressing::{
    ConstantExpressionEvaluator, RecipientResolver, SelectionExpressionEvaluator, TransportRegistry,
};
use beacon_common::config::AppConfig;
use beacon_pager::{PagerTransport, PgPagerStore};

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    pub resolver: Arc<RecipientResolver>,
    /// Registered transport keys, sorted
    pub transport_keys: Arc<[String]>,
}

impl AppState {
    /// State with the paging transport registered under the configured key.
    pub fn new(pool: PgPool, config: AppConfig) -> Self {
        let pager = PagerTransport::new(
            config.pager_transport_key.clone(),
            Arc::new(PgPagerStore::new(pool.clone())),
        );
        let registry = TransportRegistry::new().with_transport(Arc::new(pager));

        Self::with_registry(pool, config, registry, Arc::new(ConstantExpressionEvaluator))
    }

    pub fn with_registry(
        pool: PgPool,
        config: AppConfig,
        registry: TransportRegistry,
        expressions: Arc<dyn SelectionExpressionEvaluator>,
    ) -> Self {
        let transport_keys: Arc<[String]> = registry.keys().into_iter().map(String::from).collect();
        tracing::debug!(transports = ?transport_keys, "Transport registry built");
        Self {
            pool,
            config,
            transport_keys,
            resolver: Arc::new(RecipientResolver::new(Arc::new(registry), expressions)),
        }
    }
}

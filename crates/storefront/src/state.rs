//! Application state shared across handlers.

use std::sync::Arc;

use crate::cart::CartEngine;
use crate::commerce::CommerceClient;
use crate::config::StorefrontConfig;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources: the configuration and the optimistic cart engine.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    engine: CartEngine,
}

impl AppState {
    /// Create a new application state from configuration.
    #[must_use]
    pub fn new(config: StorefrontConfig) -> Self {
        let commerce = CommerceClient::new(&config.commerce);
        let engine = CartEngine::new(commerce);

        Self {
            inner: Arc::new(AppStateInner { config, engine }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the optimistic cart engine.
    #[must_use]
    pub fn engine(&self) -> &CartEngine {
        &self.inner.engine
    }
}

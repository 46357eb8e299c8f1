//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Health check
//!
//! # Cart
//! GET  /cart                   - Optimistic cart view (JSON)
//! POST /cart                   - Mutation endpoint (form-encoded action)
//!
//! # Checkout
//! GET  /checkout               - Redirect to the commerce backend checkout
//! ```

pub mod cart;

use axum::{Router, routing::get};

use crate::state::AppState;

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new().route("/", get(cart::show).post(cart::mutate))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        // Cart routes
        .nest("/cart", cart_routes())
        // Checkout redirect
        .route("/checkout", get(cart::checkout))
}

//! Marmalade Storefront library.
//!
//! This crate provides the storefront functionality as a library,
//! allowing it to be tested and reused. The interesting part is the
//! optimistic cart engine in [`cart`]; [`commerce`] is the typed client
//! for the backend that owns the real cart.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod commerce;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;

use axum::Router;
use axum::extract::Request;
use tower_http::trace::TraceLayer;
use tracing::field::Empty;

use crate::state::AppState;

/// Assemble the storefront service.
///
/// Everything except the Sentry layers, which the binary adds outermost
/// so tests can run the service without a Sentry client.
#[must_use]
pub fn app(state: AppState) -> Router {
    let session_layer = middleware::create_session_layer(state.config());

    // The request span declares request_id empty; the request ID
    // middleware fills it in once it has resolved the ID
    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = Empty,
        )
    });

    routes::routes()
        .layer(axum::middleware::from_fn(
            middleware::request_id_middleware,
        ))
        .layer(trace_layer)
        .layer(session_layer)
        .with_state(state)
}

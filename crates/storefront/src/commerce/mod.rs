//! Commerce backend client.
//!
//! # Architecture
//!
//! - The commerce backend owns the cart aggregate - NO local persistence,
//!   direct API calls
//! - One JSON endpoint, one envelope per request: `mutate` applies a cart
//!   action, `fetch` reads the current cart snapshot
//! - Cart state is never cached here. The optimistic layer in
//!   [`crate::cart`] holds per-session snapshots and decides when to
//!   refetch.
//!
//! # Example
//!
//! ```rust,ignore
//! use marmalade_storefront::commerce::{CartAction, CommerceClient};
//!
//! let client = CommerceClient::new(&config.commerce);
//!
//! let outcome = client
//!     .mutate(None, &CartAction::LinesAdd { lines: vec![line] })
//!     .await?;
//! let cart = client.fetch(&cart_id).await?;
//! ```

pub mod types;

pub use types::*;

use std::sync::Arc;

use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use marmalade_core::CartId;

use crate::config::CommerceConfig;

/// Errors that can occur when talking to the commerce backend.
#[derive(Debug, Error)]
pub enum CommerceError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned a non-success status.
    #[error("commerce backend returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Rate limited by the backend.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),
}

/// One request to the commerce backend's cart endpoint.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum Envelope<'a> {
    /// Apply a cart action. Without a `cart_id` the backend creates the
    /// cart as part of the same mutation.
    #[serde(rename_all = "camelCase")]
    Mutate {
        #[serde(skip_serializing_if = "Option::is_none")]
        cart_id: Option<&'a CartId>,
        #[serde(flatten)]
        action: &'a CartAction,
    },
    /// Read the current cart snapshot.
    #[serde(rename_all = "camelCase")]
    Fetch { cart_id: &'a CartId },
}

// =============================================================================
// CommerceClient
// =============================================================================

/// Client for the commerce backend's cart API.
#[derive(Clone)]
pub struct CommerceClient {
    inner: Arc<CommerceClientInner>,
}

struct CommerceClientInner {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl CommerceClient {
    /// Create a new commerce backend client.
    #[must_use]
    pub fn new(config: &CommerceConfig) -> Self {
        Self {
            inner: Arc::new(CommerceClientInner {
                client: reqwest::Client::new(),
                endpoint: config.endpoint.clone(),
                access_token: config.access_token.expose_secret().to_string(),
            }),
        }
    }

    /// Send one envelope and decode the outcome.
    async fn send(&self, envelope: &Envelope<'_>) -> Result<MutationOutcome, CommerceError> {
        let response = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .header("Commerce-Access-Token", &self.inner.access_token)
            .header("Content-Type", "application/json")
            .json(envelope)
            .send()
            .await?;

        let status = response.status();

        // Check for rate limiting
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(CommerceError::RateLimited(retry_after));
        }

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %response_text.chars().take(500).collect::<String>(),
                "commerce backend returned non-success status"
            );
            return Err(CommerceError::Status {
                status: status.as_u16(),
                body: response_text.chars().take(200).collect(),
            });
        }

        match serde_json::from_str(&response_text) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    body = %response_text.chars().take(500).collect::<String>(),
                    "failed to parse commerce backend response"
                );
                Err(CommerceError::Parse(e))
            }
        }
    }

    /// Apply a cart mutation.
    ///
    /// Without a `cart_id` the backend creates the cart and the returned
    /// snapshot carries the new id. User errors and warnings come back in
    /// the outcome rather than as `Err`: only transport and protocol
    /// failures are errors here.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be
    /// decoded.
    #[instrument(skip(self, action), fields(action = action.kind()))]
    pub async fn mutate(
        &self,
        cart_id: Option<&CartId>,
        action: &CartAction,
    ) -> Result<MutationOutcome, CommerceError> {
        self.send(&Envelope::Mutate { cart_id, action }).await
    }

    /// Fetch the current cart snapshot.
    ///
    /// Returns `None` when the cart no longer exists (completed checkout,
    /// expiry). The caller decides what to do with a vanished cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be
    /// decoded.
    #[instrument(skip(self))]
    pub async fn fetch(&self, cart_id: &CartId) -> Result<Option<Cart>, CommerceError> {
        let outcome = self.send(&Envelope::Fetch { cart_id }).await?;
        Ok(outcome.cart)
    }
}

//! Integration tests for the Marmalade storefront.
//!
//! Each test boots the real storefront router on an ephemeral port against
//! an in-process stub of the commerce backend, then drives it over HTTP
//! with cookie-holding clients the way browsers would.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p marmalade-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_mutations` - Mutation endpoint semantics over the wire
//! - `optimistic_overlay` - Served cart views during and after mutations
//!
//! Nothing here talks to a real commerce backend; scripted stub behaviors
//! (slow merchandise, rejected codes) are documented in [`stub`].

// Test harness: panicking on setup failure is the correct behavior
#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

pub mod stub;

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use secrecy::SecretString;
use serde_json::Value;

use marmalade_storefront::config::{CommerceConfig, StorefrontConfig};
use marmalade_storefront::state::AppState;

use crate::stub::{STUB_ACCESS_TOKEN, StubCommerce};

/// How long [`TestContext::view_until`] polls before giving up.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A running storefront wired to a stub commerce backend.
///
/// The default [`client`](Self::client) keeps cookies across requests,
/// so consecutive calls act as one visitor. Use [`new_browser`] for a
/// second, unrelated visitor.
///
/// [`new_browser`]: Self::new_browser
#[derive(Clone)]
pub struct TestContext {
    /// Cookie-holding HTTP client, redirects disabled.
    pub client: reqwest::Client,
    /// Base URL of the storefront under test.
    pub storefront_url: String,
    /// Handle to the stub backend's state and counters.
    pub backend: StubCommerce,
}

impl TestContext {
    /// Boot the stub backend and the storefront, both on ephemeral ports.
    pub async fn new() -> Self {
        let backend = StubCommerce::start().await;

        let config = StorefrontConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            base_url: "http://localhost".to_string(),
            session_secret: SecretString::from("kJ8mN2pQ7rS4tU9vW3xY6zA1bC5dE0fGhH8jK2lM4nP7qR9s"),
            commerce: CommerceConfig {
                endpoint: backend.endpoint(),
                access_token: SecretString::from(STUB_ACCESS_TOKEN),
            },
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        };

        let router = marmalade_storefront::app(AppState::new(config));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self {
            client: Self::build_client(),
            storefront_url: format!("http://{addr}"),
            backend,
        }
    }

    /// A fresh client with its own cookie jar: a second visitor.
    #[must_use]
    pub fn new_browser(&self) -> reqwest::Client {
        Self::build_client()
    }

    fn build_client() -> reqwest::Client {
        // Redirects stay visible to assertions instead of being followed
        reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    /// Absolute URL for a storefront path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.storefront_url)
    }

    /// Post a cart action as the default visitor.
    pub async fn post_action(&self, action: &str, inputs: &str) -> reqwest::Response {
        self.post_action_as(&self.client, action, inputs).await
    }

    /// Post a cart action with a specific client.
    pub async fn post_action_as(
        &self,
        client: &reqwest::Client,
        action: &str,
        inputs: &str,
    ) -> reqwest::Response {
        client
            .post(self.url("/cart"))
            .form(&[("action", action), ("inputs", inputs)])
            .send()
            .await
            .unwrap()
    }

    /// Post a cart action with extra form fields (e.g. `redirectTo`).
    pub async fn post_form(&self, form: &[(&str, &str)]) -> reqwest::Response {
        self.client
            .post(self.url("/cart"))
            .form(form)
            .send()
            .await
            .unwrap()
    }

    /// Read the optimistic cart view as the default visitor.
    pub async fn view(&self) -> Value {
        self.view_as(&self.client).await
    }

    /// Read the optimistic cart view with a specific client.
    pub async fn view_as(&self, client: &reqwest::Client) -> Value {
        client
            .get(self.url("/cart"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    /// Read the cart view as a navigation to `location`.
    pub async fn view_at(&self, location: &str) -> Value {
        self.client
            .get(self.url("/cart"))
            .query(&[("location", location)])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    /// Read the cart view with a forced revalidation.
    pub async fn view_revalidated(&self) -> Value {
        self.client
            .get(self.url("/cart"))
            .query(&[("revalidate", "true")])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    /// Poll the cart view until `predicate` holds.
    ///
    /// Settlement runs through a background revalidation, so tests that
    /// assert on converged state wait for it here rather than sleeping a
    /// fixed amount.
    pub async fn view_until(&self, what: &str, predicate: impl Fn(&Value) -> bool) -> Value {
        let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;
        let mut last = self.view().await;
        while !predicate(&last) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "cart view never reached {what}; last view: {last}"
            );
            tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
            last = self.view().await;
        }
        last
    }
}

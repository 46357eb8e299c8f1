//! Optimistic cart engine.
//!
//! # Architecture
//!
//! The commerce backend owns the cart; this module owns everything the
//! storefront pretends to know before the backend answers:
//!
//! - [`pending`] - registry of in-flight mutations
//! - [`overlay`] - the pure merge of authoritative truth and pending patches
//! - [`revalidate`] - refresh decisions and causally ordered adoption
//!
//! [`CartSession`] is the session-scoped handle: one per visitor, looked
//! up by the engine key stored in the session cookie. All mutable state
//! sits behind one `std::sync::Mutex` that is never held across an await,
//! so registration, settlement, and adoption are each indivisible.
//! [`CartEngine`] holds the session cache and the commerce client and
//! drives the submit/settle/revalidate cycle.
//!
//! There is no global current-cart anywhere: tests run as many
//! independent sessions in one process as they like.

pub mod overlay;
pub mod pending;
pub mod revalidate;

pub use overlay::{CartViewStatus, OptimisticCartView, build_overlay};
pub use pending::{PendingMutation, PendingTracker, SettleState, TargetKey};
pub use revalidate::{AdoptionGuard, RevalidateTrigger, should_revalidate};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, instrument, warn};

use marmalade_core::{CartId, SubmissionId};

use crate::commerce::{Cart, CartAction, CommerceClient, CommerceError, MutationOutcome};

/// Sessions idle longer than this are evicted; the next request rebuilds
/// from the cart id in the session cookie.
const SESSION_IDLE_SECONDS: u64 = 30 * 60;

/// Upper bound on concurrently tracked sessions.
const MAX_TRACKED_SESSIONS: u64 = 50_000;

// =============================================================================
// CartSession
// =============================================================================

#[derive(Debug, Default)]
struct SessionState {
    cart_id: Option<CartId>,
    cart: Option<Cart>,
    tracker: PendingTracker,
    guard: AdoptionGuard,
    last_location: Option<String>,
    /// The backend reported the cart gone (checkout completed, expired).
    /// Blocks re-seeding the dead id from a stale cookie.
    cart_vanished: bool,
}

/// Session-scoped handle to one visitor's optimistic cart state.
///
/// Cheap to clone; clones share state. Every method takes the lock
/// briefly and returns owned data, so no guard ever crosses an await.
#[derive(Debug, Clone, Default)]
pub struct CartSession {
    state: Arc<Mutex<SessionState>>,
}

impl CartSession {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        // Writes are plain field stores; state stays coherent even if a
        // holder panicked
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The view to render right now.
    #[must_use]
    pub fn view(&self) -> OptimisticCartView {
        let state = self.state();
        build_overlay(state.cart.as_ref(), &state.tracker.snapshot())
    }

    /// The cart id mutations should target, if one is known.
    #[must_use]
    pub fn cart_id(&self) -> Option<CartId> {
        self.state().cart_id.clone()
    }

    /// Adopt a cart id carried over in the session cookie. Ignored once
    /// an id is known, and ignored after the backend reported the cart
    /// gone.
    pub fn seed_cart_id(&self, cart_id: CartId) {
        let mut state = self.state();
        if state.cart_id.is_none() && !state.cart_vanished {
            state.cart_id = Some(cart_id);
        }
    }

    /// Checkout URL from the adopted snapshot.
    #[must_use]
    pub fn checkout_url(&self) -> Option<String> {
        self.state().cart.as_ref().map(|c| c.checkout_url.clone())
    }

    /// A cart id is known but no snapshot has been adopted yet (fresh
    /// engine entry rebuilt from a cookie).
    #[must_use]
    pub fn missing_snapshot(&self) -> bool {
        let state = self.state();
        state.cart_id.is_some() && state.cart.is_none()
    }

    /// Register a submitted action and return its submission id.
    pub fn register(&self, action: CartAction) -> SubmissionId {
        self.state().tracker.register(action)
    }

    /// Observe an applied response: stamp the record with the next
    /// settlement sequence and adopt the response cart as interim truth.
    pub fn settle_applied(&self, submission_id: &SubmissionId, cart: Option<Cart>) {
        let mut state = self.state();
        let seq = state.guard.next_settle_seq();
        state.tracker.settle_applied(submission_id, seq);
        if let Some(cart) = cart
            && state.guard.admit(seq)
        {
            state.cart_id = Some(cart.id.clone());
            state.cart = Some(cart);
            state.cart_vanished = false;
            state.tracker.drop_settled(seq);
        }
    }

    /// Observe a rejected or failed response: the record is removed and
    /// its patch never applies again.
    pub fn settle_failed(&self, submission_id: &SubmissionId) {
        self.state().tracker.settle_failed(submission_id);
    }

    /// Ticket for a revalidation fetch issued right now.
    #[must_use]
    pub fn revalidation_ticket(&self) -> u64 {
        self.state().guard.current_seq()
    }

    /// Try to adopt a fetched snapshot. Returns false when a newer
    /// snapshot was adopted while this fetch was in flight; the stale
    /// result is discarded. `None` means the backend no longer knows the
    /// cart, which clears local truth.
    pub fn adopt(&self, ticket: u64, cart: Option<Cart>) -> bool {
        let mut state = self.state();
        if !state.guard.admit(ticket) {
            return false;
        }
        match cart {
            Some(cart) => {
                state.cart_id = Some(cart.id.clone());
                state.cart = Some(cart);
                state.cart_vanished = false;
            }
            None => {
                state.cart_id = None;
                state.cart = None;
                state.cart_vanished = true;
            }
        }
        state.tracker.drop_settled(ticket);
        true
    }

    /// Record a navigation and decide whether route data should be
    /// refreshed: repeats of the current location are not.
    pub fn navigate(&self, location: &str) -> bool {
        let mut state = self.state();
        let same_location = state.last_location.as_deref() == Some(location);
        state.last_location = Some(location.to_string());
        should_revalidate(RevalidateTrigger::Navigation { same_location })
    }
}

// =============================================================================
// CartEngine
// =============================================================================

/// Owns the per-session handles and the commerce client, and runs the
/// submit/settle/revalidate cycle.
#[derive(Clone)]
pub struct CartEngine {
    inner: Arc<CartEngineInner>,
}

struct CartEngineInner {
    commerce: CommerceClient,
    sessions: Cache<String, CartSession>,
}

impl CartEngine {
    /// Create an engine over the given commerce client.
    #[must_use]
    pub fn new(commerce: CommerceClient) -> Self {
        let sessions = Cache::builder()
            .max_capacity(MAX_TRACKED_SESSIONS)
            .time_to_idle(Duration::from_secs(SESSION_IDLE_SECONDS))
            .build();

        Self {
            inner: Arc::new(CartEngineInner { commerce, sessions }),
        }
    }

    /// Look up or create the session handle for an engine key.
    pub async fn session(&self, engine_key: &str) -> CartSession {
        self.inner
            .sessions
            .get_with(engine_key.to_string(), async { CartSession::default() })
            .await
    }

    /// Submit a validated action for this session.
    ///
    /// Exactly one backend call is made, with synthetic line ids stripped
    /// from the outbound targets (the backend has never seen them); the
    /// registered record keeps the full action so the overlay still
    /// reflects edits against optimistic lines. Rejection and transport
    /// failure both settle the record without its patch surviving. An
    /// applied response adopts the returned cart immediately and, unless
    /// the outbound action was a no-op, schedules the follow-up
    /// revalidation fetch.
    ///
    /// # Errors
    ///
    /// Returns an error only for transport or protocol failures; backend
    /// rejections come back as `errors` inside the outcome.
    #[instrument(skip(self, session, action), fields(action = action.kind()))]
    pub async fn submit(
        &self,
        session: &CartSession,
        action: CartAction,
    ) -> Result<MutationOutcome, CommerceError> {
        let submission_id = session.register(action.clone());
        let outbound = action.without_synthetic_targets();
        let cart_id = session.cart_id();

        match self.inner.commerce.mutate(cart_id.as_ref(), &outbound).await {
            Ok(outcome) => {
                if outcome.rejected() {
                    debug!(errors = outcome.errors.len(), "mutation rejected by backend");
                    session.settle_failed(&submission_id);
                } else {
                    session.settle_applied(&submission_id, outcome.cart.clone());
                    let trigger = RevalidateTrigger::MutationSettled {
                        noop: outbound.is_noop(),
                    };
                    if should_revalidate(trigger) {
                        self.spawn_refresh(session.clone());
                    }
                }
                Ok(outcome)
            }
            Err(error) => {
                session.settle_failed(&submission_id);
                Err(error)
            }
        }
    }

    /// Fetch authoritative truth and adopt it if still causally current.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails; local state is untouched.
    #[instrument(skip(self, session))]
    pub async fn refresh(&self, session: &CartSession) -> Result<(), CommerceError> {
        let Some(cart_id) = session.cart_id() else {
            return Ok(());
        };
        // Ticket first: the fetch reflects at least every settlement
        // observed before it was issued
        let ticket = session.revalidation_ticket();
        let cart = self.inner.commerce.fetch(&cart_id).await?;
        if session.adopt(ticket, cart) {
            debug!(ticket, "adopted revalidated cart snapshot");
        } else {
            debug!(ticket, "discarded stale revalidation fetch");
        }
        Ok(())
    }

    fn spawn_refresh(&self, session: CartSession) {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(error) = engine.refresh(&session).await {
                warn!(error = %error, "cart revalidation failed");
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::commerce::{CartCost, CartLine, CartLineCost, CartLineInput, CartMerchandise};
    use chrono::Utc;
    use marmalade_core::{CurrencyCode, LineId, MerchandiseId, Money};
    use rust_decimal::Decimal;

    fn cart_with_line(cart_id: &str, line_id: &str) -> Cart {
        let unit = Money::new(Decimal::new(1000, 2), CurrencyCode::USD);
        Cart {
            id: CartId::new(cart_id),
            checkout_url: format!("https://shop.test/checkout/{cart_id}"),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            total_quantity: 1,
            buyer_identity: None,
            cost: CartCost {
                subtotal_amount: unit,
                total_tax_amount: None,
                total_amount: unit,
            },
            discount_codes: vec![],
            applied_gift_cards: vec![],
            lines: vec![CartLine {
                id: LineId::new(line_id),
                quantity: 1,
                cost: CartLineCost {
                    amount_per_quantity: unit,
                    total_amount: unit,
                },
                merchandise: CartMerchandise {
                    id: MerchandiseId::new("m1"),
                    title: "Product m1".to_string(),
                    price: unit,
                    image_url: None,
                    selected_options: vec![],
                },
            }],
        }
    }

    fn add_action() -> CartAction {
        CartAction::LinesAdd {
            lines: vec![CartLineInput {
                merchandise_id: MerchandiseId::new("m1"),
                quantity: 1,
                display: None,
            }],
        }
    }

    #[test]
    fn test_settle_applied_adopts_response_and_drops_record() {
        let session = CartSession::default();
        let id = session.register(add_action());
        assert_eq!(session.view().status, CartViewStatus::Loading);

        session.settle_applied(&id, Some(cart_with_line("gid://cart/1", "gid://cart-line/1")));

        let view = session.view();
        assert_eq!(view.status, CartViewStatus::Active);
        assert!(!view.provisional);
        assert!(view.lines.iter().all(|l| !l.id.is_synthetic()));
        assert_eq!(session.cart_id(), Some(CartId::new("gid://cart/1")));
    }

    #[test]
    fn test_settle_failed_reverts_to_prior_truth() {
        let session = CartSession::default();
        let id = session.register(add_action());
        assert_eq!(session.view().status, CartViewStatus::Loading);

        session.settle_failed(&id);

        let view = session.view();
        assert_eq!(view.status, CartViewStatus::Empty);
        assert!(view.lines.is_empty());
    }

    #[test]
    fn test_stale_fetch_does_not_displace_newer_truth() {
        let session = CartSession::default();
        let stale_ticket = session.revalidation_ticket();

        let id = session.register(add_action());
        session.settle_applied(&id, Some(cart_with_line("gid://cart/1", "gid://cart-line/1")));

        // A fetch issued before the settlement straggles in afterwards
        let adopted = session.adopt(stale_ticket, Some(cart_with_line("gid://cart/1", "stale")));
        assert!(!adopted);
        assert_eq!(session.view().lines[0].id, LineId::new("gid://cart-line/1"));
    }

    #[test]
    fn test_vanished_cart_clears_truth_and_blocks_reseeding() {
        let session = CartSession::default();
        session.seed_cart_id(CartId::new("gid://cart/old"));
        assert!(session.missing_snapshot());

        assert!(session.adopt(session.revalidation_ticket(), None));
        assert!(session.cart_id().is_none());

        // The stale cookie id must not come back
        session.seed_cart_id(CartId::new("gid://cart/old"));
        assert!(session.cart_id().is_none());

        // A newly created cart clears the tombstone
        let id = session.register(add_action());
        session.settle_applied(&id, Some(cart_with_line("gid://cart/new", "gid://cart-line/1")));
        assert_eq!(session.cart_id(), Some(CartId::new("gid://cart/new")));
    }

    #[test]
    fn test_seed_does_not_overwrite_known_id() {
        let session = CartSession::default();
        session.seed_cart_id(CartId::new("gid://cart/a"));
        session.seed_cart_id(CartId::new("gid://cart/b"));
        assert_eq!(session.cart_id(), Some(CartId::new("gid://cart/a")));
    }

    #[test]
    fn test_navigation_to_same_location_skips_refresh() {
        let session = CartSession::default();
        assert!(session.navigate("/cart"));
        assert!(!session.navigate("/cart"));
        assert!(session.navigate("/collections/all"));
        assert!(session.navigate("/cart"));
    }

    #[test]
    fn test_sessions_are_independent() {
        let first = CartSession::default();
        let second = CartSession::default();

        first.register(add_action());

        assert_eq!(first.view().status, CartViewStatus::Loading);
        assert_eq!(second.view().status, CartViewStatus::Empty);
    }

    #[tokio::test]
    async fn test_engine_returns_same_handle_for_key() {
        let config = crate::config::CommerceConfig {
            endpoint: "http://127.0.0.1:9/cart".to_string(),
            access_token: secrecy::SecretString::from("test-token"),
        };
        let engine = CartEngine::new(CommerceClient::new(&config));

        let a = engine.session("key-1").await;
        a.seed_cart_id(CartId::new("gid://cart/1"));

        let b = engine.session("key-1").await;
        assert_eq!(b.cart_id(), Some(CartId::new("gid://cart/1")));

        let other = engine.session("key-2").await;
        assert!(other.cart_id().is_none());
    }
}

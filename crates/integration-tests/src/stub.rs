//! In-process stand-in for the commerce backend.
//!
//! Speaks the cart endpoint's envelope protocol (`mutate` / `fetch`) over
//! real HTTP with in-memory carts, so the storefront under test runs its
//! actual client stack end to end. A few behaviors are scripted for tests:
//!
//! - discount or gift card codes starting with `NOPE` are rejected with a
//!   user error and leave the cart unchanged
//! - discount codes starting with `LEGACY` apply, but with a warning
//! - merchandise ids ending in `:slow` stall the mutation response, long
//!   enough for tests to observe in-flight optimistic state
//! - every request is counted, so tests can assert what reached the
//!   backend and what never did

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, extract::State, routing::post};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use marmalade_core::{CurrencyCode, Money};

/// Access token the stub requires on every request.
pub const STUB_ACCESS_TOKEN: &str = "itest-9f3kq27vmx84bzr1";

/// How long a `:slow` merchandise mutation stalls before answering.
pub const SLOW_MERCHANDISE_DELAY: Duration = Duration::from_millis(400);

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone)]
struct StubLine {
    id: String,
    merchandise_id: String,
    quantity: i64,
}

#[derive(Debug, Clone)]
struct StubGiftCard {
    id: String,
    code: String,
}

#[derive(Debug, Clone)]
struct StubCart {
    id: String,
    checkout_url: String,
    created_at: DateTime<Utc>,
    lines: Vec<StubLine>,
    discount_codes: Vec<String>,
    gift_cards: Vec<StubGiftCard>,
    buyer_identity: Option<Value>,
}

#[derive(Debug, Default)]
struct StubState {
    carts: HashMap<String, StubCart>,
    next_cart: u64,
    next_line: u64,
    next_gift_card: u64,
    mutate_count: u64,
    fetch_count: u64,
}

type SharedState = Arc<Mutex<StubState>>;

/// Handle to a running stub backend.
#[derive(Clone)]
pub struct StubCommerce {
    state: SharedState,
    addr: SocketAddr,
}

impl StubCommerce {
    /// Start the stub on an ephemeral port.
    pub async fn start() -> Self {
        let state: SharedState = Arc::new(Mutex::new(StubState::default()));
        let router = Router::new()
            .route("/cart", post(handle))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self { state, addr }
    }

    /// Endpoint URL for the storefront's commerce config.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("http://{}/cart", self.addr)
    }

    /// How many mutation envelopes the backend has seen.
    #[must_use]
    pub fn mutate_count(&self) -> u64 {
        self.lock().mutate_count
    }

    /// How many fetch envelopes the backend has seen.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.lock().fetch_count
    }

    /// Delete a cart out from under the storefront, as checkout completion
    /// or expiry would. Returns whether the cart existed.
    pub fn remove_cart(&self, cart_id: &str) -> bool {
        self.lock().carts.remove(cart_id).is_some()
    }

    fn lock(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Envelope Handling
// =============================================================================

async fn handle(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(envelope): Json<Value>,
) -> Response {
    let token = headers
        .get("Commerce-Access-Token")
        .and_then(|value| value.to_str().ok());
    if token != Some(STUB_ACCESS_TOKEN) {
        return (StatusCode::UNAUTHORIZED, "bad access token").into_response();
    }

    let kind = envelope
        .get("kind")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    // The delay is decided from the envelope alone so the lock is never
    // held across an await
    if kind == "mutate" && wants_delay(&envelope) {
        tokio::time::sleep(SLOW_MERCHANDISE_DELAY).await;
    }

    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    match kind.as_str() {
        "mutate" => Json(state.apply_mutation(&envelope)).into_response(),
        "fetch" => Json(state.apply_fetch(&envelope)).into_response(),
        _ => (StatusCode::BAD_REQUEST, "unknown envelope kind").into_response(),
    }
}

/// Any line referencing `:slow` merchandise stalls the whole mutation.
fn wants_delay(envelope: &Value) -> bool {
    envelope
        .pointer("/inputs/lines")
        .and_then(Value::as_array)
        .is_some_and(|lines| {
            lines.iter().any(|line| {
                line.get("merchandiseId")
                    .and_then(Value::as_str)
                    .is_some_and(|id| id.ends_with(":slow"))
            })
        })
}

impl StubState {
    fn apply_fetch(&mut self, envelope: &Value) -> Value {
        self.fetch_count += 1;
        let cart = envelope
            .get("cartId")
            .and_then(Value::as_str)
            .and_then(|id| self.carts.get(id))
            .cloned();
        match cart {
            Some(cart) => json!({ "cart": cart_json(&cart) }),
            None => json!({ "cart": null }),
        }
    }

    fn apply_mutation(&mut self, envelope: &Value) -> Value {
        self.mutate_count += 1;
        let action = envelope
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let inputs = envelope.get("inputs").cloned().unwrap_or_else(|| json!({}));

        // A mutation without a cart id creates the cart in the same request
        let cart_id = match envelope.get("cartId").and_then(Value::as_str) {
            Some(id) => {
                if !self.carts.contains_key(id) {
                    return rejection("CART_NOT_FOUND", "cart does not exist");
                }
                id.to_string()
            }
            None => self.create_cart(),
        };

        let Some(mut cart) = self.carts.remove(&cart_id) else {
            return rejection("CART_NOT_FOUND", "cart does not exist");
        };

        let response = match self.apply_action(&mut cart, &action, &inputs) {
            Ok(warnings) => json!({
                "cart": cart_json(&cart),
                "errors": [],
                "warnings": warnings,
            }),
            Err(errors) => json!({
                "cart": cart_json(&cart),
                "errors": errors,
                "warnings": [],
            }),
        };
        self.carts.insert(cart_id, cart);
        response
    }

    /// Validate first, mutate after: a rejected action leaves the cart
    /// exactly as it was.
    fn apply_action(
        &mut self,
        cart: &mut StubCart,
        action: &str,
        inputs: &Value,
    ) -> Result<Vec<Value>, Vec<Value>> {
        match action {
            "LinesAdd" => {
                for line in array_field(inputs, "lines") {
                    let merchandise_id = line
                        .get("merchandiseId")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let quantity = line.get("quantity").and_then(Value::as_i64).unwrap_or(0);
                    if merchandise_id.is_empty() || quantity <= 0 {
                        continue;
                    }
                    match cart
                        .lines
                        .iter_mut()
                        .find(|existing| existing.merchandise_id == merchandise_id)
                    {
                        Some(existing) => existing.quantity += quantity,
                        None => {
                            self.next_line += 1;
                            cart.lines.push(StubLine {
                                id: format!("gid://marmalade/CartLine/{}", self.next_line),
                                merchandise_id,
                                quantity,
                            });
                        }
                    }
                }
                Ok(vec![])
            }
            "LinesUpdate" => {
                let updates: Vec<(String, i64)> = array_field(inputs, "lines")
                    .iter()
                    .map(|line| {
                        (
                            line.get("id")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            line.get("quantity").and_then(Value::as_i64).unwrap_or(0),
                        )
                    })
                    .collect();
                for (id, _) in &updates {
                    if !cart.lines.iter().any(|line| &line.id == id) {
                        return Err(vec![user_error(
                            "INVALID_LINE",
                            &format!("line {id} is not in the cart"),
                        )]);
                    }
                }
                for (id, quantity) in updates {
                    if quantity <= 0 {
                        cart.lines.retain(|line| line.id != id);
                    } else if let Some(line) =
                        cart.lines.iter_mut().find(|line| line.id == id)
                    {
                        line.quantity = quantity;
                    }
                }
                Ok(vec![])
            }
            "LinesRemove" => {
                let ids: Vec<&str> = array_field(inputs, "lineIds")
                    .iter()
                    .filter_map(Value::as_str)
                    .collect();
                cart.lines.retain(|line| !ids.contains(&line.id.as_str()));
                Ok(vec![])
            }
            "DiscountCodesUpdate" => {
                let codes: Vec<String> = array_field(inputs, "discountCodes")
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
                if let Some(bad) = codes.iter().find(|code| code.starts_with("NOPE")) {
                    return Err(vec![user_error(
                        "DISCOUNT_NOT_FOUND",
                        &format!("discount code {bad} does not exist"),
                    )]);
                }
                let warnings = codes
                    .iter()
                    .filter(|code| code.starts_with("LEGACY"))
                    .map(|code| warning("CODE_DEPRECATED", code, "code is deprecated"))
                    .collect();
                cart.discount_codes = codes;
                Ok(warnings)
            }
            "GiftCardCodesUpdate" => {
                let codes: Vec<String> = array_field(inputs, "giftCardCodes")
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
                if let Some(bad) = codes.iter().find(|code| code.starts_with("NOPE")) {
                    return Err(vec![user_error(
                        "GIFT_CARD_NOT_FOUND",
                        &format!("gift card code {bad} does not exist"),
                    )]);
                }
                cart.gift_cards = codes
                    .into_iter()
                    .map(|code| {
                        self.next_gift_card += 1;
                        StubGiftCard {
                            id: format!("gid://marmalade/GiftCard/{}", self.next_gift_card),
                            code,
                        }
                    })
                    .collect();
                Ok(vec![])
            }
            "GiftCardCodesRemove" => {
                let ids: Vec<&str> = array_field(inputs, "giftCardCodes")
                    .iter()
                    .filter_map(Value::as_str)
                    .collect();
                cart.gift_cards
                    .retain(|gift_card| !ids.contains(&gift_card.id.as_str()));
                Ok(vec![])
            }
            "BuyerIdentityUpdate" => {
                let incoming = inputs
                    .pointer("/buyerIdentity")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                let merged = cart
                    .buyer_identity
                    .get_or_insert_with(|| json!({}));
                if let Some(target) = merged.as_object_mut() {
                    for (key, value) in incoming {
                        if !value.is_null() {
                            target.insert(key, value);
                        }
                    }
                }
                Ok(vec![])
            }
            other => Err(vec![user_error(
                "INVALID_ACTION",
                &format!("unsupported action {other}"),
            )]),
        }
    }

    fn create_cart(&mut self) -> String {
        self.next_cart += 1;
        let id = format!("gid://marmalade/Cart/{}", self.next_cart);
        let cart = StubCart {
            id: id.clone(),
            checkout_url: format!("https://checkout.example.test/c/{}", self.next_cart),
            created_at: Utc::now(),
            lines: vec![],
            discount_codes: vec![],
            gift_cards: vec![],
            buyer_identity: None,
        };
        self.carts.insert(id.clone(), cart);
        id
    }
}

// =============================================================================
// Wire Rendering
// =============================================================================

fn cart_json(cart: &StubCart) -> Value {
    let mut subtotal = Money::zero(CurrencyCode::USD);
    let lines: Vec<Value> = cart
        .lines
        .iter()
        .map(|line| {
            let unit = unit_price(&line.merchandise_id);
            let total = unit.times(line.quantity);
            subtotal = subtotal.add(&total).unwrap_or(subtotal);
            json!({
                "id": line.id,
                "quantity": line.quantity,
                "cost": {
                    "amountPerQuantity": unit,
                    "totalAmount": total,
                },
                "merchandise": {
                    "id": line.merchandise_id,
                    "title": title_for(&line.merchandise_id),
                    "price": unit,
                    "imageUrl": null,
                    "selectedOptions": [],
                },
            })
        })
        .collect();
    let total_quantity: i64 = cart.lines.iter().map(|line| line.quantity).sum();

    json!({
        "id": cart.id,
        "checkoutUrl": cart.checkout_url,
        "createdAt": cart.created_at,
        "updatedAt": Utc::now(),
        "totalQuantity": total_quantity,
        "buyerIdentity": cart.buyer_identity,
        "cost": {
            "subtotalAmount": subtotal,
            "totalTaxAmount": null,
            "totalAmount": subtotal,
        },
        "discountCodes": cart
            .discount_codes
            .iter()
            .map(|code| json!({ "code": code, "applicable": true }))
            .collect::<Vec<_>>(),
        "appliedGiftCards": cart
            .gift_cards
            .iter()
            .map(|gift_card| json!({
                "id": gift_card.id,
                "lastCharacters": last_characters(&gift_card.code),
                "amountUsed": usd("10.00"),
            }))
            .collect::<Vec<_>>(),
        "lines": lines,
    })
}

/// Fixed per-variant pricing so tests can assert totals.
fn unit_price(merchandise_id: &str) -> Money {
    match merchandise_id.trim_end_matches(":slow") {
        "gid://marmalade/Merchandise/earl-grey" => usd("14.00"),
        "gid://marmalade/Merchandise/teapot" => usd("42.50"),
        _ => usd("10.00"),
    }
}

fn title_for(merchandise_id: &str) -> String {
    merchandise_id
        .trim_end_matches(":slow")
        .rsplit('/')
        .next()
        .unwrap_or("item")
        .to_string()
}

fn usd(amount: &str) -> Money {
    Money::new(amount.parse().unwrap_or_default(), CurrencyCode::USD)
}

fn last_characters(code: &str) -> String {
    let length = code.chars().count();
    code.chars().skip(length.saturating_sub(4)).collect()
}

fn array_field<'a>(inputs: &'a Value, field: &str) -> &'a [Value] {
    inputs
        .get(field)
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

fn user_error(code: &str, message: &str) -> Value {
    json!({ "code": code, "field": null, "message": message })
}

fn warning(code: &str, target: &str, message: &str) -> Value {
    json!({ "code": code, "target": target, "message": message })
}

fn rejection(code: &str, message: &str) -> Value {
    json!({
        "cart": null,
        "errors": [user_error(code, message)],
        "warnings": [],
    })
}

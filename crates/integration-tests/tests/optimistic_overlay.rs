//! Integration tests for the served optimistic cart view.
//!
//! These tests race real HTTP requests against deliberately slow backend
//! mutations to observe the overlay mid-flight: synthetic lines, loading
//! status, provisional totals. Convergence back to backend truth is then
//! asserted by polling the same view.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::time::Duration;

use marmalade_integration_tests::TestContext;
use serde_json::Value;

const EARL_GREY: &str = "gid://marmalade/Merchandise/earl-grey";
const SLOW_TEAPOT: &str = "gid://marmalade/Merchandise/teapot:slow";
const SLOW_GREEN_TEA: &str = "gid://marmalade/Merchandise/green-tea:slow";

/// Mid-flight observation point: after the mutation has registered, well
/// before the stub's slow response lands.
const MID_FLIGHT: Duration = Duration::from_millis(120);

/// Settle window for background revalidations spawned by mutations.
const REFRESH_WINDOW: Duration = Duration::from_millis(400);

fn add_lines(merchandise_id: &str, quantity: i64) -> String {
    format!(r#"{{"lines": [{{"merchandiseId": "{merchandise_id}", "quantity": {quantity}}}]}}"#)
}

async fn seed_active_cart(ctx: &TestContext) -> Value {
    ctx.post_action("LinesAdd", &add_lines(EARL_GREY, 1)).await;
    ctx.view_until("seeded active cart", |view| {
        view["status"] == "active" && view["provisional"] == false
    })
    .await
}

// =============================================================================
// Optimistic States
// =============================================================================

#[tokio::test]
async fn test_view_starts_empty() {
    let ctx = TestContext::new().await;

    let view = ctx.view().await;
    assert_eq!(view["status"], "empty");
    assert_eq!(view["totalQuantity"], 0);
    assert_eq!(view["provisional"], false);
    assert!(view["cartId"].is_null());
    assert!(view["lines"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_pending_add_shows_loading_with_synthetic_line() {
    let ctx = TestContext::new().await;
    // Establish the session cookie before racing requests on it
    ctx.view().await;

    let inputs = format!(
        r#"{{"lines": [{{"merchandiseId": "{SLOW_TEAPOT}", "quantity": 1, "display": {{"title": "Stoneware Teapot", "unitPrice": {{"amount": "42.50", "currencyCode": "USD"}}}}}}]}}"#
    );
    let in_flight = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.post_action("LinesAdd", &inputs).await }
    });

    tokio::time::sleep(MID_FLIGHT).await;
    let view = ctx.view().await;

    // First-ever add: nothing authoritative yet, so the cart is loading
    assert_eq!(view["status"], "loading");
    assert_eq!(view["provisional"], true);
    assert!(view["cost"].is_null());
    assert_eq!(view["subtotal"]["amount"], "42.50");
    let line = &view["lines"][0];
    assert!(line["id"].as_str().unwrap().starts_with("optimistic:"));
    assert_eq!(line["pending"], true);
    assert_eq!(line["title"], "Stoneware Teapot");
    assert_eq!(line["quantity"], 1);

    let response = in_flight.await.unwrap();
    assert_eq!(response.status(), 200);

    let settled = ctx
        .view_until("settled active view", |view| {
            view["status"] == "active" && view["provisional"] == false
        })
        .await;
    assert!(
        settled["lines"][0]["id"]
            .as_str()
            .unwrap()
            .starts_with("gid://")
    );
    assert_eq!(settled["lines"][0]["pending"], false);
    assert_eq!(settled["cost"]["subtotalAmount"]["amount"], "42.50");
    assert_eq!(settled["subtotal"], settled["cost"]["subtotalAmount"]);
}

#[tokio::test]
async fn test_concurrent_adds_compose() {
    let ctx = TestContext::new().await;
    seed_active_cart(&ctx).await;

    let teapot = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.post_action("LinesAdd", &add_lines(SLOW_TEAPOT, 2)).await }
    });
    let green_tea = tokio::spawn({
        let ctx = ctx.clone();
        async move { ctx.post_action("LinesAdd", &add_lines(SLOW_GREEN_TEA, 1)).await }
    });

    tokio::time::sleep(MID_FLIGHT).await;
    let view = ctx.view().await;

    // Both pending adds overlay the authoritative line
    assert_eq!(view["status"], "active");
    assert_eq!(view["provisional"], true);
    assert_eq!(view["totalQuantity"], 4);
    assert_eq!(view["lines"].as_array().unwrap().len(), 3);

    assert_eq!(teapot.await.unwrap().status(), 200);
    assert_eq!(green_tea.await.unwrap().status(), 200);

    let settled = ctx
        .view_until("both adds settled", |view| {
            view["provisional"] == false && view["totalQuantity"] == 4
        })
        .await;
    let lines = settled["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 3);
    for line in lines {
        assert!(line["id"].as_str().unwrap().starts_with("gid://"));
        assert_eq!(line["pending"], false);
    }
    // 1 x 14.00 + 2 x 42.50 + 1 x 10.00
    assert_eq!(settled["cost"]["subtotalAmount"]["amount"], "109.00");
}

// =============================================================================
// Revalidation Behavior
// =============================================================================

#[tokio::test]
async fn test_same_location_view_does_not_refetch() {
    let ctx = TestContext::new().await;
    seed_active_cart(&ctx).await;
    tokio::time::sleep(REFRESH_WINDOW).await;

    let base = ctx.backend.fetch_count();

    ctx.view_at("/shop").await;
    assert_eq!(ctx.backend.fetch_count(), base + 1);

    // Re-rendering the same location is not a navigation
    ctx.view_at("/shop").await;
    assert_eq!(ctx.backend.fetch_count(), base + 1);

    ctx.view_at("/cart").await;
    assert_eq!(ctx.backend.fetch_count(), base + 2);
}

#[tokio::test]
async fn test_explicit_revalidate_always_refetches() {
    let ctx = TestContext::new().await;
    seed_active_cart(&ctx).await;
    tokio::time::sleep(REFRESH_WINDOW).await;

    let base = ctx.backend.fetch_count();
    ctx.view_revalidated().await;
    ctx.view_revalidated().await;
    assert_eq!(ctx.backend.fetch_count(), base + 2);
}

#[tokio::test]
async fn test_noop_mutation_skips_follow_up_refresh() {
    let ctx = TestContext::new().await;
    seed_active_cart(&ctx).await;
    tokio::time::sleep(REFRESH_WINDOW).await;

    let mutations = ctx.backend.mutate_count();
    let fetches = ctx.backend.fetch_count();

    // An empty removal changes nothing, but is still dispatched once
    let body: Value = ctx
        .post_action("LinesRemove", "{}")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["cart"]["totalQuantity"], 1);

    tokio::time::sleep(REFRESH_WINDOW).await;
    assert_eq!(ctx.backend.mutate_count(), mutations + 1);
    assert_eq!(ctx.backend.fetch_count(), fetches);
}

// =============================================================================
// Vanished Carts
// =============================================================================

#[tokio::test]
async fn test_vanished_cart_resets_to_empty() {
    let ctx = TestContext::new().await;
    let seeded = seed_active_cart(&ctx).await;
    let cart_id = seeded["cartId"].as_str().unwrap().to_string();

    assert!(ctx.backend.remove_cart(&cart_id));

    let view = ctx.view_revalidated().await;
    assert_eq!(view["status"], "empty");
    assert!(view["cartId"].is_null());
    assert!(view["lines"].as_array().unwrap().is_empty());

    // A fresh add starts a new cart rather than resurrecting the old id
    let body: Value = ctx
        .post_action("LinesAdd", &add_lines(EARL_GREY, 2))
        .await
        .json()
        .await
        .unwrap();
    assert!(body["errors"].as_array().unwrap().is_empty());
    assert_ne!(body["cart"]["id"].as_str().unwrap(), cart_id);
    assert_eq!(body["cart"]["totalQuantity"], 2);
}

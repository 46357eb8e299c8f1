//! Cart route handlers.
//!
//! One fixed mutation endpoint (`POST /cart`) decodes a form-posted
//! action, runs it through the optimistic engine, and answers with the
//! raw mutation outcome. The view endpoint (`GET /cart`) serves the
//! overlay the presentation layer renders. Cart identity and the engine
//! key live in the session cookie.

use axum::{
    Form, Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;
use uuid::Uuid;

use marmalade_core::CartId;

use crate::cart::{CartSession, OptimisticCartView, RevalidateTrigger, should_revalidate};
use crate::commerce::{Cart, CartAction, CartUserError, CartWarning};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::models::session::keys as session_keys;
use crate::state::AppState;

/// The seven action names the endpoint accepts. Anything else is refused
/// before the payload is even parsed.
const ACTION_KINDS: [&str; 7] = [
    "LinesAdd",
    "LinesUpdate",
    "LinesRemove",
    "DiscountCodesUpdate",
    "GiftCardCodesUpdate",
    "GiftCardCodesRemove",
    "BuyerIdentityUpdate",
];

// =============================================================================
// Form Decoding
// =============================================================================

/// Mutation form data: an action name, its JSON-encoded inputs, and an
/// optional post-success redirect.
#[derive(Debug, Deserialize)]
pub struct CartMutationForm {
    /// Action name, one of [`ACTION_KINDS`].
    pub action: String,
    /// JSON-encoded inputs object for the action.
    pub inputs: Option<String>,
    /// Local path to redirect to after a successful mutation.
    #[serde(rename = "redirectTo")]
    pub redirect_to: Option<String>,
}

/// Fold a single-code form field into the head of its code list, e.g.
/// `{discountCode: "WELCOME", discountCodes: ["SAVE10"]}` becomes
/// `{discountCodes: ["WELCOME", "SAVE10"]}`.
fn prepend_code(inputs: &mut serde_json::Value, single_field: &str, list_field: &str) {
    let Some(object) = inputs.as_object_mut() else {
        return;
    };
    let Some(serde_json::Value::String(code)) = object.remove(single_field) else {
        return;
    };
    if code.is_empty() {
        return;
    }
    let list = object
        .entry(list_field)
        .or_insert_with(|| serde_json::Value::Array(vec![]));
    if let Some(array) = list.as_array_mut() {
        array.insert(0, serde_json::Value::String(code));
    }
}

/// Decode an action name plus JSON inputs into a [`CartAction`].
///
/// Fails closed: an unrecognized action is rejected here and never
/// reaches the backend.
fn build_action(action: &str, inputs: &str) -> Result<CartAction> {
    if !ACTION_KINDS.contains(&action) {
        return Err(AppError::InvalidAction(action.to_string()));
    }

    let mut inputs: serde_json::Value = serde_json::from_str(inputs)
        .map_err(|e| AppError::BadRequest(format!("inputs is not valid JSON: {e}")))?;

    // Single-code convenience fields are prepended before dispatch
    match action {
        "DiscountCodesUpdate" => prepend_code(&mut inputs, "discountCode", "discountCodes"),
        "GiftCardCodesUpdate" => prepend_code(&mut inputs, "giftCardCode", "giftCardCodes"),
        _ => {}
    }

    serde_json::from_value(serde_json::json!({
        "action": action,
        "inputs": inputs,
    }))
    .map_err(|e| AppError::BadRequest(format!("invalid inputs for {action}: {e}")))
}

/// Only same-site paths are honored for post-mutation redirects.
fn is_local_path(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.contains('\\')
}

// =============================================================================
// Session Helpers
// =============================================================================

/// Look up this visitor's engine session, minting an engine key on first
/// contact.
async fn engine_session(state: &AppState, session: &Session) -> Result<CartSession> {
    let engine_key = session
        .get::<String>(session_keys::ENGINE_KEY)
        .await
        .map_err(|e| AppError::Session(e.to_string()))?;

    let engine_key = match engine_key {
        Some(key) => key,
        None => {
            let key = Uuid::new_v4().to_string();
            session
                .insert(session_keys::ENGINE_KEY, &key)
                .await
                .map_err(|e| AppError::Session(e.to_string()))?;
            key
        }
    };

    let cart_session = state.engine().session(&engine_key).await;

    // An engine entry evicted while the cookie lived on rebuilds its cart
    // identity from the session
    if let Ok(Some(cart_id)) = session.get::<String>(session_keys::CART_ID).await {
        cart_session.seed_cart_id(CartId::new(cart_id));
    }

    Ok(cart_session)
}

/// Keep the session's cart id in step with engine truth.
async fn sync_cart_id(session: &Session, cart_session: &CartSession) {
    let result = match cart_session.cart_id() {
        Some(cart_id) => session
            .insert(session_keys::CART_ID, cart_id.as_str())
            .await,
        None => session
            .remove::<String>(session_keys::CART_ID)
            .await
            .map(|_| ()),
    };
    if let Err(e) = result {
        tracing::error!("Failed to persist cart ID to session: {e}");
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Analytics payload returned with every mutation response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartMutationAnalytics {
    /// The cart the mutation targeted or created.
    pub cart_id: Option<CartId>,
}

/// Mutation endpoint response body.
#[derive(Debug, Serialize)]
pub struct CartMutationResponse {
    /// Updated cart snapshot, absent when the mutation was rejected and
    /// no cart exists yet.
    pub cart: Option<Cart>,
    /// Errors: the mutation did not apply.
    pub errors: Vec<CartUserError>,
    /// Warnings: partial success, cart adopted as-is.
    pub warnings: Vec<CartWarning>,
    /// Analytics payload.
    pub analytics: CartMutationAnalytics,
}

/// Apply a cart mutation.
///
/// Decodes the posted action, dispatches it exactly once through the
/// engine, and answers 200 with the outcome, or 303 to `redirectTo` when
/// one was supplied and the mutation succeeded. Backend rejections still
/// answer 200, with `errors` populated.
#[instrument(skip(state, session, form), fields(action = %form.action))]
pub async fn mutate(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CartMutationForm>,
) -> Result<Response> {
    let action = build_action(&form.action, form.inputs.as_deref().unwrap_or("{}"))?;

    add_breadcrumb(
        "cart",
        "Submitted cart mutation",
        Some(&[("action", action.kind())]),
    );

    let cart_session = engine_session(&state, &session).await?;
    let outcome = state.engine().submit(&cart_session, action).await?;
    sync_cart_id(&session, &cart_session).await;

    // Redirect and failure are mutually exclusive outcomes
    if !outcome.rejected()
        && let Some(target) = form.redirect_to.as_deref()
        && is_local_path(target)
    {
        return Ok(Redirect::to(target).into_response());
    }

    let analytics = CartMutationAnalytics {
        cart_id: outcome
            .cart
            .as_ref()
            .map(|cart| cart.id.clone())
            .or_else(|| cart_session.cart_id()),
    };
    Ok(Json(CartMutationResponse {
        cart: outcome.cart,
        errors: outcome.errors,
        warnings: outcome.warnings,
        analytics,
    })
    .into_response())
}

/// Query parameters for the cart view.
#[derive(Debug, Default, Deserialize)]
pub struct CartViewQuery {
    /// Location the caller navigated to; repeats of the current location
    /// do not trigger a refresh.
    pub location: Option<String>,
    /// Force a refresh of authoritative truth before rendering.
    pub revalidate: Option<bool>,
}

/// Serve the optimistic cart view.
#[instrument(skip(state, session, query))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CartViewQuery>,
) -> Result<Json<OptimisticCartView>> {
    let cart_session = engine_session(&state, &session).await?;

    let mut refresh = cart_session.missing_snapshot();
    if let Some(location) = query.location.as_deref() {
        refresh |= cart_session.navigate(location);
    }
    if query.revalidate.unwrap_or(false) {
        refresh |= should_revalidate(RevalidateTrigger::Explicit);
    }

    if refresh
        && let Err(error) = state.engine().refresh(&cart_session).await
    {
        // Serve the last known view rather than blanking the cart
        tracing::warn!(error = %error, "cart refresh failed, serving last known view");
    }

    sync_cart_id(&session, &cart_session).await;
    Ok(Json(cart_session.view()))
}

/// Redirect to the commerce backend's checkout.
#[instrument(skip(state, session))]
pub async fn checkout(State(state): State<AppState>, session: Session) -> Result<Response> {
    let cart_session = engine_session(&state, &session).await?;

    if cart_session.missing_snapshot()
        && let Err(error) = state.engine().refresh(&cart_session).await
    {
        tracing::error!(error = %error, "failed to refresh cart for checkout");
        return Ok(Redirect::to("/cart").into_response());
    }

    match cart_session.checkout_url() {
        Some(url) => Ok(Redirect::to(&url).into_response()),
        None => Ok(Redirect::to("/cart").into_response()),
    }
}

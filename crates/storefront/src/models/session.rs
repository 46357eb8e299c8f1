//! Session-related types.
//!
//! Keys for the values the storefront keeps in the session. The session
//! carries only identifiers: the cart id (so a returning visitor gets
//! their cart back) and the engine key (so concurrent requests from one
//! browser share one optimistic engine entry).

/// Session keys for cart state.
pub mod keys {
    /// Key for storing the commerce backend's cart ID.
    pub const CART_ID: &str = "cart_id";

    /// Key for the optimistic engine entry bound to this session.
    pub const ENGINE_KEY: &str = "engine_key";
}
